use axum::{
    extract::{Query, State},
    routing::get,
    Router,
};

use crate::{
    error::AppResult,
    response::ApiResponse,
    schemas::MetricsQuery,
    services::dashboard::{agency_metrics, DashboardMetrics},
    state::AppState,
    tenancy::AgencyId,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/dashboard/metrics", get(metrics))
}

async fn metrics(
    State(state): State<AppState>,
    AgencyId(agencia_id): AgencyId,
    Query(query): Query<MetricsQuery>,
) -> AppResult<ApiResponse<DashboardMetrics>> {
    let metrics = agency_metrics(
        state.store.as_ref(),
        agencia_id,
        state.config.today(),
        query.desde,
        query.hasta,
    )
    .await?;
    Ok(ApiResponse::ok(metrics))
}
