use axum::{
    extract::{Query, State},
    routing::get,
    Router,
};

use crate::{
    error::{AppError, AppResult},
    models::Slot,
    repository::SlotFilter,
    response::ApiResponse,
    schemas::SlotsQuery,
    state::AppState,
    tenancy::AgencyId,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/slots", get(list_slots))
}

async fn list_slots(
    State(state): State<AppState>,
    AgencyId(agencia_id): AgencyId,
    Query(query): Query<SlotsQuery>,
) -> AppResult<ApiResponse<Vec<Slot>>> {
    if let (Some(desde), Some(hasta)) = (query.desde, query.hasta) {
        if desde > hasta {
            return Err(AppError::validation("desde must be on or before hasta."));
        }
    }
    let rows = state
        .store
        .list_slots(&SlotFilter {
            agencia_id: Some(agencia_id),
            actividad_id: query.actividad_id,
            horario_id: query.horario_id,
            desde: query.desde,
            hasta: query.hasta,
            include_deleted: query.include_deleted,
        })
        .await?;
    Ok(ApiResponse::ok(rows))
}
