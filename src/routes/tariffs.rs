use axum::{
    extract::{Path, Query, State},
    routing::get,
    Router,
};

use crate::{
    error::AppResult,
    models::Tariff,
    response::ApiResponse,
    schemas::{ActivityPath, SyncTariffsInput, TariffsQuery, ValidJson},
    services::{
        activities::load_activity,
        tariff_sync::{sync_tariffs, TariffSyncReport},
        unit_of_work::UnitOfWork,
    },
    state::AppState,
    tenancy::AgencyId,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tariffs", get(list_tariffs))
        .route(
            "/activities/{activity_id}/tariffs",
            get(list_activity_tariffs).put(replace_tariffs),
        )
}

async fn list_tariffs(
    State(state): State<AppState>,
    AgencyId(agencia_id): AgencyId,
    Query(query): Query<TariffsQuery>,
) -> AppResult<ApiResponse<Vec<Tariff>>> {
    let activity = load_activity(state.store.as_ref(), agencia_id, query.actividad_id).await?;
    let rows = state
        .store
        .list_tariffs(activity.id, query.include_deleted)
        .await?
        .into_iter()
        .filter(|tariff| query.es_principal.is_none_or(|flag| tariff.es_principal == flag))
        .filter(|tariff| query.activa.is_none_or(|flag| tariff.activa == flag))
        .collect();
    Ok(ApiResponse::ok(rows))
}

async fn list_activity_tariffs(
    State(state): State<AppState>,
    AgencyId(agencia_id): AgencyId,
    Path(path): Path<ActivityPath>,
) -> AppResult<ApiResponse<Vec<Tariff>>> {
    let activity = load_activity(state.store.as_ref(), agencia_id, path.activity_id).await?;
    Ok(ApiResponse::ok(state.store.list_tariffs(activity.id, false).await?))
}

async fn replace_tariffs(
    State(state): State<AppState>,
    AgencyId(agencia_id): AgencyId,
    Path(path): Path<ActivityPath>,
    ValidJson(payload): ValidJson<SyncTariffsInput>,
) -> AppResult<ApiResponse<TariffSyncReport>> {
    let activity = load_activity(state.store.as_ref(), agencia_id, path.activity_id).await?;
    let mut uow = UnitOfWork::begin(state.store.as_ref(), "tariff_sync");
    let result = sync_tariffs(&mut uow, activity.id, agencia_id, &payload.tarifas).await;
    let report = uow.finish(result).await?;
    Ok(ApiResponse::ok(report))
}
