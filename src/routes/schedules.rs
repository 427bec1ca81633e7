use axum::{
    extract::{Path, Query, State},
    routing::get,
    Router,
};

use crate::{
    error::AppResult,
    models::Schedule,
    response::ApiResponse,
    schemas::{ActivityPath, IncludeDeletedQuery, SyncSchedulesInput, ValidJson},
    services::{
        activities::load_activity,
        schedule_sync::{sync_schedules, ScheduleSyncReport, SyncContext},
    },
    state::AppState,
    tenancy::AgencyId,
};

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/activities/{activity_id}/schedules",
        get(list_schedules).put(replace_schedules),
    )
}

async fn list_schedules(
    State(state): State<AppState>,
    AgencyId(agencia_id): AgencyId,
    Path(path): Path<ActivityPath>,
    Query(query): Query<IncludeDeletedQuery>,
) -> AppResult<ApiResponse<Vec<Schedule>>> {
    let activity = load_activity(state.store.as_ref(), agencia_id, path.activity_id).await?;
    let rows = state
        .store
        .list_schedules(activity.id, query.include_deleted)
        .await?;
    Ok(ApiResponse::ok(rows))
}

async fn replace_schedules(
    State(state): State<AppState>,
    AgencyId(agencia_id): AgencyId,
    Path(path): Path<ActivityPath>,
    ValidJson(payload): ValidJson<SyncSchedulesInput>,
) -> AppResult<ApiResponse<ScheduleSyncReport>> {
    let activity = load_activity(state.store.as_ref(), agencia_id, path.activity_id).await?;
    let ctx = SyncContext::new(activity.id, agencia_id, state.calendar());
    let report = sync_schedules(state.store.as_ref(), &ctx, &payload.horarios).await?;
    Ok(ApiResponse::ok(report))
}
