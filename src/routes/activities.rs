use axum::{
    extract::{Path, Query, State},
    routing::get,
    Router,
};

use crate::{
    error::AppResult,
    models::Activity,
    response::ApiResponse,
    schemas::{
        ActivitiesQuery, ActivityPath, CreateActivityInput, IntegrationCodeQuery,
        UpdateActivityInput, ValidJson,
    },
    services::{
        activities::{
            create_activity, delete_activity, get_activity_detail, list_activities,
            load_activity, update_activity, ActivityDetail, CreatedActivity, DeletedActivity,
        },
        integration_code::{activity_snippet, menu_snippet, IntegrationSnippet, Language},
    },
    state::AppState,
    tenancy::AgencyId,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/activities", get(list).post(create))
        .route(
            "/activities/{activity_id}",
            get(fetch).patch(update).delete(remove),
        )
        .route(
            "/activities/{activity_id}/integration-code",
            get(activity_integration_code),
        )
        .route("/integration-code/menu", get(menu_integration_code))
}

async fn list(
    State(state): State<AppState>,
    AgencyId(agencia_id): AgencyId,
    Query(query): Query<ActivitiesQuery>,
) -> AppResult<ApiResponse<Vec<Activity>>> {
    let rows = list_activities(state.store.as_ref(), agencia_id, &query).await?;
    Ok(ApiResponse::ok(rows))
}

async fn create(
    State(state): State<AppState>,
    AgencyId(agencia_id): AgencyId,
    ValidJson(payload): ValidJson<CreateActivityInput>,
) -> AppResult<ApiResponse<CreatedActivity>> {
    let (created, _) = create_activity(
        state.store.clone(),
        &state.jobs,
        agencia_id,
        state.calendar(),
        &payload,
    )
    .await?;
    Ok(ApiResponse::created(created))
}

async fn fetch(
    State(state): State<AppState>,
    AgencyId(agencia_id): AgencyId,
    Path(path): Path<ActivityPath>,
) -> AppResult<ApiResponse<ActivityDetail>> {
    let detail = get_activity_detail(state.store.as_ref(), agencia_id, path.activity_id).await?;
    Ok(ApiResponse::ok(detail))
}

async fn update(
    State(state): State<AppState>,
    AgencyId(agencia_id): AgencyId,
    Path(path): Path<ActivityPath>,
    ValidJson(payload): ValidJson<UpdateActivityInput>,
) -> AppResult<ApiResponse<Activity>> {
    let updated =
        update_activity(state.store.as_ref(), agencia_id, path.activity_id, &payload).await?;
    Ok(ApiResponse::ok(updated))
}

async fn remove(
    State(state): State<AppState>,
    AgencyId(agencia_id): AgencyId,
    Path(path): Path<ActivityPath>,
) -> AppResult<ApiResponse<DeletedActivity>> {
    let deleted = delete_activity(
        state.store.as_ref(),
        agencia_id,
        path.activity_id,
        state.calendar(),
    )
    .await?;
    Ok(ApiResponse::ok(deleted))
}

async fn activity_integration_code(
    State(state): State<AppState>,
    AgencyId(agencia_id): AgencyId,
    Path(path): Path<ActivityPath>,
    Query(query): Query<IntegrationCodeQuery>,
) -> AppResult<ApiResponse<IntegrationSnippet>> {
    let lang = Language::parse(&query.idioma)?;
    let activity = load_activity(state.store.as_ref(), agencia_id, path.activity_id).await?;
    Ok(ApiResponse::ok(activity_snippet(&state.config, activity.id, lang)?))
}

async fn menu_integration_code(
    State(state): State<AppState>,
    AgencyId(agencia_id): AgencyId,
    Query(query): Query<IntegrationCodeQuery>,
) -> AppResult<ApiResponse<IntegrationSnippet>> {
    let lang = Language::parse(&query.idioma)?;
    Ok(ApiResponse::ok(menu_snippet(&state.config, agencia_id, lang)?))
}
