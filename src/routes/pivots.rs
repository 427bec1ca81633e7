use axum::{
    extract::{Path, State},
    routing::get,
    Router,
};

use crate::{
    error::{AppError, AppResult},
    models::{PivotKind, PivotLink},
    response::ApiResponse,
    schemas::{PivotPath, ReplacePivotsInput, ValidJson},
    services::{activities::load_activity, pivot_sync::replace_links, unit_of_work::UnitOfWork},
    state::AppState,
    tenancy::AgencyId,
};

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/activities/{activity_id}/{kind}",
        get(list_links).put(replace),
    )
}

fn parse_kind(raw: &str) -> AppResult<PivotKind> {
    PivotKind::from_segment(raw)
        .ok_or_else(|| AppError::NotFound(format!("Unknown association '{raw}'.")))
}

async fn list_links(
    State(state): State<AppState>,
    AgencyId(agencia_id): AgencyId,
    Path(path): Path<PivotPath>,
) -> AppResult<ApiResponse<Vec<PivotLink>>> {
    let kind = parse_kind(&path.kind)?;
    let activity = load_activity(state.store.as_ref(), agencia_id, path.activity_id).await?;
    Ok(ApiResponse::ok(state.store.list_links(kind, activity.id).await?))
}

async fn replace(
    State(state): State<AppState>,
    AgencyId(agencia_id): AgencyId,
    Path(path): Path<PivotPath>,
    ValidJson(payload): ValidJson<ReplacePivotsInput>,
) -> AppResult<ApiResponse<Vec<PivotLink>>> {
    let kind = parse_kind(&path.kind)?;
    let activity = load_activity(state.store.as_ref(), agencia_id, path.activity_id).await?;
    let mut uow = UnitOfWork::begin(state.store.as_ref(), "pivot_sync");
    let result = replace_links(&mut uow, kind, activity.id, &payload.items).await;
    Ok(ApiResponse::ok(uow.finish(result).await?))
}
