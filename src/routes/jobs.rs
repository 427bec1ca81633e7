use axum::{
    extract::{Path, State},
    routing::get,
    Router,
};

use crate::{
    error::{AppError, AppResult},
    response::ApiResponse,
    schemas::JobPath,
    services::jobs::JobRecord,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/jobs/{job_id}", get(get_job))
}

async fn get_job(
    State(state): State<AppState>,
    Path(path): Path<JobPath>,
) -> AppResult<ApiResponse<JobRecord>> {
    let record = state
        .jobs
        .get(path.job_id)
        .await
        .ok_or_else(|| AppError::NotFound("Job not found or expired.".to_string()))?;
    Ok(ApiResponse::ok(record))
}
