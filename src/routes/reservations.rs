use axum::{
    extract::{Path, Query, State},
    routing::{get, patch},
    Router,
};

use crate::{
    error::AppResult,
    models::Reservation,
    response::ApiResponse,
    schemas::{
        CreateReservationInput, ReservationPath, ReservationStatusInput, ReservationsQuery,
        ValidJson,
    },
    services::reservations::{
        create_reservation, get_reservation, list_reservations, update_status,
    },
    state::AppState,
    tenancy::AgencyId,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reservations", get(list).post(create))
        .route("/reservations/{reservation_id}", get(fetch))
        .route(
            "/reservations/{reservation_id}/status",
            patch(transition_status),
        )
}

async fn list(
    State(state): State<AppState>,
    AgencyId(agencia_id): AgencyId,
    Query(query): Query<ReservationsQuery>,
) -> AppResult<ApiResponse<Vec<Reservation>>> {
    let rows = list_reservations(state.store.as_ref(), agencia_id, &query).await?;
    Ok(ApiResponse::ok(rows))
}

async fn create(
    State(state): State<AppState>,
    AgencyId(agencia_id): AgencyId,
    ValidJson(payload): ValidJson<CreateReservationInput>,
) -> AppResult<ApiResponse<Reservation>> {
    let reservation = create_reservation(
        state.store.as_ref(),
        agencia_id,
        state.config.today(),
        &payload,
    )
    .await?;
    Ok(ApiResponse::created(reservation))
}

async fn fetch(
    State(state): State<AppState>,
    AgencyId(agencia_id): AgencyId,
    Path(path): Path<ReservationPath>,
) -> AppResult<ApiResponse<Reservation>> {
    let reservation =
        get_reservation(state.store.as_ref(), agencia_id, path.reservation_id).await?;
    Ok(ApiResponse::ok(reservation))
}

async fn transition_status(
    State(state): State<AppState>,
    AgencyId(agencia_id): AgencyId,
    Path(path): Path<ReservationPath>,
    ValidJson(payload): ValidJson<ReservationStatusInput>,
) -> AppResult<ApiResponse<Reservation>> {
    let reservation = update_status(
        state.store.as_ref(),
        agencia_id,
        path.reservation_id,
        &payload,
    )
    .await?;
    Ok(ApiResponse::ok(reservation))
}
