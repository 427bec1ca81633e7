pub mod memory_store;
pub mod postgres_store;
pub mod table_service;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    Activity, PivotKind, PivotLink, Reservation, ReservationStatus, Schedule, Slot, Tariff,
};

#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    pub agencia_id: Option<Uuid>,
    pub ids: Vec<Uuid>,
    pub include_deleted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SlotFilter {
    pub agencia_id: Option<Uuid>,
    pub actividad_id: Option<Uuid>,
    pub horario_id: Option<Uuid>,
    pub desde: Option<NaiveDate>,
    pub hasta: Option<NaiveDate>,
    pub include_deleted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ReservationFilter {
    pub agencia_id: Option<Uuid>,
    pub actividad_id: Option<Uuid>,
    pub turno_id: Option<Uuid>,
    pub estado: Option<ReservationStatus>,
    /// Inclusive lower bound on `created_at`.
    pub created_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub created_before: Option<DateTime<Utc>>,
    pub include_deleted: bool,
    pub limit: Option<i64>,
}

/// Storage-client interface. Services receive it as `&dyn Store` so the
/// backing datastore can be swapped (Postgres in production, memory in tests).
///
/// `save_*` writes the full row, including `deleted_at`, so the same call
/// serves updates, soft deletes and restores. `purge_*` removes rows for good
/// and is only used to undo inserts.
#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> Result<(), AppError>;

    async fn insert_activity(&self, activity: &Activity) -> Result<Activity, AppError>;
    async fn get_activity(&self, id: Uuid) -> Result<Option<Activity>, AppError>;
    async fn list_activities(&self, filter: &ActivityFilter) -> Result<Vec<Activity>, AppError>;
    async fn save_activity(&self, activity: &Activity) -> Result<Activity, AppError>;
    async fn purge_activity(&self, id: Uuid) -> Result<(), AppError>;

    async fn list_schedules(
        &self,
        actividad_id: Uuid,
        include_deleted: bool,
    ) -> Result<Vec<Schedule>, AppError>;
    async fn insert_schedule(&self, schedule: &Schedule) -> Result<Schedule, AppError>;
    async fn save_schedule(&self, schedule: &Schedule) -> Result<Schedule, AppError>;
    async fn purge_schedule(&self, id: Uuid) -> Result<(), AppError>;

    async fn list_slots(&self, filter: &SlotFilter) -> Result<Vec<Slot>, AppError>;
    async fn get_slot(&self, id: Uuid) -> Result<Option<Slot>, AppError>;
    async fn insert_slots(&self, slots: &[Slot]) -> Result<Vec<Slot>, AppError>;
    async fn save_slot(&self, slot: &Slot) -> Result<Slot, AppError>;
    async fn soft_delete_slots(&self, ids: &[Uuid], at: DateTime<Utc>) -> Result<(), AppError>;
    async fn purge_slots(&self, ids: &[Uuid]) -> Result<(), AppError>;

    async fn list_tariffs(
        &self,
        actividad_id: Uuid,
        include_deleted: bool,
    ) -> Result<Vec<Tariff>, AppError>;
    async fn insert_tariff(&self, tariff: &Tariff) -> Result<Tariff, AppError>;
    async fn save_tariff(&self, tariff: &Tariff) -> Result<Tariff, AppError>;
    /// Fails with [`AppError::ForeignKey`] when live reservations still
    /// reference the tariff.
    async fn soft_delete_tariff(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError>;
    async fn purge_tariff(&self, id: Uuid) -> Result<(), AppError>;

    async fn list_links(
        &self,
        kind: PivotKind,
        actividad_id: Uuid,
    ) -> Result<Vec<PivotLink>, AppError>;
    async fn delete_links(&self, kind: PivotKind, actividad_id: Uuid) -> Result<(), AppError>;
    async fn insert_links(
        &self,
        kind: PivotKind,
        links: &[PivotLink],
    ) -> Result<Vec<PivotLink>, AppError>;

    async fn insert_reservation(&self, reservation: &Reservation)
        -> Result<Reservation, AppError>;
    async fn get_reservation(&self, id: Uuid) -> Result<Option<Reservation>, AppError>;
    async fn list_reservations(
        &self,
        filter: &ReservationFilter,
    ) -> Result<Vec<Reservation>, AppError>;
    async fn save_reservation(&self, reservation: &Reservation) -> Result<Reservation, AppError>;
    async fn purge_reservation(&self, id: Uuid) -> Result<(), AppError>;
}
