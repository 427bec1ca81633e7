use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ActivityFilter, ReservationFilter, SlotFilter, Store};
use crate::error::AppError;
use crate::models::{
    Activity, ItemKind, PivotKind, PivotLink, Reservation, Schedule, Slot, Tariff,
};

#[derive(Default)]
struct Tables {
    activities: Vec<Activity>,
    schedules: Vec<Schedule>,
    slots: Vec<Slot>,
    tariffs: Vec<Tariff>,
    links: Vec<(PivotKind, PivotLink)>,
    reservations: Vec<Reservation>,
}

/// Process-local store. Rows keep insertion order so "earliest created"
/// stays deterministic when timestamps tie.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    failpoint: Mutex<Option<&'static str>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next call to the named operation fail with a dependency error.
    #[cfg(test)]
    pub fn fail_next(&self, operation: &'static str) {
        if let Ok(mut guard) = self.failpoint.lock() {
            *guard = Some(operation);
        }
    }

    fn check_failpoint(&self, operation: &'static str) -> Result<(), AppError> {
        let Ok(mut guard) = self.failpoint.lock() else {
            return Ok(());
        };
        if *guard == Some(operation) {
            *guard = None;
            return Err(AppError::Dependency(format!(
                "Injected failure in {operation}."
            )));
        }
        Ok(())
    }
}

fn replace_by_id<T, F>(rows: &mut [T], id: Uuid, id_of: F, value: &T, table: &str) -> Result<(), AppError>
where
    T: Clone,
    F: Fn(&T) -> Uuid,
{
    match rows.iter_mut().find(|row| id_of(row) == id) {
        Some(slot) => {
            *slot = value.clone();
            Ok(())
        }
        None => Err(AppError::NotFound(format!("{table} record not found."))),
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn insert_activity(&self, activity: &Activity) -> Result<Activity, AppError> {
        self.check_failpoint("insert_activity")?;
        let mut tables = self.tables.write().await;
        if tables.activities.iter().any(|row| row.id == activity.id) {
            return Err(AppError::Conflict(
                "Duplicate value violates a unique constraint.".to_string(),
            ));
        }
        tables.activities.push(activity.clone());
        Ok(activity.clone())
    }

    async fn get_activity(&self, id: Uuid) -> Result<Option<Activity>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables.activities.iter().find(|row| row.id == id).cloned())
    }

    async fn list_activities(&self, filter: &ActivityFilter) -> Result<Vec<Activity>, AppError> {
        let tables = self.tables.read().await;
        let mut rows = tables
            .activities
            .iter()
            .filter(|row| filter.include_deleted || row.deleted_at.is_none())
            .filter(|row| filter.agencia_id.is_none_or(|agency| row.agencia_id == agency))
            .filter(|row| filter.ids.is_empty() || filter.ids.contains(&row.id))
            .cloned()
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn save_activity(&self, activity: &Activity) -> Result<Activity, AppError> {
        self.check_failpoint("save_activity")?;
        let mut tables = self.tables.write().await;
        replace_by_id(&mut tables.activities, activity.id, |row| row.id, activity, "actividades")?;
        Ok(activity.clone())
    }

    async fn purge_activity(&self, id: Uuid) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        tables.activities.retain(|row| row.id != id);
        Ok(())
    }

    async fn list_schedules(
        &self,
        actividad_id: Uuid,
        include_deleted: bool,
    ) -> Result<Vec<Schedule>, AppError> {
        let tables = self.tables.read().await;
        let mut rows = tables
            .schedules
            .iter()
            .filter(|row| row.actividad_id == actividad_id)
            .filter(|row| include_deleted || row.deleted_at.is_none())
            .cloned()
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| a.fecha_inicio.cmp(&b.fecha_inicio));
        Ok(rows)
    }

    async fn insert_schedule(&self, schedule: &Schedule) -> Result<Schedule, AppError> {
        self.check_failpoint("insert_schedule")?;
        let mut tables = self.tables.write().await;
        tables.schedules.push(schedule.clone());
        Ok(schedule.clone())
    }

    async fn save_schedule(&self, schedule: &Schedule) -> Result<Schedule, AppError> {
        self.check_failpoint("save_schedule")?;
        let mut tables = self.tables.write().await;
        replace_by_id(&mut tables.schedules, schedule.id, |row| row.id, schedule, "horarios")?;
        Ok(schedule.clone())
    }

    async fn purge_schedule(&self, id: Uuid) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        tables.schedules.retain(|row| row.id != id);
        Ok(())
    }

    async fn list_slots(&self, filter: &SlotFilter) -> Result<Vec<Slot>, AppError> {
        let tables = self.tables.read().await;
        let mut rows = tables
            .slots
            .iter()
            .filter(|row| filter.include_deleted || row.deleted_at.is_none())
            .filter(|row| filter.agencia_id.is_none_or(|id| row.agencia_id == id))
            .filter(|row| filter.actividad_id.is_none_or(|id| row.actividad_id == id))
            .filter(|row| filter.horario_id.is_none_or(|id| row.horario_id == id))
            .filter(|row| filter.desde.is_none_or(|from| row.fecha >= from))
            .filter(|row| filter.hasta.is_none_or(|to| row.fecha <= to))
            .cloned()
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| (a.fecha, a.hora_inicio).cmp(&(b.fecha, b.hora_inicio)));
        Ok(rows)
    }

    async fn get_slot(&self, id: Uuid) -> Result<Option<Slot>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables.slots.iter().find(|row| row.id == id).cloned())
    }

    async fn insert_slots(&self, slots: &[Slot]) -> Result<Vec<Slot>, AppError> {
        self.check_failpoint("insert_slots")?;
        let mut tables = self.tables.write().await;
        tables.slots.extend(slots.iter().cloned());
        Ok(slots.to_vec())
    }

    async fn save_slot(&self, slot: &Slot) -> Result<Slot, AppError> {
        self.check_failpoint("save_slot")?;
        let mut tables = self.tables.write().await;
        replace_by_id(&mut tables.slots, slot.id, |row| row.id, slot, "turnos")?;
        Ok(slot.clone())
    }

    async fn soft_delete_slots(&self, ids: &[Uuid], at: DateTime<Utc>) -> Result<(), AppError> {
        self.check_failpoint("soft_delete_slots")?;
        let mut tables = self.tables.write().await;
        for slot in tables.slots.iter_mut().filter(|row| ids.contains(&row.id)) {
            slot.deleted_at = Some(at);
        }
        Ok(())
    }

    async fn purge_slots(&self, ids: &[Uuid]) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        tables.slots.retain(|row| !ids.contains(&row.id));
        Ok(())
    }

    async fn list_tariffs(
        &self,
        actividad_id: Uuid,
        include_deleted: bool,
    ) -> Result<Vec<Tariff>, AppError> {
        let tables = self.tables.read().await;
        let mut rows = tables
            .tariffs
            .iter()
            .filter(|row| row.actividad_id == actividad_id)
            .filter(|row| include_deleted || row.deleted_at.is_none())
            .cloned()
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }

    async fn insert_tariff(&self, tariff: &Tariff) -> Result<Tariff, AppError> {
        self.check_failpoint("insert_tariff")?;
        let mut tables = self.tables.write().await;
        tables.tariffs.push(tariff.clone());
        Ok(tariff.clone())
    }

    async fn save_tariff(&self, tariff: &Tariff) -> Result<Tariff, AppError> {
        self.check_failpoint("save_tariff")?;
        let mut tables = self.tables.write().await;
        replace_by_id(&mut tables.tariffs, tariff.id, |row| row.id, tariff, "tarifas")?;
        Ok(tariff.clone())
    }

    async fn soft_delete_tariff(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        self.check_failpoint("soft_delete_tariff")?;
        let mut tables = self.tables.write().await;
        let referenced = tables.reservations.iter().any(|reservation| {
            reservation.deleted_at.is_none()
                && reservation.estado.holds_capacity()
                && reservation
                    .items
                    .iter()
                    .any(|item| item.tipo == ItemKind::Tarifa && item.ref_id == id)
        });
        if referenced {
            return Err(AppError::ForeignKey(
                "Tariff is still referenced by active reservations.".to_string(),
            ));
        }
        match tables.tariffs.iter_mut().find(|row| row.id == id) {
            Some(tariff) => {
                tariff.deleted_at = Some(at);
                tariff.es_principal = false;
                Ok(())
            }
            None => Err(AppError::NotFound("tarifas record not found.".to_string())),
        }
    }

    async fn purge_tariff(&self, id: Uuid) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        tables.tariffs.retain(|row| row.id != id);
        Ok(())
    }

    async fn list_links(
        &self,
        kind: PivotKind,
        actividad_id: Uuid,
    ) -> Result<Vec<PivotLink>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .links
            .iter()
            .filter(|(row_kind, link)| *row_kind == kind && link.actividad_id == actividad_id)
            .map(|(_, link)| link.clone())
            .collect())
    }

    async fn delete_links(&self, kind: PivotKind, actividad_id: Uuid) -> Result<(), AppError> {
        self.check_failpoint("delete_links")?;
        let mut tables = self.tables.write().await;
        tables
            .links
            .retain(|(row_kind, link)| !(*row_kind == kind && link.actividad_id == actividad_id));
        Ok(())
    }

    async fn insert_links(
        &self,
        kind: PivotKind,
        links: &[PivotLink],
    ) -> Result<Vec<PivotLink>, AppError> {
        self.check_failpoint("insert_links")?;
        let mut tables = self.tables.write().await;
        tables
            .links
            .extend(links.iter().cloned().map(|link| (kind, link)));
        Ok(links.to_vec())
    }

    async fn insert_reservation(
        &self,
        reservation: &Reservation,
    ) -> Result<Reservation, AppError> {
        self.check_failpoint("insert_reservation")?;
        let mut tables = self.tables.write().await;
        tables.reservations.push(reservation.clone());
        Ok(reservation.clone())
    }

    async fn get_reservation(&self, id: Uuid) -> Result<Option<Reservation>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables.reservations.iter().find(|row| row.id == id).cloned())
    }

    async fn list_reservations(
        &self,
        filter: &ReservationFilter,
    ) -> Result<Vec<Reservation>, AppError> {
        let tables = self.tables.read().await;
        let mut rows = tables
            .reservations
            .iter()
            .filter(|row| filter.include_deleted || row.deleted_at.is_none())
            .filter(|row| filter.agencia_id.is_none_or(|id| row.agencia_id == id))
            .filter(|row| filter.actividad_id.is_none_or(|id| row.actividad_id == id))
            .filter(|row| filter.turno_id.is_none_or(|id| row.turno_id == id))
            .filter(|row| filter.estado.is_none_or(|status| row.estado == status))
            .filter(|row| filter.created_from.is_none_or(|from| row.created_at >= from))
            .filter(|row| filter.created_before.is_none_or(|before| row.created_at < before))
            .cloned()
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            rows.truncate(limit.clamp(1, 1000) as usize);
        }
        Ok(rows)
    }

    async fn save_reservation(&self, reservation: &Reservation) -> Result<Reservation, AppError> {
        self.check_failpoint("save_reservation")?;
        let mut tables = self.tables.write().await;
        replace_by_id(
            &mut tables.reservations,
            reservation.id,
            |row| row.id,
            reservation,
            "reservas",
        )?;
        Ok(reservation.clone())
    }

    async fn purge_reservation(&self, id: Uuid) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        tables.reservations.retain(|row| row.id != id);
        Ok(())
    }
}
