use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Map, Value};
use sqlx::PgPool;
use uuid::Uuid;

use super::table_service::{
    create_row, delete_rows, find_row, list_rows, update_row, update_rows,
};
use super::{ActivityFilter, ReservationFilter, SlotFilter, Store};
use crate::error::AppError;
use crate::models::{
    Activity, PivotKind, PivotLink, Reservation, ReservationItem, Schedule, Slot, Tariff,
};
use crate::schemas::{remove_nulls, serialize_to_map};

const LIST_LIMIT: i64 = 10_000;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_record<T>(&self, table: &str, record: &T) -> Result<T, AppError>
    where
        T: Serialize + DeserializeOwned,
    {
        let payload = remove_nulls(serialize_to_map(record));
        let created = create_row(&self.pool, table, &payload).await?;
        decode(table, created)
    }

    async fn save_record<T>(&self, table: &str, id: Uuid, record: &T) -> Result<T, AppError>
    where
        T: Serialize + DeserializeOwned,
    {
        let mut payload = serialize_to_map(record);
        payload.remove("id");
        payload.remove("items");
        let updated = update_row(&self.pool, table, &id.to_string(), &payload, "id").await?;
        decode(table, updated)
    }

    async fn find_record<T>(&self, table: &str, id: Uuid) -> Result<Option<T>, AppError>
    where
        T: DeserializeOwned,
    {
        find_row(&self.pool, table, &id.to_string(), "id")
            .await?
            .map(|row| decode(table, row))
            .transpose()
    }

    async fn list_records<T>(
        &self,
        table: &str,
        filters: &Map<String, Value>,
        limit: i64,
        order_by: &str,
        ascending: bool,
    ) -> Result<Vec<T>, AppError>
    where
        T: DeserializeOwned,
    {
        list_rows(&self.pool, table, Some(filters), limit, 0, order_by, ascending)
            .await?
            .into_iter()
            .map(|row| decode(table, row))
            .collect()
    }

    async fn purge_ids(&self, table: &str, ids: &[Uuid]) -> Result<(), AppError> {
        if ids.is_empty() {
            return Ok(());
        }
        delete_rows(&self.pool, table, &id_filter(ids)).await?;
        Ok(())
    }

    async fn attach_items(&self, reservations: &mut [Reservation]) -> Result<(), AppError> {
        if reservations.is_empty() {
            return Ok(());
        }
        let ids = reservations.iter().map(|row| row.id).collect::<Vec<_>>();
        let mut filters = Map::new();
        filters.insert("reserva_id".to_string(), uuid_array(&ids));
        let items: Vec<ReservationItem> = self
            .list_records("reserva_items", &filters, LIST_LIMIT, "id", true)
            .await?;

        let mut grouped: HashMap<Uuid, Vec<ReservationItem>> = HashMap::new();
        for item in items {
            grouped.entry(item.reserva_id).or_default().push(item);
        }
        for reservation in reservations.iter_mut() {
            reservation.items = grouped.remove(&reservation.id).unwrap_or_default();
        }
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(table: &str, row: Value) -> Result<T, AppError> {
    serde_json::from_value(row)
        .map_err(|error| AppError::Internal(format!("Could not decode {table} row: {error}")))
}

fn uuid_array(ids: &[Uuid]) -> Value {
    Value::Array(ids.iter().map(|id| Value::String(id.to_string())).collect())
}

fn id_filter(ids: &[Uuid]) -> Map<String, Value> {
    let mut filters = Map::new();
    filters.insert("id".to_string(), uuid_array(ids));
    filters
}

fn live_filter(include_deleted: bool) -> Map<String, Value> {
    let mut filters = Map::new();
    if !include_deleted {
        filters.insert("deleted_at__is_null".to_string(), Value::Bool(true));
    }
    filters
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|error| {
                tracing::error!(error = %error, "Database ping failed");
                AppError::Dependency("Database is unreachable.".to_string())
            })?;
        Ok(())
    }

    async fn insert_activity(&self, activity: &Activity) -> Result<Activity, AppError> {
        self.insert_record("actividades", activity).await
    }

    async fn get_activity(&self, id: Uuid) -> Result<Option<Activity>, AppError> {
        self.find_record("actividades", id).await
    }

    async fn list_activities(&self, filter: &ActivityFilter) -> Result<Vec<Activity>, AppError> {
        let mut filters = live_filter(filter.include_deleted);
        if let Some(agency) = filter.agencia_id {
            filters.insert("agencia_id".to_string(), Value::String(agency.to_string()));
        }
        if !filter.ids.is_empty() {
            filters.insert("id".to_string(), uuid_array(&filter.ids));
        }
        self.list_records("actividades", &filters, LIST_LIMIT, "created_at", false)
            .await
    }

    async fn save_activity(&self, activity: &Activity) -> Result<Activity, AppError> {
        self.save_record("actividades", activity.id, activity).await
    }

    async fn purge_activity(&self, id: Uuid) -> Result<(), AppError> {
        self.purge_ids("actividades", &[id]).await
    }

    async fn list_schedules(
        &self,
        actividad_id: Uuid,
        include_deleted: bool,
    ) -> Result<Vec<Schedule>, AppError> {
        let mut filters = live_filter(include_deleted);
        filters.insert(
            "actividad_id".to_string(),
            Value::String(actividad_id.to_string()),
        );
        self.list_records("horarios", &filters, LIST_LIMIT, "fecha_inicio", true)
            .await
    }

    async fn insert_schedule(&self, schedule: &Schedule) -> Result<Schedule, AppError> {
        self.insert_record("horarios", schedule).await
    }

    async fn save_schedule(&self, schedule: &Schedule) -> Result<Schedule, AppError> {
        self.save_record("horarios", schedule.id, schedule).await
    }

    async fn purge_schedule(&self, id: Uuid) -> Result<(), AppError> {
        self.purge_ids("horarios", &[id]).await
    }

    async fn list_slots(&self, filter: &SlotFilter) -> Result<Vec<Slot>, AppError> {
        let mut filters = live_filter(filter.include_deleted);
        for (key, value) in [
            ("agencia_id", filter.agencia_id),
            ("actividad_id", filter.actividad_id),
            ("horario_id", filter.horario_id),
        ] {
            if let Some(id) = value {
                filters.insert(key.to_string(), Value::String(id.to_string()));
            }
        }
        if let Some(from) = filter.desde {
            filters.insert("fecha__gte".to_string(), Value::String(from.to_string()));
        }
        if let Some(to) = filter.hasta {
            filters.insert("fecha__lte".to_string(), Value::String(to.to_string()));
        }
        self.list_records("turnos", &filters, LIST_LIMIT, "fecha", true)
            .await
    }

    async fn get_slot(&self, id: Uuid) -> Result<Option<Slot>, AppError> {
        self.find_record("turnos", id).await
    }

    async fn insert_slots(&self, slots: &[Slot]) -> Result<Vec<Slot>, AppError> {
        let mut created = Vec::with_capacity(slots.len());
        for slot in slots {
            created.push(self.insert_record("turnos", slot).await?);
        }
        Ok(created)
    }

    async fn save_slot(&self, slot: &Slot) -> Result<Slot, AppError> {
        self.save_record("turnos", slot.id, slot).await
    }

    async fn soft_delete_slots(&self, ids: &[Uuid], at: DateTime<Utc>) -> Result<(), AppError> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut patch = Map::new();
        patch.insert("deleted_at".to_string(), Value::String(at.to_rfc3339()));
        update_rows(&self.pool, "turnos", &id_filter(ids), &patch).await?;
        Ok(())
    }

    async fn purge_slots(&self, ids: &[Uuid]) -> Result<(), AppError> {
        self.purge_ids("turnos", ids).await
    }

    async fn list_tariffs(
        &self,
        actividad_id: Uuid,
        include_deleted: bool,
    ) -> Result<Vec<Tariff>, AppError> {
        let mut filters = live_filter(include_deleted);
        filters.insert(
            "actividad_id".to_string(),
            Value::String(actividad_id.to_string()),
        );
        self.list_records("tarifas", &filters, LIST_LIMIT, "created_at", true)
            .await
    }

    async fn insert_tariff(&self, tariff: &Tariff) -> Result<Tariff, AppError> {
        self.insert_record("tarifas", tariff).await
    }

    async fn save_tariff(&self, tariff: &Tariff) -> Result<Tariff, AppError> {
        self.save_record("tarifas", tariff.id, tariff).await
    }

    async fn soft_delete_tariff(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        let mut patch = Map::new();
        patch.insert("deleted_at".to_string(), Value::String(at.to_rfc3339()));
        patch.insert("es_principal".to_string(), Value::Bool(false));
        let affected = update_rows(&self.pool, "tarifas", &id_filter(&[id]), &patch).await?;
        if affected == 0 {
            return Err(AppError::NotFound("tarifas record not found.".to_string()));
        }
        Ok(())
    }

    async fn purge_tariff(&self, id: Uuid) -> Result<(), AppError> {
        self.purge_ids("tarifas", &[id]).await
    }

    async fn list_links(
        &self,
        kind: PivotKind,
        actividad_id: Uuid,
    ) -> Result<Vec<PivotLink>, AppError> {
        let mut filters = Map::new();
        filters.insert(
            "actividad_id".to_string(),
            Value::String(actividad_id.to_string()),
        );
        self.list_records(kind.table(), &filters, LIST_LIMIT, "created_at", true)
            .await
    }

    async fn delete_links(&self, kind: PivotKind, actividad_id: Uuid) -> Result<(), AppError> {
        let mut filters = Map::new();
        filters.insert(
            "actividad_id".to_string(),
            Value::String(actividad_id.to_string()),
        );
        delete_rows(&self.pool, kind.table(), &filters).await?;
        Ok(())
    }

    async fn insert_links(
        &self,
        kind: PivotKind,
        links: &[PivotLink],
    ) -> Result<Vec<PivotLink>, AppError> {
        let mut created = Vec::with_capacity(links.len());
        for link in links {
            created.push(self.insert_record(kind.table(), link).await?);
        }
        Ok(created)
    }

    async fn insert_reservation(
        &self,
        reservation: &Reservation,
    ) -> Result<Reservation, AppError> {
        let mut payload = remove_nulls(serialize_to_map(reservation));
        payload.remove("items");
        let created = create_row(&self.pool, "reservas", &payload).await?;
        let mut stored: Reservation = decode("reservas", created)?;

        for item in &reservation.items {
            let row = create_row(
                &self.pool,
                "reserva_items",
                &remove_nulls(serialize_to_map(item)),
            )
            .await?;
            stored.items.push(decode("reserva_items", row)?);
        }
        Ok(stored)
    }

    async fn get_reservation(&self, id: Uuid) -> Result<Option<Reservation>, AppError> {
        let Some(reservation) = self.find_record::<Reservation>("reservas", id).await? else {
            return Ok(None);
        };
        let mut rows = vec![reservation];
        self.attach_items(&mut rows).await?;
        Ok(rows.pop())
    }

    async fn list_reservations(
        &self,
        filter: &ReservationFilter,
    ) -> Result<Vec<Reservation>, AppError> {
        let mut filters = live_filter(filter.include_deleted);
        for (key, value) in [
            ("agencia_id", filter.agencia_id),
            ("actividad_id", filter.actividad_id),
            ("turno_id", filter.turno_id),
        ] {
            if let Some(id) = value {
                filters.insert(key.to_string(), Value::String(id.to_string()));
            }
        }
        if let Some(status) = filter.estado {
            filters.insert("estado".to_string(), json!(status.as_str()));
        }
        if let Some(from) = filter.created_from {
            filters.insert("created_at__gte".to_string(), Value::String(from.to_rfc3339()));
        }
        if let Some(before) = filter.created_before {
            filters.insert("created_at__lt".to_string(), Value::String(before.to_rfc3339()));
        }
        let mut rows: Vec<Reservation> = self
            .list_records(
                "reservas",
                &filters,
                filter.limit.unwrap_or(LIST_LIMIT),
                "created_at",
                false,
            )
            .await?;
        self.attach_items(&mut rows).await?;
        Ok(rows)
    }

    async fn save_reservation(&self, reservation: &Reservation) -> Result<Reservation, AppError> {
        let mut saved: Reservation = self
            .save_record("reservas", reservation.id, reservation)
            .await?;
        saved.items = reservation.items.clone();
        Ok(saved)
    }

    async fn purge_reservation(&self, id: Uuid) -> Result<(), AppError> {
        let mut filters = Map::new();
        filters.insert("reserva_id".to_string(), Value::String(id.to_string()));
        delete_rows(&self.pool, "reserva_items", &filters).await?;
        self.purge_ids("reservas", &[id]).await
    }
}
