use std::collections::{HashMap, HashSet};

use chrono::{NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Schedule, Slot};
use crate::repository::{SlotFilter, Store};
use crate::schemas::ScheduleEntryInput;
use crate::services::slot_generation::generate_slots;
use crate::services::unit_of_work::UnitOfWork;

/// Agency-local "today" and how far ahead slots are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    pub today: NaiveDate,
    pub horizon_days: u32,
}

/// Where a sync runs: the owning activity and the agency-local calendar.
#[derive(Debug, Clone, Copy)]
pub struct SyncContext {
    pub actividad_id: Uuid,
    pub agencia_id: Uuid,
    pub today: NaiveDate,
    pub horizon_days: u32,
}

impl SyncContext {
    pub fn new(actividad_id: Uuid, agencia_id: Uuid, calendar: Calendar) -> Self {
        Self {
            actividad_id,
            agencia_id,
            today: calendar.today,
            horizon_days: calendar.horizon_days,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ScheduleSyncReport {
    pub inserted: Vec<Uuid>,
    pub updated: Vec<Uuid>,
    pub deleted: Vec<Uuid>,
    pub unchanged: Vec<Uuid>,
    pub slots_generated: usize,
    pub slots_removed: usize,
}

/// Validated entry with its weekday set sorted and deduplicated and its
/// times cleared for whole-day schedules.
#[derive(Debug, Clone, PartialEq)]
struct NormalizedEntry {
    fecha_inicio: NaiveDate,
    dias_semana: Option<Vec<u8>>,
    dia_completo: bool,
    hora_inicio: Option<NaiveTime>,
    hora_fin: Option<NaiveTime>,
    cupo: i32,
}

impl NormalizedEntry {
    fn matches(&self, stored: &Schedule) -> bool {
        let stored_days = normalize_days(stored.dias_semana.as_deref());
        let (stored_inicio, stored_fin) = if stored.dia_completo {
            (None, None)
        } else {
            (stored.hora_inicio, stored.hora_fin)
        };
        self.fecha_inicio == stored.fecha_inicio
            && self.dias_semana == stored_days
            && self.dia_completo == stored.dia_completo
            && self.hora_inicio == stored_inicio
            && self.hora_fin == stored_fin
            && self.cupo == stored.cupo
    }

    fn apply_to(&self, schedule: &mut Schedule) {
        schedule.fecha_inicio = self.fecha_inicio;
        schedule.dias_semana = self.dias_semana.clone();
        schedule.dia_completo = self.dia_completo;
        schedule.hora_inicio = self.hora_inicio;
        schedule.hora_fin = self.hora_fin;
        schedule.cupo = self.cupo;
    }
}

#[derive(Debug, Default)]
struct SchedulePlan {
    inserts: Vec<NormalizedEntry>,
    updates: Vec<(Schedule, NormalizedEntry)>,
    deletes: Vec<Schedule>,
    unchanged: Vec<Uuid>,
}

fn normalize_days(days: Option<&[u8]>) -> Option<Vec<u8>> {
    let days = days?;
    if days.is_empty() {
        return None;
    }
    let mut sorted = days.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    Some(sorted)
}

fn normalize_entry(index: usize, entry: &ScheduleEntryInput) -> AppResult<NormalizedEntry> {
    if entry.cupo < 1 {
        return Err(AppError::validation_with(
            format!("Schedule at index {index} must have a capacity of at least 1."),
            json!({ "index": index, "field": "cupo" }),
        ));
    }
    if let Some(days) = entry.dias_semana.as_deref() {
        if let Some(day) = days.iter().find(|day| **day > 6) {
            return Err(AppError::validation_with(
                format!("Schedule at index {index} has an invalid weekday {day} (0-6)."),
                json!({ "index": index, "field": "dias_semana" }),
            ));
        }
    }

    let (hora_inicio, hora_fin) = if entry.dia_completo {
        (None, None)
    } else {
        match (entry.hora_inicio, entry.hora_fin) {
            (Some(inicio), Some(fin)) if inicio < fin => (Some(inicio), Some(fin)),
            (Some(_), Some(_)) => {
                return Err(AppError::validation_with(
                    format!("Schedule at index {index}: hora_inicio must be before hora_fin."),
                    json!({ "index": index, "field": "hora_inicio" }),
                ))
            }
            _ => {
                return Err(AppError::validation_with(
                    format!(
                        "Schedule at index {index} needs hora_inicio and hora_fin unless it is whole-day."
                    ),
                    json!({ "index": index, "field": "hora_inicio" }),
                ))
            }
        }
    };

    Ok(NormalizedEntry {
        fecha_inicio: entry.fecha_inicio,
        dias_semana: normalize_days(entry.dias_semana.as_deref()),
        dia_completo: entry.dia_completo,
        hora_inicio,
        hora_fin,
        cupo: entry.cupo,
    })
}

fn reject_past_start(index: usize, entry: &NormalizedEntry, today: NaiveDate) -> AppResult<()> {
    if entry.fecha_inicio < today {
        return Err(AppError::validation_with(
            format!(
                "Schedule at index {index} starts on {} which is before today ({today}).",
                entry.fecha_inicio
            ),
            json!({ "index": index, "field": "fecha_inicio" }),
        ));
    }
    Ok(())
}

/// Whole-batch validation and diffing. Performs no writes.
fn plan(
    existing: &[Schedule],
    entries: &[ScheduleEntryInput],
    today: NaiveDate,
) -> AppResult<SchedulePlan> {
    let mut seen = HashSet::new();
    for (index, entry) in entries.iter().enumerate() {
        if let Some(id) = entry.id {
            if !seen.insert(id) {
                return Err(AppError::validation_with(
                    format!("Duplicate schedule id {id} at index {index}."),
                    json!({ "index": index, "field": "id" }),
                ));
            }
        }
    }

    let stored: HashMap<Uuid, &Schedule> =
        existing.iter().map(|schedule| (schedule.id, schedule)).collect();
    let mut result = SchedulePlan::default();

    for (index, entry) in entries.iter().enumerate() {
        let normalized = normalize_entry(index, entry)?;
        match entry.id {
            None => {
                reject_past_start(index, &normalized, today)?;
                result.inserts.push(normalized);
            }
            Some(id) => {
                let current = stored.get(&id).ok_or_else(|| {
                    AppError::NotFound(format!("Schedule {id} not found for this activity."))
                })?;
                if normalized.matches(current) {
                    result.unchanged.push(id);
                } else {
                    reject_past_start(index, &normalized, today)?;
                    result.updates.push(((*current).clone(), normalized));
                }
            }
        }
    }

    result.deletes = existing
        .iter()
        .filter(|schedule| !seen.contains(&schedule.id))
        .cloned()
        .collect();
    Ok(result)
}

async fn live_slots(store: &dyn Store, horario_id: Uuid) -> AppResult<Vec<Slot>> {
    store
        .list_slots(&SlotFilter {
            horario_id: Some(horario_id),
            ..SlotFilter::default()
        })
        .await
}

/// A validated schedule batch whose deletions have no booked seats.
#[derive(Debug)]
pub struct PreparedSync {
    plan: SchedulePlan,
    doomed: Vec<(Schedule, Vec<Slot>)>,
}

/// Validates `entries` against the stored schedules and collects the live
/// slots of every schedule to delete. Performs no writes.
pub async fn prepare_sync(
    store: &dyn Store,
    ctx: &SyncContext,
    entries: &[ScheduleEntryInput],
) -> AppResult<PreparedSync> {
    let existing = store.list_schedules(ctx.actividad_id, false).await?;
    let plan = plan(&existing, entries, ctx.today)?;

    let mut doomed = Vec::new();
    for schedule in &plan.deletes {
        let slots = live_slots(store, schedule.id).await?;
        if let Some(booked) = slots.iter().find(|slot| slot.consumed() > 0) {
            tracing::warn!(
                actividad_id = %ctx.actividad_id,
                horario_id = %schedule.id,
                turno_id = %booked.id,
                "Schedule deletion blocked by reservations"
            );
            return Err(AppError::Conflict(format!(
                "Schedule {} has slots with reservations and cannot be deleted.",
                schedule.id
            )));
        }
        doomed.push((schedule.clone(), slots));
    }
    Ok(PreparedSync { plan, doomed })
}

/// Reconcile the stored schedules of an activity with `entries`.
///
/// Rejects the whole batch before any write when validation fails or when a
/// schedule to delete still has booked seats. Writes run inside one unit of
/// work and are compensated if any of them fails.
pub async fn sync_schedules(
    store: &dyn Store,
    ctx: &SyncContext,
    entries: &[ScheduleEntryInput],
) -> AppResult<ScheduleSyncReport> {
    let prepared = prepare_sync(store, ctx, entries).await?;
    let mut uow = UnitOfWork::begin(store, "schedule_sync");
    let result = apply_sync(&mut uow, ctx, prepared).await;
    let report = uow.finish(result).await?;

    tracing::info!(
        actividad_id = %ctx.actividad_id,
        inserted = report.inserted.len(),
        updated = report.updated.len(),
        deleted = report.deleted.len(),
        unchanged = report.unchanged.len(),
        slots_generated = report.slots_generated,
        slots_removed = report.slots_removed,
        "Schedules synchronized"
    );
    Ok(report)
}

/// Writes a prepared batch through `uow`. The caller finishes the unit.
pub async fn apply_sync(
    uow: &mut UnitOfWork<'_>,
    ctx: &SyncContext,
    prepared: PreparedSync,
) -> AppResult<ScheduleSyncReport> {
    let PreparedSync { plan, doomed } = prepared;
    let now = Utc::now();
    let mut report = ScheduleSyncReport {
        unchanged: plan.unchanged,
        ..ScheduleSyncReport::default()
    };

    for (schedule, slots) in doomed {
        let mut removed = schedule.clone();
        removed.deleted_at = Some(now);
        removed.updated_at = now;
        uow.save_schedule(&schedule, &removed).await?;
        uow.soft_delete_slots(&slots, now).await?;
        report.slots_removed += slots.len();
        report.deleted.push(schedule.id);
    }

    for (previous, entry) in plan.updates {
        let mut next = previous.clone();
        entry.apply_to(&mut next);
        next.updated_at = now;
        let saved = uow.save_schedule(&previous, &next).await?;

        let stale = live_slots(uow.store(), saved.id).await?;
        uow.soft_delete_slots(&stale, now).await?;
        report.slots_removed += stale.len();

        let fresh = generate_slots(&saved, ctx.today, ctx.horizon_days, now);
        report.slots_generated += uow.insert_slots(&fresh).await?.len();
        report.updated.push(saved.id);
    }

    for entry in plan.inserts {
        let saved = insert_schedule(uow, ctx, &entry).await?;
        let fresh = generate_slots(&saved, ctx.today, ctx.horizon_days, now);
        report.slots_generated += uow.insert_slots(&fresh).await?.len();
        report.inserted.push(saved.id);
    }

    Ok(report)
}

async fn insert_schedule(
    uow: &mut UnitOfWork<'_>,
    ctx: &SyncContext,
    entry: &NormalizedEntry,
) -> AppResult<Schedule> {
    let now = Utc::now();
    let mut schedule = Schedule {
        id: Uuid::new_v4(),
        actividad_id: ctx.actividad_id,
        agencia_id: ctx.agencia_id,
        fecha_inicio: entry.fecha_inicio,
        dias_semana: None,
        dia_completo: false,
        hora_inicio: None,
        hora_fin: None,
        cupo: entry.cupo,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };
    entry.apply_to(&mut schedule);
    uow.insert_schedule(&schedule).await
}

/// Insert schedules for a brand-new activity without generating slots.
///
/// Used by activity creation, which hands slot generation to a background
/// job (see [`generate_for_schedules`]).
pub async fn insert_new_schedules(
    uow: &mut UnitOfWork<'_>,
    ctx: &SyncContext,
    entries: &[ScheduleEntryInput],
) -> AppResult<Vec<Schedule>> {
    if entries.iter().any(|entry| entry.id.is_some()) {
        return Err(AppError::validation(
            "New activities cannot reference existing schedule ids.",
        ));
    }
    let plan = plan(&[], entries, ctx.today)?;
    let mut inserted = Vec::with_capacity(plan.inserts.len());
    for entry in &plan.inserts {
        inserted.push(insert_schedule(uow, ctx, entry).await?);
    }
    Ok(inserted)
}

/// Generate and store the slots of freshly inserted schedules.
pub async fn generate_for_schedules(
    store: &dyn Store,
    schedules: &[Schedule],
    calendar: Calendar,
) -> AppResult<usize> {
    let now = Utc::now();
    let mut uow = UnitOfWork::begin(store, "slot_generation");
    let result = async {
        let mut generated = 0;
        for schedule in schedules {
            let fresh = generate_slots(schedule, calendar.today, calendar.horizon_days, now);
            generated += uow.insert_slots(&fresh).await?.len();
        }
        Ok::<usize, AppError>(generated)
    }
    .await;
    uow.finish(result).await
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, NaiveTime};
    use uuid::Uuid;

    use super::{sync_schedules, ScheduleSyncReport, SyncContext};
    use crate::error::AppError;
    use crate::repository::memory_store::MemoryStore;
    use crate::repository::{SlotFilter, Store};
    use crate::schemas::ScheduleEntryInput;

    fn today() -> NaiveDate {
        // A Monday.
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn ctx() -> SyncContext {
        SyncContext {
            actividad_id: Uuid::new_v4(),
            agencia_id: Uuid::new_v4(),
            today: today(),
            horizon_days: 28,
        }
    }

    fn entry(id: Option<Uuid>, cupo: i32) -> ScheduleEntryInput {
        ScheduleEntryInput {
            id,
            fecha_inicio: today(),
            dias_semana: Some(vec![1, 3]),
            dia_completo: false,
            hora_inicio: NaiveTime::from_hms_opt(9, 0, 0),
            hora_fin: NaiveTime::from_hms_opt(11, 0, 0),
            cupo,
        }
    }

    async fn live_slots(store: &MemoryStore, ctx: &SyncContext) -> Vec<crate::models::Slot> {
        store
            .list_slots(&SlotFilter {
                actividad_id: Some(ctx.actividad_id),
                ..SlotFilter::default()
            })
            .await
            .unwrap()
    }

    async fn seeded(store: &MemoryStore, ctx: &SyncContext) -> ScheduleSyncReport {
        sync_schedules(store, ctx, &[entry(None, 10)]).await.unwrap()
    }

    #[tokio::test]
    async fn weekly_schedule_generates_full_capacity_slots() {
        let store = MemoryStore::new();
        let ctx = ctx();
        let report = seeded(&store, &ctx).await;

        assert_eq!(report.inserted.len(), 1);
        assert_eq!(report.slots_generated, 8);
        let slots = live_slots(&store, &ctx).await;
        assert_eq!(slots.len(), 8);
        assert!(slots
            .iter()
            .all(|slot| slot.cupo_total == 10 && slot.cupo_disponible == 10));
    }

    #[tokio::test]
    async fn duplicate_ids_reject_batch_without_writes() {
        let store = MemoryStore::new();
        let ctx = ctx();
        let report = seeded(&store, &ctx).await;
        let id = report.inserted[0];

        let batch = [entry(Some(id), 5), entry(Some(id), 6), entry(None, 3)];
        let error = sync_schedules(&store, &ctx, &batch).await.unwrap_err();
        assert!(matches!(error, AppError::Validation { .. }));
        assert!(error.to_string().contains("Duplicate"));

        let schedules = store.list_schedules(ctx.actividad_id, true).await.unwrap();
        assert_eq!(schedules.len(), 1);
        assert_eq!(schedules[0].cupo, 10);
        assert_eq!(live_slots(&store, &ctx).await.len(), 8);
    }

    #[tokio::test]
    async fn past_start_dates_are_rejected_for_new_and_edited_entries() {
        let store = MemoryStore::new();
        let ctx = ctx();
        let mut past = entry(None, 4);
        past.fecha_inicio = today() - Duration::days(1);
        let error = sync_schedules(&store, &ctx, &[past]).await.unwrap_err();
        assert!(matches!(error, AppError::Validation { .. }));
        assert!(store.list_schedules(ctx.actividad_id, true).await.unwrap().is_empty());

        let report = seeded(&store, &ctx).await;
        let mut edited = entry(Some(report.inserted[0]), 7);
        edited.fecha_inicio = today() - Duration::days(3);
        let error = sync_schedules(&store, &ctx, &[edited]).await.unwrap_err();
        assert!(matches!(error, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn unchanged_entry_with_past_start_is_accepted() {
        let store = MemoryStore::new();
        let mut ctx = ctx();
        let report = seeded(&store, &ctx).await;
        let before = live_slots(&store, &ctx).await;

        // A week later the stored start date is in the past.
        ctx.today = today() + Duration::days(7);
        let again = sync_schedules(&store, &ctx, &[entry(Some(report.inserted[0]), 10)])
            .await
            .unwrap();
        assert_eq!(again.unchanged, report.inserted);
        assert_eq!(again.slots_generated, 0);
        assert_eq!(live_slots(&store, &ctx).await, before);
    }

    #[tokio::test]
    async fn time_window_must_be_complete_and_ordered() {
        let store = MemoryStore::new();
        let ctx = ctx();

        let mut missing = entry(None, 4);
        missing.hora_fin = None;
        assert!(sync_schedules(&store, &ctx, &[missing]).await.is_err());

        let mut inverted = entry(None, 4);
        inverted.hora_inicio = NaiveTime::from_hms_opt(12, 0, 0);
        assert!(sync_schedules(&store, &ctx, &[inverted]).await.is_err());

        let mut equal = entry(None, 4);
        equal.hora_fin = equal.hora_inicio;
        assert!(sync_schedules(&store, &ctx, &[equal]).await.is_err());

        let mut whole_day = entry(None, 4);
        whole_day.dia_completo = true;
        whole_day.hora_inicio = None;
        whole_day.hora_fin = None;
        assert!(sync_schedules(&store, &ctx, &[whole_day]).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_schedule_id_is_not_found() {
        let store = MemoryStore::new();
        let ctx = ctx();
        let error = sync_schedules(&store, &ctx, &[entry(Some(Uuid::new_v4()), 4)])
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn deleting_unbooked_schedule_soft_deletes_slots() {
        let store = MemoryStore::new();
        let ctx = ctx();
        let report = seeded(&store, &ctx).await;

        let removed = sync_schedules(&store, &ctx, &[]).await.unwrap();
        assert_eq!(removed.deleted, report.inserted);
        assert_eq!(removed.slots_removed, 8);
        assert!(live_slots(&store, &ctx).await.is_empty());
        assert!(store.list_schedules(ctx.actividad_id, false).await.unwrap().is_empty());

        let all = store
            .list_slots(&SlotFilter {
                actividad_id: Some(ctx.actividad_id),
                include_deleted: true,
                ..SlotFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 8);
        assert!(all.iter().all(|slot| slot.deleted_at.is_some()));
    }

    #[tokio::test]
    async fn deleting_booked_schedule_is_a_conflict_and_writes_nothing() {
        let store = MemoryStore::new();
        let ctx = ctx();
        seeded(&store, &ctx).await;

        let mut slots = live_slots(&store, &ctx).await;
        let mut booked = slots.remove(2);
        booked.cupo_disponible = 8;
        store.save_slot(&booked).await.unwrap();
        let schedules_before = store.list_schedules(ctx.actividad_id, true).await.unwrap();
        let slots_before = live_slots(&store, &ctx).await;

        let error = sync_schedules(&store, &ctx, &[]).await.unwrap_err();
        assert!(matches!(error, AppError::Conflict(_)));
        assert_eq!(
            store.list_schedules(ctx.actividad_id, true).await.unwrap(),
            schedules_before
        );
        assert_eq!(live_slots(&store, &ctx).await, slots_before);
    }

    #[tokio::test]
    async fn capacity_edit_regenerates_slots() {
        let store = MemoryStore::new();
        let ctx = ctx();
        let report = seeded(&store, &ctx).await;
        let old_ids = live_slots(&store, &ctx)
            .await
            .into_iter()
            .map(|slot| slot.id)
            .collect::<Vec<_>>();

        let edit = sync_schedules(&store, &ctx, &[entry(Some(report.inserted[0]), 5)])
            .await
            .unwrap();
        assert_eq!(edit.updated, report.inserted);
        assert_eq!(edit.slots_removed, 8);
        assert_eq!(edit.slots_generated, 8);

        let fresh = live_slots(&store, &ctx).await;
        assert_eq!(fresh.len(), 8);
        assert!(fresh.iter().all(|slot| slot.cupo_total == 5 && slot.cupo_disponible == 5));
        assert!(fresh.iter().all(|slot| !old_ids.contains(&slot.id)));
    }

    #[tokio::test]
    async fn failure_mid_sync_rolls_everything_back() {
        let store = MemoryStore::new();
        let ctx = ctx();
        let report = seeded(&store, &ctx).await;
        let schedules_before = store.list_schedules(ctx.actividad_id, true).await.unwrap();
        let slots_before = live_slots(&store, &ctx).await;

        store.fail_next("insert_slots");
        let error = sync_schedules(&store, &ctx, &[entry(Some(report.inserted[0]), 5)])
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::Dependency(_)));

        assert_eq!(
            store.list_schedules(ctx.actividad_id, true).await.unwrap(),
            schedules_before
        );
        assert_eq!(live_slots(&store, &ctx).await, slots_before);
    }
}
