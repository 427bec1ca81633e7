use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Activity, PivotKind, PivotLink, Reservation, Schedule, Slot, Tariff};
use crate::repository::Store;

/// Inverse of one write. Replayed newest-first when the unit of work fails.
#[derive(Debug, Clone)]
pub enum Compensation {
    PurgeActivity(Uuid),
    RestoreActivity(Box<Activity>),
    PurgeSchedule(Uuid),
    RestoreSchedule(Box<Schedule>),
    PurgeSlots(Vec<Uuid>),
    RestoreSlots(Vec<Slot>),
    PurgeTariff(Uuid),
    RestoreTariff(Box<Tariff>),
    RestoreLinks {
        kind: PivotKind,
        actividad_id: Uuid,
        links: Vec<PivotLink>,
    },
    PurgeReservation(Uuid),
    RestoreReservation(Box<Reservation>),
}

/// Compensating-action log over a [`Store`].
///
/// Every write goes through one of the helpers below, which records the
/// inverse *before* touching the store. A partially applied write is
/// therefore still undone on rollback: purging a row that was never inserted
/// and restoring an unchanged snapshot are both no-ops.
pub struct UnitOfWork<'a> {
    store: &'a dyn Store,
    label: &'static str,
    log: Vec<Compensation>,
}

impl<'a> UnitOfWork<'a> {
    pub fn begin(store: &'a dyn Store, label: &'static str) -> Self {
        Self {
            store,
            label,
            log: Vec::new(),
        }
    }

    pub fn store(&self) -> &'a dyn Store {
        self.store
    }

    pub fn pending_compensations(&self) -> usize {
        self.log.len()
    }

    pub fn record(&mut self, compensation: Compensation) {
        self.log.push(compensation);
    }

    /// Commit on `Ok`, roll back on `Err`. The original error is always returned.
    pub async fn finish<T>(self, result: AppResult<T>) -> AppResult<T> {
        match result {
            Ok(value) => {
                self.commit();
                Ok(value)
            }
            Err(error) => {
                tracing::warn!(unit = self.label, error = %error, "Rolling back unit of work");
                self.rollback().await;
                Err(error)
            }
        }
    }

    pub fn commit(self) {
        tracing::debug!(unit = self.label, writes = self.log.len(), "Unit of work committed");
    }

    pub async fn rollback(self) {
        let store = self.store;
        let label = self.label;
        for compensation in self.log.into_iter().rev() {
            if let Err(error) = apply(store, &compensation).await {
                tracing::error!(
                    unit = label,
                    error = %error,
                    compensation = ?compensation,
                    "Compensating action failed"
                );
            }
        }
    }

    pub async fn insert_activity(&mut self, activity: &Activity) -> AppResult<Activity> {
        self.record(Compensation::PurgeActivity(activity.id));
        self.store.insert_activity(activity).await
    }

    pub async fn save_activity(
        &mut self,
        previous: &Activity,
        next: &Activity,
    ) -> AppResult<Activity> {
        self.record(Compensation::RestoreActivity(Box::new(previous.clone())));
        self.store.save_activity(next).await
    }

    pub async fn insert_schedule(&mut self, schedule: &Schedule) -> AppResult<Schedule> {
        self.record(Compensation::PurgeSchedule(schedule.id));
        self.store.insert_schedule(schedule).await
    }

    pub async fn save_schedule(
        &mut self,
        previous: &Schedule,
        next: &Schedule,
    ) -> AppResult<Schedule> {
        self.record(Compensation::RestoreSchedule(Box::new(previous.clone())));
        self.store.save_schedule(next).await
    }

    pub async fn insert_slots(&mut self, slots: &[Slot]) -> AppResult<Vec<Slot>> {
        if slots.is_empty() {
            return Ok(Vec::new());
        }
        self.record(Compensation::PurgeSlots(
            slots.iter().map(|slot| slot.id).collect(),
        ));
        self.store.insert_slots(slots).await
    }

    pub async fn soft_delete_slots(&mut self, slots: &[Slot], at: DateTime<Utc>) -> AppResult<()> {
        if slots.is_empty() {
            return Ok(());
        }
        self.record(Compensation::RestoreSlots(slots.to_vec()));
        let ids = slots.iter().map(|slot| slot.id).collect::<Vec<_>>();
        self.store.soft_delete_slots(&ids, at).await
    }

    pub async fn insert_tariff(&mut self, tariff: &Tariff) -> AppResult<Tariff> {
        self.record(Compensation::PurgeTariff(tariff.id));
        self.store.insert_tariff(tariff).await
    }

    pub async fn save_tariff(&mut self, previous: &Tariff, next: &Tariff) -> AppResult<Tariff> {
        self.record(Compensation::RestoreTariff(Box::new(previous.clone())));
        self.store.save_tariff(next).await
    }

    pub async fn soft_delete_tariff(
        &mut self,
        previous: &Tariff,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        self.record(Compensation::RestoreTariff(Box::new(previous.clone())));
        self.store.soft_delete_tariff(previous.id, at).await
    }

    /// Replace every link of `kind` for the activity.
    pub async fn replace_links(
        &mut self,
        kind: PivotKind,
        actividad_id: Uuid,
        links: &[PivotLink],
    ) -> AppResult<Vec<PivotLink>> {
        let previous = self.store.list_links(kind, actividad_id).await?;
        self.record(Compensation::RestoreLinks {
            kind,
            actividad_id,
            links: previous,
        });
        self.store.delete_links(kind, actividad_id).await?;
        if links.is_empty() {
            return Ok(Vec::new());
        }
        self.store.insert_links(kind, links).await
    }

    pub async fn insert_reservation(&mut self, reservation: &Reservation) -> AppResult<Reservation> {
        self.record(Compensation::PurgeReservation(reservation.id));
        self.store.insert_reservation(reservation).await
    }

    pub async fn save_reservation(
        &mut self,
        previous: &Reservation,
        next: &Reservation,
    ) -> AppResult<Reservation> {
        self.record(Compensation::RestoreReservation(Box::new(previous.clone())));
        self.store.save_reservation(next).await
    }

    pub async fn save_slot(&mut self, previous: &Slot, next: &Slot) -> AppResult<Slot> {
        self.record(Compensation::RestoreSlots(vec![previous.clone()]));
        self.store.save_slot(next).await
    }
}

async fn apply(store: &dyn Store, compensation: &Compensation) -> AppResult<()> {
    match compensation {
        Compensation::PurgeActivity(id) => store.purge_activity(*id).await,
        Compensation::RestoreActivity(activity) => store.save_activity(activity).await.map(drop),
        Compensation::PurgeSchedule(id) => store.purge_schedule(*id).await,
        Compensation::RestoreSchedule(schedule) => store.save_schedule(schedule).await.map(drop),
        Compensation::PurgeSlots(ids) => store.purge_slots(ids).await,
        Compensation::RestoreSlots(slots) => {
            for slot in slots {
                store.save_slot(slot).await?;
            }
            Ok(())
        }
        Compensation::PurgeTariff(id) => store.purge_tariff(*id).await,
        Compensation::RestoreTariff(tariff) => store.save_tariff(tariff).await.map(drop),
        Compensation::RestoreLinks {
            kind,
            actividad_id,
            links,
        } => {
            store.delete_links(*kind, *actividad_id).await?;
            if !links.is_empty() {
                store.insert_links(*kind, links).await?;
            }
            Ok(())
        }
        Compensation::PurgeReservation(id) => store.purge_reservation(*id).await,
        Compensation::RestoreReservation(reservation) => {
            store.save_reservation(reservation).await.map(drop)
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime, Utc};
    use uuid::Uuid;

    use super::UnitOfWork;
    use crate::error::{AppError, AppResult};
    use crate::models::{PivotKind, PivotLink, Schedule};
    use crate::repository::memory_store::MemoryStore;
    use crate::repository::Store;

    fn schedule(actividad_id: Uuid) -> Schedule {
        Schedule {
            id: Uuid::new_v4(),
            actividad_id,
            agencia_id: Uuid::new_v4(),
            fecha_inicio: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            dias_semana: None,
            dia_completo: false,
            hora_inicio: NaiveTime::from_hms_opt(9, 0, 0),
            hora_fin: NaiveTime::from_hms_opt(10, 0, 0),
            cupo: 4,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn failed_unit_restores_previous_rows() {
        let store = MemoryStore::new();
        let actividad_id = Uuid::new_v4();
        let original = store.insert_schedule(&schedule(actividad_id)).await.unwrap();

        let mut uow = UnitOfWork::begin(&store, "test");
        let mut edited = original.clone();
        edited.cupo = 99;
        let result: AppResult<()> = async {
            uow.save_schedule(&original, &edited).await?;
            uow.insert_schedule(&schedule(actividad_id)).await?;
            Err(AppError::Internal("boom".to_string()))
        }
        .await;
        let error = uow.finish(result).await.unwrap_err();

        assert!(matches!(error, AppError::Internal(_)));
        let rows = store.list_schedules(actividad_id, true).await.unwrap();
        assert_eq!(rows, vec![original]);
    }

    #[tokio::test]
    async fn failed_link_replacement_brings_back_old_links() {
        let store = MemoryStore::new();
        let actividad_id = Uuid::new_v4();
        let existing = PivotLink {
            actividad_id,
            ref_id: Uuid::new_v4(),
            precio: Some(12.0),
            created_at: Utc::now(),
        };
        store
            .insert_links(PivotKind::Addons, std::slice::from_ref(&existing))
            .await
            .unwrap();

        store.fail_next("insert_links");
        let mut uow = UnitOfWork::begin(&store, "test");
        let replacement = PivotLink {
            ref_id: Uuid::new_v4(),
            ..existing.clone()
        };
        let result = uow
            .replace_links(PivotKind::Addons, actividad_id, &[replacement])
            .await;
        assert!(uow.finish(result).await.is_err());

        let links = store.list_links(PivotKind::Addons, actividad_id).await.unwrap();
        assert_eq!(links, vec![existing]);
    }

    #[tokio::test]
    async fn committed_unit_keeps_writes() {
        let store = MemoryStore::new();
        let actividad_id = Uuid::new_v4();
        let mut uow = UnitOfWork::begin(&store, "test");
        let inserted = uow.insert_schedule(&schedule(actividad_id)).await;
        assert_eq!(uow.pending_compensations(), 1);
        uow.finish(inserted).await.unwrap();
        assert_eq!(store.list_schedules(actividad_id, false).await.unwrap().len(), 1);
    }
}
