use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Activity, PivotKind, PivotLink, Schedule, Tariff};
use crate::repository::{ActivityFilter, Store};
use crate::schemas::{ActivitiesQuery, CreateActivityInput, UpdateActivityInput};
use crate::services::jobs::{JobHandle, JobRegistry};
use crate::services::pivot_sync::replace_links;
use crate::services::schedule_sync::{
    apply_sync, generate_for_schedules, insert_new_schedules, prepare_sync, Calendar,
    ScheduleSyncReport, SyncContext,
};
use crate::services::tariff_sync::sync_tariffs;
use crate::services::unit_of_work::UnitOfWork;

#[derive(Debug, Clone, Serialize)]
pub struct ActivityDetail {
    #[serde(flatten)]
    pub actividad: Activity,
    pub tarifas: Vec<Tariff>,
    pub adicionales: Vec<PivotLink>,
    pub transportes: Vec<PivotLink>,
    pub descuentos: Vec<PivotLink>,
    pub horarios: Vec<Schedule>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedActivity {
    #[serde(flatten)]
    pub detail: ActivityDetail,
    /// Background job generating the slots of the new schedules.
    pub slot_job_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletedActivity {
    pub id: Uuid,
    pub horarios: ScheduleSyncReport,
}

/// Fetch an activity owned by `agencia_id`. Soft-deleted and foreign rows are
/// reported as missing.
pub async fn load_activity(store: &dyn Store, agencia_id: Uuid, id: Uuid) -> AppResult<Activity> {
    match store.get_activity(id).await? {
        Some(activity) if activity.agencia_id == agencia_id && activity.is_active() => Ok(activity),
        _ => Err(AppError::NotFound("Activity not found.".to_string())),
    }
}

pub async fn list_activities(
    store: &dyn Store,
    agencia_id: Uuid,
    query: &ActivitiesQuery,
) -> AppResult<Vec<Activity>> {
    let filter = ActivityFilter {
        agencia_id: Some(agencia_id),
        ids: query.id.into_iter().collect(),
        include_deleted: query.include_deleted,
    };
    let rows = store.list_activities(&filter).await?;
    Ok(rows
        .into_iter()
        .filter(|activity| query.estado.is_none_or(|estado| activity.estado == estado))
        .collect())
}

pub async fn get_activity_detail(
    store: &dyn Store,
    agencia_id: Uuid,
    id: Uuid,
) -> AppResult<ActivityDetail> {
    let actividad = load_activity(store, agencia_id, id).await?;
    detail_for(store, actividad).await
}

async fn detail_for(store: &dyn Store, actividad: Activity) -> AppResult<ActivityDetail> {
    let id = actividad.id;
    Ok(ActivityDetail {
        tarifas: store.list_tariffs(id, false).await?,
        adicionales: store.list_links(PivotKind::Addons, id).await?,
        transportes: store.list_links(PivotKind::Transports, id).await?,
        descuentos: store.list_links(PivotKind::Discounts, id).await?,
        horarios: store.list_schedules(id, false).await?,
        actividad,
    })
}

fn clean_title(titulo: &str) -> AppResult<String> {
    let trimmed = titulo.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation_with(
            "titulo cannot be blank.",
            json!({ "field": "titulo" }),
        ));
    }
    Ok(trimmed.to_string())
}

/// Create an activity with its tariffs, links and schedules in one unit of
/// work. Slots for the new schedules are generated by a background job whose
/// handle is returned alongside the stored activity. Dropping the handle
/// leaves the job running; its progress stays readable under `/jobs/{id}`.
pub async fn create_activity(
    store: Arc<dyn Store>,
    jobs: &JobRegistry,
    agencia_id: Uuid,
    calendar: Calendar,
    input: &CreateActivityInput,
) -> AppResult<(CreatedActivity, Option<JobHandle>)> {
    let titulo = clean_title(&input.titulo)?;
    let now = Utc::now();
    let activity = Activity {
        id: Uuid::new_v4(),
        agencia_id,
        titulo,
        descripcion: input.descripcion.clone(),
        estado: input.estado,
        min_personas: input.min_personas,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };
    let ctx = SyncContext::new(activity.id, agencia_id, calendar);

    let mut uow = UnitOfWork::begin(store.as_ref(), "create_activity");
    let result = async {
        let saved = uow.insert_activity(&activity).await?;
        if !input.tarifas.is_empty() {
            sync_tariffs(&mut uow, saved.id, agencia_id, &input.tarifas).await?;
        }
        for (kind, entries) in [
            (PivotKind::Addons, &input.adicionales),
            (PivotKind::Transports, &input.transportes),
            (PivotKind::Discounts, &input.descuentos),
        ] {
            if !entries.is_empty() {
                replace_links(&mut uow, kind, saved.id, entries).await?;
            }
        }
        let schedules = insert_new_schedules(&mut uow, &ctx, &input.horarios).await?;
        Ok::<_, AppError>((saved, schedules))
    }
    .await;
    let (saved, schedules) = uow.finish(result).await?;

    tracing::info!(
        actividad_id = %saved.id,
        agencia_id = %agencia_id,
        horarios = schedules.len(),
        "Activity created"
    );

    let handle = if schedules.is_empty() {
        None
    } else {
        let job_store = Arc::clone(&store);
        let job_schedules = schedules;
        Some(
            jobs.spawn("slot_generation", async move {
                let generated =
                    generate_for_schedules(job_store.as_ref(), &job_schedules, calendar).await?;
                Ok(json!({
                    "horarios": job_schedules.iter().map(|s| s.id).collect::<Vec<_>>(),
                    "slots_generated": generated,
                }))
            })
            .await,
        )
    };

    let detail = detail_for(store.as_ref(), saved).await?;
    Ok((
        CreatedActivity {
            detail,
            slot_job_id: handle.as_ref().map(JobHandle::id),
        },
        handle,
    ))
}

pub async fn update_activity(
    store: &dyn Store,
    agencia_id: Uuid,
    id: Uuid,
    input: &UpdateActivityInput,
) -> AppResult<Activity> {
    let previous = load_activity(store, agencia_id, id).await?;
    let mut next = previous.clone();
    if let Some(titulo) = input.titulo.as_deref() {
        next.titulo = clean_title(titulo)?;
    }
    if let Some(descripcion) = &input.descripcion {
        next.descripcion = Some(descripcion.clone()).filter(|text| !text.trim().is_empty());
    }
    if let Some(estado) = input.estado {
        next.estado = estado;
    }
    if let Some(min_personas) = input.min_personas {
        next.min_personas = min_personas;
    }
    if next == previous {
        return Ok(previous);
    }
    next.updated_at = Utc::now();
    store.save_activity(&next).await
}

/// Soft-delete an activity together with its schedules and their slots.
///
/// Fails with a conflict, leaving everything in place, when any slot already
/// has bookings. Schedule removal and the activity write share one unit of
/// work, so a failed write restores all of them.
pub async fn delete_activity(
    store: &dyn Store,
    agencia_id: Uuid,
    id: Uuid,
    calendar: Calendar,
) -> AppResult<DeletedActivity> {
    let previous = load_activity(store, agencia_id, id).await?;
    let ctx = SyncContext::new(id, agencia_id, calendar);
    let prepared = prepare_sync(store, &ctx, &[]).await?;

    let mut uow = UnitOfWork::begin(store, "activity_delete");
    let result = async {
        let horarios = apply_sync(&mut uow, &ctx, prepared).await?;
        let mut removed = previous.clone();
        let now = Utc::now();
        removed.deleted_at = Some(now);
        removed.updated_at = now;
        uow.save_activity(&previous, &removed).await?;
        Ok::<_, AppError>(horarios)
    }
    .await;
    let horarios = uow.finish(result).await?;
    tracing::info!(actividad_id = %id, "Activity soft-deleted");
    Ok(DeletedActivity { id, horarios })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::NaiveDate;
    use serde_json::json;
    use uuid::Uuid;

    use super::{create_activity, delete_activity, get_activity_detail, list_activities, update_activity};
    use crate::error::AppError;
    use crate::models::ActivityState;
    use crate::repository::memory_store::MemoryStore;
    use crate::repository::{SlotFilter, Store};
    use crate::schemas::{
        ActivitiesQuery, CreateActivityInput, ScheduleEntryInput, UpdateActivityInput,
    };
    use crate::services::jobs::{JobRegistry, JobStatus};
    use crate::services::schedule_sync::{sync_schedules, Calendar, SyncContext};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn calendar() -> Calendar {
        Calendar {
            today: today(),
            horizon_days: 28,
        }
    }

    fn input() -> CreateActivityInput {
        serde_json::from_value(json!({
            "titulo": "  Cabalgata en la sierra ",
            "min_personas": 2,
            "tarifas": [
                { "nombre": "Adulto", "precio": 45000.0 },
                { "nombre": "Menor", "precio": 30000.0 }
            ],
            "adicionales": [ { "ref_id": Uuid::new_v4(), "precio": 5000.0 } ],
            "horarios": [
                {
                    "fecha_inicio": "2026-10-19",
                    "dias_semana": [1, 3],
                    "hora_inicio": "09:00",
                    "hora_fin": "11:00",
                    "cupo": 10
                }
            ]
        }))
        .unwrap()
    }

    fn setup() -> (Arc<MemoryStore>, Arc<dyn Store>, JobRegistry) {
        let memory = Arc::new(MemoryStore::new());
        let store: Arc<dyn Store> = memory.clone();
        (memory, store, JobRegistry::new(Duration::from_secs(60), 100))
    }

    #[tokio::test]
    async fn create_then_edit_capacity_end_to_end() {
        let (_, store, jobs) = setup();
        let agencia_id = Uuid::new_v4();

        let (created, handle) = create_activity(store.clone(), &jobs, agencia_id, calendar(), &input())
            .await
            .unwrap();
        assert_eq!(created.detail.actividad.titulo, "Cabalgata en la sierra");
        assert_eq!(created.detail.tarifas.len(), 2);
        assert_eq!(created.detail.tarifas.iter().filter(|t| t.es_principal).count(), 1);
        assert_eq!(created.detail.adicionales.len(), 1);

        let record = handle.unwrap().wait().await.unwrap();
        assert_eq!(record.status, JobStatus::Succeeded);
        assert_eq!(record.result.unwrap()["slots_generated"], 8);

        let actividad_id = created.detail.actividad.id;
        let filter = SlotFilter {
            actividad_id: Some(actividad_id),
            ..SlotFilter::default()
        };
        let slots = store.list_slots(&filter).await.unwrap();
        assert_eq!(slots.len(), 8);
        assert!(slots.iter().all(|s| s.cupo_total == 10 && s.cupo_disponible == 10));

        let horario = &created.detail.horarios[0];
        let ctx = SyncContext::new(actividad_id, agencia_id, calendar());
        let entries: Vec<ScheduleEntryInput> = serde_json::from_value(json!([{
            "id": horario.id,
            "fecha_inicio": "2026-10-19",
            "dias_semana": [1, 3],
            "hora_inicio": "09:00",
            "hora_fin": "11:00",
            "cupo": 5
        }]))
        .unwrap();
        let report = sync_schedules(store.as_ref(), &ctx, &entries).await.unwrap();
        assert_eq!(report.slots_removed, 8);

        let fresh = store.list_slots(&filter).await.unwrap();
        assert_eq!(fresh.len(), 8);
        assert!(fresh.iter().all(|s| s.cupo_total == 5 && s.cupo_disponible == 5));
    }

    #[tokio::test]
    async fn failed_creation_leaves_nothing_behind() {
        let (memory, store, jobs) = setup();
        let agencia_id = Uuid::new_v4();
        memory.fail_next("insert_schedule");

        let error = create_activity(store.clone(), &jobs, agencia_id, calendar(), &input())
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::Dependency(_)));

        let query = ActivitiesQuery {
            id: None,
            estado: None,
            include_deleted: true,
        };
        assert!(list_activities(store.as_ref(), agencia_id, &query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn other_agencies_cannot_see_the_activity() {
        let (_, store, jobs) = setup();
        let (created, _) = create_activity(store.clone(), &jobs, Uuid::new_v4(), calendar(), &input())
            .await
            .unwrap();
        let error = get_activity_detail(store.as_ref(), Uuid::new_v4(), created.detail.actividad.id)
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn patch_and_delete() {
        let (_, store, jobs) = setup();
        let agencia_id = Uuid::new_v4();
        let (created, handle) = create_activity(store.clone(), &jobs, agencia_id, calendar(), &input())
            .await
            .unwrap();
        handle.unwrap().wait().await.unwrap();
        let id = created.detail.actividad.id;

        let patch = UpdateActivityInput {
            titulo: None,
            descripcion: Some("Salida con guía".to_string()),
            estado: Some(ActivityState::Published),
            min_personas: None,
        };
        let updated = update_activity(store.as_ref(), agencia_id, id, &patch).await.unwrap();
        assert_eq!(updated.estado, ActivityState::Published);
        assert_eq!(updated.min_personas, 2);

        let deleted = delete_activity(store.as_ref(), agencia_id, id, calendar())
            .await
            .unwrap();
        assert_eq!(deleted.horarios.deleted.len(), 1);
        assert_eq!(deleted.horarios.slots_removed, 8);
        assert!(matches!(
            get_activity_detail(store.as_ref(), agencia_id, id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn failed_delete_restores_schedules_and_slots() {
        let (memory, store, jobs) = setup();
        let agencia_id = Uuid::new_v4();
        let (created, handle) = create_activity(store.clone(), &jobs, agencia_id, calendar(), &input())
            .await
            .unwrap();
        handle.unwrap().wait().await.unwrap();
        let id = created.detail.actividad.id;

        memory.fail_next("save_activity");
        let error = delete_activity(store.as_ref(), agencia_id, id, calendar())
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::Dependency(_)));

        let detail = get_activity_detail(store.as_ref(), agencia_id, id).await.unwrap();
        assert!(detail.actividad.deleted_at.is_none());
        assert_eq!(store.list_schedules(id, false).await.unwrap().len(), 1);
        let slots = store
            .list_slots(&SlotFilter {
                actividad_id: Some(id),
                ..SlotFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(slots.len(), 8);
    }
}
