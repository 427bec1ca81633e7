use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::Tariff;
use crate::schemas::TariffEntryInput;
use crate::services::unit_of_work::UnitOfWork;

#[derive(Debug, Clone, Default, Serialize)]
pub struct TariffSyncReport {
    pub tarifas: Vec<Tariff>,
    pub inserted: Vec<Uuid>,
    pub updated: Vec<Uuid>,
    pub deleted: Vec<Uuid>,
    /// Tariffs that should have been removed but are still referenced.
    pub retained: Vec<Uuid>,
    pub principal_id: Option<Uuid>,
}

fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn validate_entries(entries: &[TariffEntryInput]) -> AppResult<()> {
    let mut names: HashMap<String, usize> = HashMap::new();
    let mut ids = HashSet::new();
    for (index, entry) in entries.iter().enumerate() {
        let key = name_key(&entry.nombre);
        if key.is_empty() {
            return Err(AppError::validation_with(
                format!("Tariff at index {index} needs a name."),
                json!({ "index": index, "field": "nombre" }),
            ));
        }
        if !entry.precio.is_finite() || entry.precio < 0.0 {
            return Err(AppError::validation_with(
                format!("Tariff at index {index} has an invalid price."),
                json!({ "index": index, "field": "precio" }),
            ));
        }
        if let Some(first) = names.insert(key, index) {
            return Err(AppError::validation_with(
                format!(
                    "Duplicate tariff name '{}' at index {index} (first used at index {first}).",
                    entry.nombre.trim()
                ),
                json!({ "index": index, "duplicate_of": first, "field": "nombre" }),
            ));
        }
        if let Some(id) = entry.id {
            if !ids.insert(id) {
                return Err(AppError::validation_with(
                    format!("Duplicate tariff id {id} at index {index}."),
                    json!({ "index": index, "field": "id" }),
                ));
            }
        }
    }
    Ok(())
}

/// A tariff kept alive by reservations still owns its name, so no entry may
/// reuse it.
fn reject_retained_name_clash(
    existing: &[Tariff],
    retained: &[Uuid],
    entries: &[TariffEntryInput],
) -> AppResult<()> {
    for tariff in existing.iter().filter(|tariff| retained.contains(&tariff.id)) {
        let key = name_key(&tariff.nombre);
        if let Some(index) = entries
            .iter()
            .position(|entry| name_key(&entry.nombre) == key)
        {
            return Err(AppError::validation_with(
                format!(
                    "Tariff name '{}' at index {index} is still used by tariff {}, which has reservations.",
                    entries[index].nombre.trim(),
                    tariff.id
                ),
                json!({ "index": index, "field": "nombre", "duplicate_of": tariff.id }),
            ));
        }
    }
    Ok(())
}

/// Reconcile the tariffs of an activity with `entries`, keeping exactly one
/// principal tariff whenever any tariff is left.
pub async fn sync_tariffs(
    uow: &mut UnitOfWork<'_>,
    actividad_id: Uuid,
    agencia_id: Uuid,
    entries: &[TariffEntryInput],
) -> AppResult<TariffSyncReport> {
    validate_entries(entries)?;

    let store = uow.store();
    let existing = store.list_tariffs(actividad_id, false).await?;
    let stored: HashMap<Uuid, &Tariff> = existing.iter().map(|tariff| (tariff.id, tariff)).collect();
    if let Some(unknown) = entries
        .iter()
        .filter_map(|entry| entry.id)
        .find(|id| !stored.contains_key(id))
    {
        return Err(AppError::NotFound(format!(
            "Tariff {unknown} not found for this activity."
        )));
    }

    let principal_index = entries.iter().position(|entry| entry.es_principal);
    let demoted = entries
        .iter()
        .enumerate()
        .filter(|(index, entry)| entry.es_principal && Some(*index) != principal_index)
        .count();
    if demoted > 0 {
        tracing::info!(%actividad_id, demoted, "Extra principal tariffs demoted");
    }

    let now = Utc::now();
    let mut report = TariffSyncReport::default();
    let mut kept = HashSet::new();
    let mut chosen_principal = None;

    for (index, entry) in entries.iter().enumerate() {
        let es_principal = Some(index) == principal_index;
        match entry.id.and_then(|id| stored.get(&id).copied()) {
            Some(previous) => {
                kept.insert(previous.id);
                let mut next = previous.clone();
                next.nombre = entry.nombre.trim().to_string();
                next.precio = entry.precio;
                next.es_principal = es_principal;
                next.activa = entry.activa;
                if next != *previous {
                    next.updated_at = now;
                    uow.save_tariff(previous, &next).await?;
                    report.updated.push(next.id);
                }
                if es_principal {
                    chosen_principal = Some(next.id);
                }
            }
            None => {
                let tariff = Tariff {
                    id: Uuid::new_v4(),
                    actividad_id,
                    agencia_id,
                    nombre: entry.nombre.trim().to_string(),
                    precio: entry.precio,
                    es_principal,
                    activa: entry.activa,
                    created_at: now,
                    updated_at: now,
                    deleted_at: None,
                };
                let saved = uow.insert_tariff(&tariff).await?;
                kept.insert(saved.id);
                report.inserted.push(saved.id);
                if es_principal {
                    chosen_principal = Some(saved.id);
                }
            }
        }
    }

    for tariff in existing.iter().filter(|tariff| !kept.contains(&tariff.id)) {
        match uow.soft_delete_tariff(tariff, now).await {
            Ok(()) => report.deleted.push(tariff.id),
            Err(AppError::ForeignKey(detail)) => {
                tracing::warn!(
                    %actividad_id,
                    tarifa_id = %tariff.id,
                    detail = %detail,
                    "Tariff still referenced by reservations, keeping it"
                );
                report.retained.push(tariff.id);
            }
            Err(error) => return Err(error),
        }
    }
    reject_retained_name_clash(&existing, &report.retained, entries)?;

    report.principal_id = settle_principal(uow, actividad_id, chosen_principal).await?;
    report.tarifas = uow.store().list_tariffs(actividad_id, false).await?;
    Ok(report)
}

/// Leave exactly one principal among the live tariffs of the activity.
///
/// The explicit choice wins. Otherwise an existing principal is kept and,
/// failing that, the earliest-created active tariff is promoted.
async fn settle_principal(
    uow: &mut UnitOfWork<'_>,
    actividad_id: Uuid,
    chosen: Option<Uuid>,
) -> AppResult<Option<Uuid>> {
    let live = uow.store().list_tariffs(actividad_id, false).await?;
    let winner = chosen
        .or_else(|| live.iter().find(|tariff| tariff.es_principal).map(|tariff| tariff.id))
        .or_else(|| live.iter().find(|tariff| tariff.is_active()).map(|tariff| tariff.id));

    let now = Utc::now();
    for tariff in &live {
        let should_be_principal = Some(tariff.id) == winner;
        if tariff.es_principal != should_be_principal {
            let mut next = tariff.clone();
            next.es_principal = should_be_principal;
            next.updated_at = now;
            uow.save_tariff(tariff, &next).await?;
            if should_be_principal {
                tracing::info!(%actividad_id, tarifa_id = %tariff.id, "Promoted tariff to principal");
            }
        }
    }
    Ok(winner)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::sync_tariffs;
    use crate::error::AppError;
    use crate::models::{ItemKind, Reservation, ReservationItem, ReservationStatus, Tariff};
    use crate::repository::memory_store::MemoryStore;
    use crate::repository::Store;
    use crate::schemas::TariffEntryInput;
    use crate::services::unit_of_work::UnitOfWork;

    fn entry(id: Option<Uuid>, nombre: &str, es_principal: bool) -> TariffEntryInput {
        TariffEntryInput {
            id,
            nombre: nombre.to_string(),
            precio: 100.0,
            es_principal,
            activa: true,
        }
    }

    fn stored(actividad_id: Uuid, nombre: &str, age_minutes: i64) -> Tariff {
        let created = Utc::now() - Duration::minutes(age_minutes);
        Tariff {
            id: Uuid::new_v4(),
            actividad_id,
            agencia_id: Uuid::new_v4(),
            nombre: nombre.to_string(),
            precio: 50.0,
            es_principal: false,
            activa: true,
            created_at: created,
            updated_at: created,
            deleted_at: None,
        }
    }

    async fn run(
        store: &MemoryStore,
        actividad_id: Uuid,
        entries: &[TariffEntryInput],
    ) -> Result<super::TariffSyncReport, AppError> {
        let mut uow = UnitOfWork::begin(store, "test");
        let result = sync_tariffs(&mut uow, actividad_id, Uuid::new_v4(), entries).await;
        uow.finish(result).await
    }

    async fn book(store: &MemoryStore, actividad_id: Uuid, tarifa_id: Uuid) {
        let reserva_id = Uuid::new_v4();
        store
            .insert_reservation(&Reservation {
                id: reserva_id,
                agencia_id: Uuid::new_v4(),
                actividad_id,
                turno_id: Uuid::new_v4(),
                estado: ReservationStatus::Confirmed,
                cliente_nombre: "Ana".to_string(),
                cliente_email: "ana@example.com".to_string(),
                cliente_telefono: None,
                cantidad_personas: 2,
                total: 100.0,
                metodo_pago: None,
                pagado: true,
                motivo_cancelacion: None,
                items: vec![ReservationItem {
                    id: Uuid::new_v4(),
                    reserva_id,
                    tipo: ItemKind::Tarifa,
                    ref_id: tarifa_id,
                    cantidad: 2,
                    precio_unitario: 50.0,
                }],
                created_at: Utc::now(),
                updated_at: Utc::now(),
                deleted_at: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn duplicate_names_report_the_index() {
        let store = MemoryStore::new();
        let entries = [
            entry(None, "Adulto", true),
            entry(None, "Menor", false),
            entry(None, "  aDULTO ", false),
        ];
        let error = run(&store, Uuid::new_v4(), &entries).await.unwrap_err();
        match error {
            AppError::Validation { message, errors } => {
                assert!(message.contains("index 2"));
                assert_eq!(errors.unwrap()["index"], 2);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn first_principal_claimant_wins() {
        let store = MemoryStore::new();
        let actividad_id = Uuid::new_v4();
        let entries = [
            entry(None, "Adulto", true),
            entry(None, "Jubilado", true),
            entry(None, "Menor", false),
        ];
        let report = run(&store, actividad_id, &entries).await.unwrap();

        let principals = report
            .tarifas
            .iter()
            .filter(|tariff| tariff.es_principal)
            .collect::<Vec<_>>();
        assert_eq!(principals.len(), 1);
        assert_eq!(principals[0].nombre, "Adulto");
        assert_eq!(report.principal_id, Some(principals[0].id));
    }

    #[tokio::test]
    async fn earliest_active_tariff_is_promoted_when_none_flagged() {
        let store = MemoryStore::new();
        let actividad_id = Uuid::new_v4();
        let older = store.insert_tariff(&stored(actividad_id, "Adulto", 30)).await.unwrap();
        let newer = store.insert_tariff(&stored(actividad_id, "Menor", 10)).await.unwrap();

        let entries = [
            entry(Some(newer.id), "Menor", false),
            entry(Some(older.id), "Adulto", false),
        ];
        let report = run(&store, actividad_id, &entries).await.unwrap();
        assert_eq!(report.principal_id, Some(older.id));
        let principal = report.tarifas.iter().find(|tariff| tariff.es_principal).unwrap();
        assert_eq!(principal.id, older.id);
    }

    #[tokio::test]
    async fn referenced_tariff_survives_removal() {
        let store = MemoryStore::new();
        let actividad_id = Uuid::new_v4();
        let booked = store.insert_tariff(&stored(actividad_id, "Adulto", 30)).await.unwrap();
        let free = store.insert_tariff(&stored(actividad_id, "Menor", 20)).await.unwrap();
        book(&store, actividad_id, booked.id).await;

        let report = run(&store, actividad_id, &[entry(None, "General", false)])
            .await
            .unwrap();
        assert_eq!(report.retained, vec![booked.id]);
        assert_eq!(report.deleted, vec![free.id]);
        let live_ids = report.tarifas.iter().map(|tariff| tariff.id).collect::<Vec<_>>();
        assert!(live_ids.contains(&booked.id));
        assert_eq!(report.tarifas.iter().filter(|t| t.es_principal).count(), 1);
    }

    #[tokio::test]
    async fn new_tariff_cannot_take_a_retained_name() {
        let store = MemoryStore::new();
        let actividad_id = Uuid::new_v4();
        let booked = store.insert_tariff(&stored(actividad_id, "Adulto", 30)).await.unwrap();
        book(&store, actividad_id, booked.id).await;

        let error = run(&store, actividad_id, &[entry(None, " adulto ", true)])
            .await
            .unwrap_err();
        match error {
            AppError::Validation { message, errors } => {
                assert!(message.contains("index 0"), "got: {message}");
                let errors = errors.unwrap();
                assert_eq!(errors["index"], 0);
                assert_eq!(errors["duplicate_of"], booked.id.to_string());
            }
            other => panic!("unexpected error {other:?}"),
        }

        let live = store.list_tariffs(actividad_id, false).await.unwrap();
        let names = live.iter().map(|tariff| tariff.nombre.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Adulto"]);
    }

    #[tokio::test]
    async fn foreign_activity_tariff_id_is_not_found() {
        let store = MemoryStore::new();
        let other = store
            .insert_tariff(&stored(Uuid::new_v4(), "Adulto", 5))
            .await
            .unwrap();
        let error = run(&store, Uuid::new_v4(), &[entry(Some(other.id), "Adulto", true)])
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn negative_price_is_rejected() {
        let store = MemoryStore::new();
        let mut bad = entry(None, "Adulto", true);
        bad.precio = -1.0;
        let error = run(&store, Uuid::new_v4(), &[bad]).await.unwrap_err();
        assert!(matches!(error, AppError::Validation { .. }));
    }
}
