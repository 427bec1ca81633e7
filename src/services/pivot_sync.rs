use std::collections::HashSet;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{PivotKind, PivotLink};
use crate::schemas::PivotEntryInput;
use crate::services::unit_of_work::UnitOfWork;

/// Replace every add-on, transport or discount link of an activity.
pub async fn replace_links(
    uow: &mut UnitOfWork<'_>,
    kind: PivotKind,
    actividad_id: Uuid,
    entries: &[PivotEntryInput],
) -> AppResult<Vec<PivotLink>> {
    let mut seen = HashSet::new();
    for (index, entry) in entries.iter().enumerate() {
        if !seen.insert(entry.ref_id) {
            return Err(AppError::validation_with(
                format!("Duplicate reference {} at index {index}.", entry.ref_id),
                json!({ "index": index, "field": "ref_id" }),
            ));
        }
        if entry.precio.is_some_and(|precio| !precio.is_finite() || precio < 0.0) {
            return Err(AppError::validation_with(
                format!("Entry at index {index} has an invalid price."),
                json!({ "index": index, "field": "precio" }),
            ));
        }
    }

    let now = Utc::now();
    let links = entries
        .iter()
        .map(|entry| PivotLink {
            actividad_id,
            ref_id: entry.ref_id,
            precio: entry.precio,
            created_at: now,
        })
        .collect::<Vec<_>>();

    let saved = uow.replace_links(kind, actividad_id, &links).await?;
    tracing::info!(%actividad_id, kind = kind.table(), count = saved.len(), "Links replaced");
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::replace_links;
    use crate::error::AppError;
    use crate::models::PivotKind;
    use crate::repository::memory_store::MemoryStore;
    use crate::repository::Store;
    use crate::schemas::PivotEntryInput;
    use crate::services::unit_of_work::UnitOfWork;

    fn entry(ref_id: Uuid) -> PivotEntryInput {
        PivotEntryInput {
            ref_id,
            precio: Some(15.0),
        }
    }

    #[tokio::test]
    async fn empty_list_clears_every_link() {
        let store = MemoryStore::new();
        let actividad_id = Uuid::new_v4();
        for kind in [PivotKind::Addons, PivotKind::Transports] {
            let mut uow = UnitOfWork::begin(&store, "test");
            let result = replace_links(
                &mut uow,
                kind,
                actividad_id,
                &[entry(Uuid::new_v4()), entry(Uuid::new_v4())],
            )
            .await;
            uow.finish(result).await.unwrap();
        }

        let mut uow = UnitOfWork::begin(&store, "test");
        let result = replace_links(&mut uow, PivotKind::Addons, actividad_id, &[]).await;
        assert!(uow.finish(result).await.unwrap().is_empty());

        assert!(store
            .list_links(PivotKind::Addons, actividad_id)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            store
                .list_links(PivotKind::Transports, actividad_id)
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn replacement_swaps_the_whole_list() {
        let store = MemoryStore::new();
        let actividad_id = Uuid::new_v4();
        let keep = Uuid::new_v4();

        let mut uow = UnitOfWork::begin(&store, "test");
        let first = replace_links(&mut uow, PivotKind::Discounts, actividad_id, &[entry(Uuid::new_v4())]).await;
        uow.finish(first).await.unwrap();

        let mut uow = UnitOfWork::begin(&store, "test");
        let second = replace_links(&mut uow, PivotKind::Discounts, actividad_id, &[entry(keep)]).await;
        uow.finish(second).await.unwrap();

        let links = store.list_links(PivotKind::Discounts, actividad_id).await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].ref_id, keep);
    }

    #[tokio::test]
    async fn duplicate_reference_is_rejected() {
        let store = MemoryStore::new();
        let ref_id = Uuid::new_v4();
        let mut uow = UnitOfWork::begin(&store, "test");
        let error = replace_links(
            &mut uow,
            PivotKind::Addons,
            Uuid::new_v4(),
            &[entry(ref_id), entry(ref_id)],
        )
        .await
        .unwrap_err();
        assert!(matches!(error, AppError::Validation { .. }));
        assert_eq!(uow.pending_compensations(), 0);
    }
}
