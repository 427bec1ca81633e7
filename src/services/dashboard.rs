use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveTime};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::ReservationStatus;
use crate::repository::{ReservationFilter, SlotFilter, Store};

const DEFAULT_WINDOW_DAYS: i64 = 30;
const MAX_WINDOW_DAYS: i64 = 366;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DashboardMetrics {
    pub desde: NaiveDate,
    pub hasta: NaiveDate,
    pub reservas_por_estado: BTreeMap<String, usize>,
    pub personas_confirmadas: i64,
    pub ingresos: f64,
    pub turnos_proximos: usize,
    pub cupo_total: i64,
    pub cupo_ocupado: i64,
    pub ocupacion: f64,
}

fn resolve_range(
    today: NaiveDate,
    desde: Option<NaiveDate>,
    hasta: Option<NaiveDate>,
) -> AppResult<(NaiveDate, NaiveDate)> {
    let desde = desde.unwrap_or(today - Duration::days(DEFAULT_WINDOW_DAYS));
    let hasta = hasta.unwrap_or(today + Duration::days(DEFAULT_WINDOW_DAYS));
    if desde > hasta {
        return Err(AppError::validation("desde must be on or before hasta."));
    }
    if (hasta - desde).num_days() > MAX_WINDOW_DAYS {
        return Err(AppError::validation(format!(
            "Date range cannot exceed {MAX_WINDOW_DAYS} days."
        )));
    }
    Ok((desde, hasta))
}

/// Reservation and occupancy figures for one agency.
///
/// Reservations are counted by creation date within the range; occupancy
/// covers live slots from today up to `hasta`.
pub async fn agency_metrics(
    store: &dyn Store,
    agencia_id: Uuid,
    today: NaiveDate,
    desde: Option<NaiveDate>,
    hasta: Option<NaiveDate>,
) -> AppResult<DashboardMetrics> {
    let (desde, hasta) = resolve_range(today, desde, hasta)?;

    let day_start = |day: NaiveDate| day.and_time(NaiveTime::MIN).and_utc();
    let reservations = store
        .list_reservations(&ReservationFilter {
            agencia_id: Some(agencia_id),
            created_from: Some(day_start(desde)),
            created_before: Some(day_start(hasta + Duration::days(1))),
            ..ReservationFilter::default()
        })
        .await?;

    let mut reservas_por_estado: BTreeMap<String, usize> = ReservationStatus::ALL
        .iter()
        .map(|status| (status.as_str().to_string(), 0))
        .collect();
    let mut personas_confirmadas = 0_i64;
    let mut ingresos = 0.0_f64;
    for reservation in &reservations {
        *reservas_por_estado
            .entry(reservation.estado.as_str().to_string())
            .or_insert(0) += 1;
        if matches!(
            reservation.estado,
            ReservationStatus::Confirmed | ReservationStatus::CheckIn
        ) {
            personas_confirmadas += i64::from(reservation.cantidad_personas);
            ingresos += reservation.total;
        }
    }

    let upcoming = if hasta >= today {
        store
            .list_slots(&SlotFilter {
                agencia_id: Some(agencia_id),
                desde: Some(today),
                hasta: Some(hasta),
                ..SlotFilter::default()
            })
            .await?
    } else {
        Vec::new()
    };
    let cupo_total: i64 = upcoming.iter().map(|slot| i64::from(slot.cupo_total)).sum();
    let cupo_ocupado: i64 = upcoming.iter().map(|slot| i64::from(slot.consumed())).sum();
    let ocupacion = if cupo_total > 0 {
        ((cupo_ocupado as f64 / cupo_total as f64) * 10_000.0).round() / 10_000.0
    } else {
        0.0
    };

    Ok(DashboardMetrics {
        desde,
        hasta,
        reservas_por_estado,
        personas_confirmadas,
        ingresos: (ingresos * 100.0).round() / 100.0,
        turnos_proximos: upcoming.len(),
        cupo_total,
        cupo_ocupado,
        ocupacion,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, Utc};
    use uuid::Uuid;

    use super::{agency_metrics, resolve_range};
    use crate::models::{Reservation, ReservationStatus, Slot};
    use crate::repository::memory_store::MemoryStore;
    use crate::repository::Store;

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    fn slot(agencia_id: Uuid, disponible: i32) -> Slot {
        Slot {
            id: Uuid::new_v4(),
            horario_id: Uuid::new_v4(),
            actividad_id: Uuid::new_v4(),
            agencia_id,
            fecha: today(),
            hora_inicio: None,
            hora_fin: None,
            cupo_total: 10,
            cupo_disponible: disponible,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    fn reservation(agencia_id: Uuid, estado: ReservationStatus, total: f64) -> Reservation {
        Reservation {
            id: Uuid::new_v4(),
            agencia_id,
            actividad_id: Uuid::new_v4(),
            turno_id: Uuid::new_v4(),
            estado,
            cliente_nombre: "Ana".to_string(),
            cliente_email: "ana@example.com".to_string(),
            cliente_telefono: None,
            cantidad_personas: 2,
            total,
            metodo_pago: None,
            pagado: false,
            motivo_cancelacion: None,
            items: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn metrics_count_statuses_revenue_and_occupancy() {
        let store = MemoryStore::new();
        let agencia_id = Uuid::new_v4();
        store
            .insert_slots(&[slot(agencia_id, 4), slot(agencia_id, 10), slot(Uuid::new_v4(), 0)])
            .await
            .unwrap();
        for (estado, total) in [
            (ReservationStatus::Confirmed, 200.0),
            (ReservationStatus::CheckIn, 150.5),
            (ReservationStatus::Cancelled, 99.0),
            (ReservationStatus::Pending, 80.0),
        ] {
            store
                .insert_reservation(&reservation(agencia_id, estado, total))
                .await
                .unwrap();
        }

        let metrics = agency_metrics(&store, agencia_id, today(), None, None).await.unwrap();
        assert_eq!(metrics.reservas_por_estado["confirmed"], 1);
        assert_eq!(metrics.reservas_por_estado["cancelled"], 1);
        assert_eq!(metrics.reservas_por_estado["no_show"], 0);
        assert_eq!(metrics.personas_confirmadas, 4);
        assert_eq!(metrics.ingresos, 350.5);
        assert_eq!(metrics.turnos_proximos, 2);
        assert_eq!(metrics.cupo_total, 20);
        assert_eq!(metrics.cupo_ocupado, 6);
        assert_eq!(metrics.ocupacion, 0.3);
    }

    #[tokio::test]
    async fn reservations_outside_the_window_are_not_counted() {
        let store = MemoryStore::new();
        let agencia_id = Uuid::new_v4();
        let mut old = reservation(agencia_id, ReservationStatus::Confirmed, 500.0);
        old.created_at = Utc::now() - Duration::days(90);
        store.insert_reservation(&old).await.unwrap();
        store
            .insert_reservation(&reservation(agencia_id, ReservationStatus::Confirmed, 40.0))
            .await
            .unwrap();

        let metrics = agency_metrics(&store, agencia_id, today(), None, None).await.unwrap();
        assert_eq!(metrics.reservas_por_estado["confirmed"], 1);
        assert_eq!(metrics.ingresos, 40.0);

        let wide = agency_metrics(
            &store,
            agencia_id,
            today(),
            Some(today() - Duration::days(120)),
            Some(today()),
        )
        .await
        .unwrap();
        assert_eq!(wide.reservas_por_estado["confirmed"], 2);
        assert_eq!(wide.ingresos, 540.0);
    }

    #[test]
    fn inverted_range_is_rejected() {
        let day = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let earlier = NaiveDate::from_ymd_opt(2026, 10, 1).unwrap();
        assert!(resolve_range(day, Some(day), Some(earlier)).is_err());
        assert!(resolve_range(day, None, None).is_ok());
    }
}
