use chrono::{DateTime, Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::{Schedule, Slot};

/// Expand a schedule into concrete slots for `[max(fecha_inicio, today), today + horizon)`.
///
/// Whole-day schedules produce slots without times. Every slot starts with
/// its full capacity available.
pub fn generate_slots(
    schedule: &Schedule,
    today: NaiveDate,
    horizon_days: u32,
    now: DateTime<Utc>,
) -> Vec<Slot> {
    let start = schedule.fecha_inicio.max(today);
    let end = today + Duration::days(i64::from(horizon_days));
    let (hora_inicio, hora_fin) = if schedule.dia_completo {
        (None, None)
    } else {
        (schedule.hora_inicio, schedule.hora_fin)
    };

    start
        .iter_days()
        .take_while(|date| *date < end)
        .filter(|date| schedule.runs_on(*date))
        .map(|fecha| Slot {
            id: Uuid::new_v4(),
            horario_id: schedule.id,
            actividad_id: schedule.actividad_id,
            agencia_id: schedule.agencia_id,
            fecha,
            hora_inicio,
            hora_fin,
            cupo_total: schedule.cupo,
            cupo_disponible: schedule.cupo,
            created_at: now,
            deleted_at: None,
        })
        .collect()
}
