//! Persisted records. Field names follow the table columns.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActivityState {
    #[default]
    Draft,
    Published,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub agencia_id: Uuid,
    pub titulo: String,
    pub descripcion: Option<String>,
    #[serde(default)]
    pub estado: ActivityState,
    pub min_personas: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Activity {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Recurrence definition. `dias_semana` uses 0 = Sunday .. 6 = Saturday.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub actividad_id: Uuid,
    pub agencia_id: Uuid,
    pub fecha_inicio: NaiveDate,
    #[serde(default)]
    pub dias_semana: Option<Vec<u8>>,
    #[serde(default)]
    pub dia_completo: bool,
    #[serde(default, with = "clock_time")]
    pub hora_inicio: Option<NaiveTime>,
    #[serde(default, with = "clock_time")]
    pub hora_fin: Option<NaiveTime>,
    pub cupo: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Schedule {
    pub fn runs_on(&self, date: NaiveDate) -> bool {
        match self.dias_semana.as_deref() {
            None | Some([]) => true,
            Some(days) => {
                let weekday = date.weekday().num_days_from_sunday() as u8;
                days.contains(&weekday)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub id: Uuid,
    pub horario_id: Uuid,
    pub actividad_id: Uuid,
    pub agencia_id: Uuid,
    pub fecha: NaiveDate,
    #[serde(default, with = "clock_time")]
    pub hora_inicio: Option<NaiveTime>,
    #[serde(default, with = "clock_time")]
    pub hora_fin: Option<NaiveTime>,
    pub cupo_total: i32,
    pub cupo_disponible: i32,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Slot {
    pub fn consumed(&self) -> i32 {
        self.cupo_total - self.cupo_disponible
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Expired,
    Cancelled,
    NoShow,
    CheckIn,
}

impl ReservationStatus {
    pub const ALL: [ReservationStatus; 6] = [
        Self::Pending,
        Self::Confirmed,
        Self::Expired,
        Self::Cancelled,
        Self::NoShow,
        Self::CheckIn,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no_show",
            Self::CheckIn => "check_in",
        }
    }

    /// Whether a reservation in this status still occupies seats.
    pub fn holds_capacity(self) -> bool {
        !matches!(self, Self::Cancelled | Self::Expired)
    }

    pub fn can_transition_to(self, next: ReservationStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Confirmed)
                | (Self::Pending, Self::Cancelled)
                | (Self::Pending, Self::Expired)
                | (Self::Confirmed, Self::CheckIn)
                | (Self::Confirmed, Self::NoShow)
                | (Self::Confirmed, Self::Cancelled)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Tarifa,
    Adicional,
    Transporte,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationItem {
    pub id: Uuid,
    pub reserva_id: Uuid,
    pub tipo: ItemKind,
    pub ref_id: Uuid,
    pub cantidad: i32,
    pub precio_unitario: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub agencia_id: Uuid,
    pub actividad_id: Uuid,
    pub turno_id: Uuid,
    pub estado: ReservationStatus,
    pub cliente_nombre: String,
    pub cliente_email: String,
    pub cliente_telefono: Option<String>,
    pub cantidad_personas: i32,
    pub total: f64,
    pub metodo_pago: Option<String>,
    #[serde(default)]
    pub pagado: bool,
    pub motivo_cancelacion: Option<String>,
    #[serde(default)]
    pub items: Vec<ReservationItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tariff {
    pub id: Uuid,
    pub actividad_id: Uuid,
    pub agencia_id: Uuid,
    pub nombre: String,
    pub precio: f64,
    #[serde(default)]
    pub es_principal: bool,
    #[serde(default = "default_true")]
    pub activa: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Tariff {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none() && self.activa
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PivotKind {
    Addons,
    Transports,
    Discounts,
}

impl PivotKind {
    pub fn table(self) -> &'static str {
        match self {
            Self::Addons => "actividad_adicionales",
            Self::Transports => "actividad_transportes",
            Self::Discounts => "actividad_descuentos",
        }
    }

    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment.trim().to_ascii_lowercase().as_str() {
            "addons" | "adicionales" => Some(Self::Addons),
            "transports" | "transportes" => Some(Self::Transports),
            "discounts" | "descuentos" => Some(Self::Discounts),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotLink {
    pub actividad_id: Uuid,
    pub ref_id: Uuid,
    pub precio: Option<f64>,
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

/// `HH:MM` on the wire; also accepts `HH:MM:SS` as returned by Postgres.
pub mod clock_time {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Option<NaiveTime> {
        let trimmed = raw.trim();
        NaiveTime::parse_from_str(trimmed, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
            .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S%.f"))
            .ok()
    }

    pub fn serialize<S>(value: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(time) => serializer.serialize_str(&time.format("%H:%M").to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => parse(text)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid time '{text}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime, Utc};
    use serde_json::json;
    use uuid::Uuid;

    use super::{ReservationStatus, Schedule};

    fn schedule(days: Option<Vec<u8>>) -> Schedule {
        Schedule {
            id: Uuid::new_v4(),
            actividad_id: Uuid::new_v4(),
            agencia_id: Uuid::new_v4(),
            fecha_inicio: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            dias_semana: days,
            dia_completo: false,
            hora_inicio: NaiveTime::from_hms_opt(9, 0, 0),
            hora_fin: NaiveTime::from_hms_opt(11, 0, 0),
            cupo: 10,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn weekday_set_uses_sunday_zero() {
        // 2026-10-19 is a Monday.
        let monday = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let sunday = NaiveDate::from_ymd_opt(2026, 10, 25).unwrap();
        let only_monday = schedule(Some(vec![1]));
        assert!(only_monday.runs_on(monday));
        assert!(!only_monday.runs_on(sunday));
        assert!(schedule(Some(vec![0])).runs_on(sunday));
        assert!(schedule(None).runs_on(sunday));
    }

    #[test]
    fn clock_time_accepts_postgres_seconds() {
        let parsed: Schedule = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "actividad_id": Uuid::new_v4(),
            "agencia_id": Uuid::new_v4(),
            "fecha_inicio": "2026-10-19",
            "dias_semana": [1, 3],
            "dia_completo": false,
            "hora_inicio": "09:00:00",
            "hora_fin": "11:30",
            "cupo": 10,
            "created_at": "2026-10-19T10:00:00.123456+00:00",
            "updated_at": "2026-10-19T10:00:00+00:00",
            "deleted_at": null
        }))
        .unwrap();
        assert_eq!(parsed.hora_inicio, NaiveTime::from_hms_opt(9, 0, 0));
        assert_eq!(parsed.hora_fin, NaiveTime::from_hms_opt(11, 30, 0));
        assert_eq!(
            serde_json::to_value(&parsed).unwrap()["hora_inicio"],
            json!("09:00")
        );
    }

    #[test]
    fn only_live_reservations_follow_the_transition_table() {
        use ReservationStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(CheckIn));
        assert!(!Cancelled.can_transition_to(Confirmed));
        assert!(!CheckIn.can_transition_to(NoShow));
        assert!(!Expired.holds_capacity());
        assert!(NoShow.holds_capacity());
    }
}
