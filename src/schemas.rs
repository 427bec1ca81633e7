use axum::{
    extract::{FromRequest, Request},
    Json,
};
use chrono::{NaiveDate, NaiveTime};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;
use crate::models::{clock_time, ActivityState, ItemKind, ReservationStatus};

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input.validate().map_err(AppError::from)
}

/// JSON body that has been parsed and passed `validator` checks. Malformed
/// bodies are reported through the error envelope instead of axum's plain text.
pub struct ValidJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| {
                AppError::validation_with(
                    "Invalid request body.",
                    json!({ "body": rejection.body_text() }),
                )
            })?;
        validate_input(&value)?;
        Ok(Self(value))
    }
}

fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_min_personas() -> i32 {
    1
}
fn default_lang_es() -> String {
    "es".to_string()
}
fn default_limit_200() -> i64 {
    200
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct ScheduleEntryInput {
    pub id: Option<Uuid>,
    pub fecha_inicio: NaiveDate,
    #[serde(default)]
    pub dias_semana: Option<Vec<u8>>,
    #[serde(default = "default_false")]
    pub dia_completo: bool,
    #[serde(default, with = "clock_time")]
    pub hora_inicio: Option<NaiveTime>,
    #[serde(default, with = "clock_time")]
    pub hora_fin: Option<NaiveTime>,
    #[validate(range(min = 1, max = 100000))]
    pub cupo: i32,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct SyncSchedulesInput {
    #[serde(default)]
    #[validate(nested)]
    pub horarios: Vec<ScheduleEntryInput>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct TariffEntryInput {
    pub id: Option<Uuid>,
    #[validate(length(min = 1, max = 120))]
    pub nombre: String,
    #[validate(range(min = 0.0))]
    pub precio: f64,
    #[serde(default = "default_false")]
    pub es_principal: bool,
    #[serde(default = "default_true")]
    pub activa: bool,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct SyncTariffsInput {
    #[serde(default)]
    #[validate(nested)]
    pub tarifas: Vec<TariffEntryInput>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct PivotEntryInput {
    pub ref_id: Uuid,
    #[validate(range(min = 0.0))]
    pub precio: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct ReplacePivotsInput {
    #[serde(default)]
    #[validate(nested)]
    pub items: Vec<PivotEntryInput>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateActivityInput {
    #[validate(length(min = 1, max = 200))]
    pub titulo: String,
    pub descripcion: Option<String>,
    #[serde(default)]
    pub estado: ActivityState,
    #[serde(default = "default_min_personas")]
    #[validate(range(min = 1, max = 1000))]
    pub min_personas: i32,
    #[serde(default)]
    #[validate(nested)]
    pub tarifas: Vec<TariffEntryInput>,
    #[serde(default)]
    #[validate(nested)]
    pub adicionales: Vec<PivotEntryInput>,
    #[serde(default)]
    #[validate(nested)]
    pub transportes: Vec<PivotEntryInput>,
    #[serde(default)]
    #[validate(nested)]
    pub descuentos: Vec<PivotEntryInput>,
    #[serde(default)]
    #[validate(nested)]
    pub horarios: Vec<ScheduleEntryInput>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct UpdateActivityInput {
    #[validate(length(min = 1, max = 200))]
    pub titulo: Option<String>,
    pub descripcion: Option<String>,
    pub estado: Option<ActivityState>,
    #[validate(range(min = 1, max = 1000))]
    pub min_personas: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct ReservationItemInput {
    pub tipo: ItemKind,
    pub ref_id: Uuid,
    #[validate(range(min = 1, max = 1000))]
    pub cantidad: i32,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateReservationInput {
    pub turno_id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub cliente_nombre: String,
    #[validate(email)]
    pub cliente_email: String,
    #[validate(length(max = 40))]
    pub cliente_telefono: Option<String>,
    #[validate(range(min = 1, max = 1000))]
    pub cantidad_personas: i32,
    pub metodo_pago: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub items: Vec<ReservationItemInput>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct ReservationStatusInput {
    pub estado: ReservationStatus,
    #[validate(length(max = 500))]
    pub motivo: Option<String>,
    pub pagado: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivitiesQuery {
    pub id: Option<Uuid>,
    pub estado: Option<ActivityState>,
    #[serde(default = "default_false")]
    pub include_deleted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncludeDeletedQuery {
    #[serde(default = "default_false")]
    pub include_deleted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TariffsQuery {
    pub actividad_id: Uuid,
    pub es_principal: Option<bool>,
    pub activa: Option<bool>,
    #[serde(default = "default_false")]
    pub include_deleted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotsQuery {
    pub actividad_id: Option<Uuid>,
    pub horario_id: Option<Uuid>,
    pub desde: Option<NaiveDate>,
    pub hasta: Option<NaiveDate>,
    #[serde(default = "default_false")]
    pub include_deleted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReservationsQuery {
    pub actividad_id: Option<Uuid>,
    pub turno_id: Option<Uuid>,
    pub estado: Option<ReservationStatus>,
    #[serde(default = "default_limit_200")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsQuery {
    pub desde: Option<NaiveDate>,
    pub hasta: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntegrationCodeQuery {
    #[serde(default = "default_lang_es")]
    pub idioma: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivityPath {
    pub activity_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PivotPath {
    pub activity_id: Uuid,
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReservationPath {
    pub reservation_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobPath {
    pub job_id: Uuid,
}

pub fn serialize_to_map<T>(value: &T) -> serde_json::Map<String, serde_json::Value>
where
    T: serde::Serialize,
{
    let json = serde_json::to_value(value)
        .unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new()));
    json.as_object().cloned().unwrap_or_default()
}

pub fn remove_nulls(
    mut map: serde_json::Map<String, serde_json::Value>,
) -> serde_json::Map<String, serde_json::Value> {
    map.retain(|_, value| !value.is_null());
    map
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use validator::Validate;

    use super::{remove_nulls, serialize_to_map, CreateActivityInput, SyncSchedulesInput};

    #[test]
    fn nested_schedule_capacity_is_validated() {
        let input: SyncSchedulesInput = serde_json::from_value(json!({
            "horarios": [
                { "fecha_inicio": "2026-10-19", "hora_inicio": "09:00", "hora_fin": "11:00", "cupo": 0 }
            ]
        }))
        .unwrap();
        let errors = input.validate().unwrap_err();
        assert!(errors.to_string().contains("cupo"));
    }

    #[test]
    fn activity_defaults_apply() {
        let input: CreateActivityInput =
            serde_json::from_value(json!({ "titulo": "Kayak al atardecer" })).unwrap();
        assert_eq!(input.min_personas, 1);
        assert!(input.horarios.is_empty());
        assert!(input.validate().is_ok());
    }

    #[test]
    fn remove_nulls_drops_empty_columns() {
        let map = remove_nulls(serialize_to_map(&json!({ "a": 1, "b": null })));
        assert!(map.contains_key("a"));
        assert!(!map.contains_key("b"));
    }
}
