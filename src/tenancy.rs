use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use uuid::Uuid;

use crate::error::AppError;

pub const AGENCY_HEADER: &str = "x-agencia-id";

/// Tenant scope of a request, taken from the `x-agencia-id` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgencyId(pub Uuid);

pub fn require_agency_id(headers: &HeaderMap) -> Result<Uuid, AppError> {
    let raw = headers
        .get(AGENCY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("Missing {AGENCY_HEADER} header.")))?;
    Uuid::parse_str(raw)
        .map_err(|_| AppError::BadRequest(format!("{AGENCY_HEADER} must be a UUID.")))
}

impl<S> FromRequestParts<S> for AgencyId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let agencia_id = require_agency_id(&parts.headers)?;
        tracing::Span::current().record("agencia_id", tracing::field::display(agencia_id));
        Ok(Self(agencia_id))
    }
}
