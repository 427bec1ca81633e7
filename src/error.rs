use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{message}")]
    Validation {
        message: String,
        errors: Option<Value>,
    },
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    ForeignKey(String),
    #[error("{0}")]
    UnprocessableEntity(String),
    #[error("{0}")]
    Dependency(String),
    #[error("{0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            errors: None,
        }
    }

    pub fn validation_with(message: impl Into<String>, errors: Value) -> Self {
        Self::Validation {
            message: message.into(),
            errors: Some(errors),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) | Self::ForeignKey(_) => StatusCode::CONFLICT,
            Self::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Dependency(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let details = serde_json::to_value(&errors).unwrap_or(Value::Null);
        Self::validation_with("Validation failed.", details)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (message, errors) = match self {
            AppError::Validation { message, errors } => (message, errors),
            AppError::Internal(detail) => {
                tracing::error!(error = %detail, "Unhandled internal error");
                ("Internal server error.".to_string(), None)
            }
            AppError::Dependency(detail) => {
                tracing::error!(error = %detail, "Dependency failure");
                (detail, None)
            }
            other => (other.to_string(), None),
        };

        let mut body = json!({
            "code": status.as_u16(),
            "message": message,
        });
        if let (Some(errors), Some(obj)) = (errors, body.as_object_mut()) {
            obj.insert("errors".to_string(), errors);
        }

        (status, Json(body)).into_response()
    }
}
