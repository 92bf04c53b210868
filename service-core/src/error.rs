use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Service error taxonomy.
///
/// The four business variants carry a human-readable message and the ids
/// of the entities that caused the failure (empty when not applicable).
/// Infrastructure failures are kept apart so callers never confuse a store
/// outage with a rejected operation.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Not found: {0}")]
    NotFound(String, Vec<Uuid>),

    #[error("Conflict: {0}")]
    Conflict(String, Vec<Uuid>),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String, Vec<Uuid>),

    #[error("Validation failed: {0}")]
    ValidationFailed(String, Vec<Uuid>),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl AppError {
    pub fn not_found(message: impl Into<String>, id: Uuid) -> Self {
        AppError::NotFound(message.into(), vec![id])
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict(message.into(), Vec::new())
    }

    pub fn precondition_failed(message: impl Into<String>, id: Uuid) -> Self {
        AppError::PreconditionFailed(message.into(), vec![id])
    }

    pub fn validation_failed(message: impl Into<String>, ids: Vec<Uuid>) -> Self {
        AppError::ValidationFailed(message.into(), ids)
    }

    /// Stable machine-readable kind, used in responses and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "invalid_input",
            AppError::NotFound(..) => "not_found",
            AppError::Conflict(..) => "conflict",
            AppError::PreconditionFailed(..) => "precondition_failed",
            AppError::ValidationFailed(..) => "validation_failed",
            AppError::InternalError(_) => "internal_error",
            AppError::DatabaseError(_) => "database_error",
            AppError::ConfigError(_) => "config_error",
        }
    }

    /// Ids of the entities the failure refers to.
    pub fn offending_ids(&self) -> &[Uuid] {
        match self {
            AppError::NotFound(_, ids)
            | AppError::Conflict(_, ids)
            | AppError::PreconditionFailed(_, ids)
            | AppError::ValidationFailed(_, ids) => ids,
            _ => &[],
        }
    }

    /// True for failures caused by the store or the runtime rather than by
    /// the request itself.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            AppError::InternalError(_) | AppError::DatabaseError(_) | AppError::ConfigError(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(..) => StatusCode::NOT_FOUND,
            AppError::Conflict(..) => StatusCode::CONFLICT,
            AppError::PreconditionFailed(..) => StatusCode::PRECONDITION_FAILED,
            AppError::ValidationFailed(..) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::InternalError(_) | AppError::DatabaseError(_) | AppError::ConfigError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

/// JSON body returned for every failed request.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub kind: &'static str,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<Uuid>,
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        let (error, details) = match err {
            AppError::ValidationError(e) => ("Invalid input".to_string(), Some(e.to_string())),
            AppError::NotFound(msg, _)
            | AppError::Conflict(msg, _)
            | AppError::PreconditionFailed(msg, _)
            | AppError::ValidationFailed(msg, _) => (msg.clone(), None),
            AppError::InternalError(e) => {
                ("Internal server error".to_string(), Some(format!("{:#}", e)))
            }
            AppError::DatabaseError(e) => ("Database error".to_string(), Some(e.to_string())),
            AppError::ConfigError(e) => ("Configuration error".to_string(), Some(e.to_string())),
        };

        ErrorResponse {
            kind: err.kind(),
            error,
            details,
            ids: err.offending_ids().to_vec(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.is_infrastructure() {
            tracing::error!(error = %self, kind = self.kind(), "Request failed");
        }

        let body = ErrorResponse::from(&self);
        (self.status_code(), Json(body)).into_response()
    }
}
