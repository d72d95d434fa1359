use crate::db::errors::DbError;
use crate::store::validation::ValidationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Upload rejected by one of the ordered validation checks
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Sort requested on a field that has no accessor
    #[error("Unknown sort field '{field}'")]
    UnknownSortField { field: String },

    /// Every candidate name collided while writing the upload
    #[error("Could not store '{name}': name still taken after {attempts} attempts")]
    DuplicateNameRace { name: String, attempts: u32 },

    /// Invalid request data
    #[error("{message}")]
    BadRequest { message: String },

    /// Request body rejected by the transport-level size limit
    #[error("Payload too large: {message}")]
    PayloadTooLarge { message: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Store operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(ValidationError::Oversized { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::UnknownSortField { .. } => StatusCode::BAD_REQUEST,
            Error::DuplicateNameRace { .. } => StatusCode::CONFLICT,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::StorageUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Validation(err) => err.to_string(),
            Error::UnknownSortField { field } => format!("Unknown sort field '{field}'"),
            Error::DuplicateNameRace { name, .. } => format!("A file named '{name}' is being stored concurrently, please retry"),
            Error::BadRequest { message } => message.clone(),
            Error::PayloadTooLarge { message } => message.clone(),
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "File not found".to_string(),
                DbError::UniqueViolation { .. } => "A file with this name already exists".to_string(),
                DbError::StorageUnavailable { .. } => "File store is unavailable".to_string(),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Database(DbError::Other(_) | DbError::StorageUnavailable { .. }) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(DbError::NotFound)
            | Error::Validation(_)
            | Error::UnknownSortField { .. }
            | Error::BadRequest { .. }
            | Error::PayloadTooLarge { .. } => {
                tracing::debug!("Client error: {}", self);
            }
            Error::Database(DbError::UniqueViolation { .. }) | Error::DuplicateNameRace { .. } => {
                tracing::warn!("Store constraint error: {}", self);
            }
        }

        let status = self.status_code();

        match &self {
            // Validation failures carry a machine-readable reason
            Error::Validation(err) => {
                let body = json!({
                    "message": err.to_string(),
                    "reason": err.reason(),
                });
                (status, axum::response::Json(body)).into_response()
            }
            _ => (status, self.user_message()).into_response(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
