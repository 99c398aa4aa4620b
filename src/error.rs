//! Error handling for the household sync engine

use reqwest::StatusCode;
use std::fmt;
use thiserror::Error;

use hogar_auth::AuthError;
use hogar_postgrest::PostgrestError;

/// Unified error type for the household sync engine
#[derive(Error, Debug)]
pub enum Error {
    /// A remote read or write failed (network, permission, constraint)
    #[error("store error during {operation} on {entity}: {cause}")]
    Store {
        operation: &'static str,
        entity: &'static str,
        cause: String,
    },

    /// No user is signed in
    #[error("not authenticated")]
    NotAuthenticated,

    /// A row the caller referred to does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Rejected before reaching the store
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The current user may not perform the operation
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Bad client configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Authentication errors
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),
}

impl Error {
    /// Create a new store error
    pub fn store<T: fmt::Display>(operation: &'static str, entity: &'static str, cause: T) -> Self {
        Error::Store {
            operation,
            entity,
            cause: cause.to_string(),
        }
    }

    /// Create a new not-found error
    pub fn not_found<T: fmt::Display>(entity: &'static str, id: T) -> Self {
        Error::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create a new invalid-input error
    pub fn invalid<T: fmt::Display>(msg: T) -> Self {
        Error::InvalidInput(msg.to_string())
    }

    /// Create a new configuration error
    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Error::Config(msg.to_string())
    }

    /// Whether the error came from the remote store
    pub fn is_store(&self) -> bool {
        matches!(self, Error::Store { .. })
    }
}

/// Maps a PostgREST failure onto the store error for one operation
pub(crate) fn from_postgrest(
    operation: &'static str,
    entity: &'static str,
) -> impl FnOnce(PostgrestError) -> Error {
    move |err| match err {
        PostgrestError::ApiError { status, .. } | PostgrestError::UnparsedApiError { status, .. }
            if status == StatusCode::UNAUTHORIZED =>
        {
            Error::NotAuthenticated
        }
        PostgrestError::ApiError { status, details } if status == StatusCode::FORBIDDEN => {
            Error::PermissionDenied(details.to_string())
        }
        other => Error::store(operation, entity, other),
    }
}

pub type Result<T> = std::result::Result<T, Error>;
