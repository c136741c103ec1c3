//! Error types for SubTrack
//!
//! All errors use thiserror for structured error handling.
//! `AppError` can be serialized as a plain message for front ends.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Failures reported by a remote document store.
///
/// The sync layer never lets these reach its callers; it degrades to the
/// local mirror instead. `PermissionDenied` is the one kind that also raises
/// an alert, since it points at the store's access rules.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("remote store is not configured")]
    NotConfigured,

    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    #[error("permission denied by remote store: {0}")]
    PermissionDenied(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("invalid response from remote store: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, RemoteError::PermissionDenied(_))
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RemoteError::InvalidResponse(e.to_string())
        } else {
            RemoteError::Unavailable(e.to_string())
        }
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serializes_as_message() {
        let err = AppError::Validation("personName is required".to_string());
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"Validation error: personName is required\"");
    }

    #[test]
    fn test_remote_error_wraps_into_app_error() {
        let err: AppError = RemoteError::PermissionDenied("rules".to_string()).into();
        assert!(matches!(err, AppError::Remote(ref r) if r.is_permission_denied()));
    }
}
