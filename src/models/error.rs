use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Response for an error
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: u16,
    pub status: String,
    pub error: String,
}

/// Failures of the synchronization layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncError {
    /// Bad, missing or expired credential. The connection is refused.
    Authentication(String),
    /// Valid identity with an insufficient role. The event is rejected.
    Authorization(String),
    /// Malformed payload or tree invariant violation.
    Validation(String),
    Storage(String),
    Provider(String),
}

impl SyncError {
    /// Machine-readable reason sent with `error` events.
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::Authentication(_) => "authentication_failed",
            SyncError::Authorization(_) => "access_denied",
            SyncError::Validation(_) => "validation_failed",
            SyncError::Storage(_) => "storage_failed",
            SyncError::Provider(_) => "provider_failed",
        }
    }

    /// Downstream failures whose details stay on the server.
    pub fn is_downstream(&self) -> bool {
        matches!(self, SyncError::Storage(_) | SyncError::Provider(_))
    }

    pub fn message(&self) -> &str {
        match self {
            SyncError::Authentication(m)
            | SyncError::Authorization(m)
            | SyncError::Validation(m)
            | SyncError::Storage(m)
            | SyncError::Provider(m) => m,
        }
    }
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::Authentication(m) => write!(f, "Authentication error: {}", m),
            SyncError::Authorization(m) => write!(f, "Authorization error: {}", m),
            SyncError::Validation(m) => write!(f, "Validation error: {}", m),
            SyncError::Storage(m) => write!(f, "Storage error: {}", m),
            SyncError::Provider(m) => write!(f, "Provider error: {}", m),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<sqlx::Error> for SyncError {
    fn from(e: sqlx::Error) -> Self {
        SyncError::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        SyncError::Provider(e.to_string())
    }
}
