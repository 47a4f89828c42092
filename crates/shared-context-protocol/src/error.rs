//! Error taxonomy shared by every engine and surface in the coordination server.
//!
//! Engines translate storage and framework errors into [`CoreError`] at their
//! boundary; the tool surface serializes it into the wire error shape. No
//! internal detail beyond `message` and `code` ever leaves the process.

use serde::Serialize;

/// Stable machine-readable error code, one per taxonomy entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthenticated,
    PermissionDenied,
    ValidationError,
    NotFound,
    Conflict,
    StorageBusy,
    StorageUnavailable,
    RateLimited,
    Internal,
}

/// Severity used to pick the tracing level when an error is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

impl ErrorCode {
    #[must_use]
    pub const fn severity(self) -> Severity {
        match self {
            Self::Unauthenticated | Self::PermissionDenied | Self::ValidationError => {
                Severity::Warning
            }
            Self::NotFound | Self::Conflict | Self::StorageBusy | Self::RateLimited => {
                Severity::Error
            }
            Self::StorageUnavailable | Self::Internal => Severity::Critical,
        }
    }

    #[must_use]
    pub const fn recoverable(self) -> bool {
        matches!(self, Self::StorageBusy | Self::RateLimited)
    }
}

/// The one error type engines return; the tool surface maps it 1:1 onto the
/// wire `{success: false, error, code, ...}` shape.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct CoreError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub retry_after_ms: Option<u64>,
}

impl CoreError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            retry_after_ms: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    #[must_use]
    pub fn with_retry_after_ms(mut self, ms: u64) -> Self {
        self.retry_after_ms = Some(ms);
        self
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    #[must_use]
    pub fn recoverable(&self) -> bool {
        self.code.recoverable()
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthenticated, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    pub fn storage_busy(retry_after_ms: u64) -> Self {
        Self::new(ErrorCode::StorageBusy, "storage busy, retry later")
            .with_retry_after_ms(retry_after_ms)
    }

    pub fn storage_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StorageUnavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

/// Wire shape produced by the tool surface for every failed call.
#[derive(Debug, Serialize)]
pub struct WireError {
    pub success: bool,
    pub error: String,
    pub code: ErrorCode,
    pub severity: Severity,
    pub recoverable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&CoreError> for WireError {
    fn from(err: &CoreError) -> Self {
        Self {
            success: false,
            error: err.message.clone(),
            code: err.code,
            severity: err.severity(),
            recoverable: err.recoverable(),
            retry_after_ms: err.retry_after_ms,
            details: err.details.clone(),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
