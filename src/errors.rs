//! Error taxonomy for the scanning pipeline.
//!
//! Configuration failures surface before a scan starts, coordinator-level
//! failures are about session lifecycle, and API/transport failures are
//! folded into `ProbeResult::Error` inside the engine rather than thrown —
//! upstream algorithms (BinarySearcher, PrecisionScanner) must never see a
//! network error reinterpreted as `Safe`.

use thiserror::Error;

/// The taxonomy of kinds a scan can fail with, surfaced to callers and to
/// the `scan_error` terminal event's `error_code`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("configuration missing required field: {0}")]
    ConfigMissingField(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session already running: {0}")]
    SessionAlreadyRunning(String),

    #[error("scan was cancelled: {0}")]
    ScanCancelled(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ScanError {
    /// The machine-readable `error_code` carried on terminal events.
    pub fn code(&self) -> &'static str {
        match self {
            ScanError::ConfigInvalid(_) => "CONFIG_INVALID",
            ScanError::ConfigMissingField(_) => "CONFIG_MISSING_FIELD",
            ScanError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            ScanError::SessionAlreadyRunning(_) => "SESSION_ALREADY_RUNNING",
            ScanError::ScanCancelled(_) => "SCAN_CANCELLED",
            ScanError::Internal(_) => "INTERNAL",
        }
    }
}

pub type ScanResult<T> = Result<T, ScanError>;
