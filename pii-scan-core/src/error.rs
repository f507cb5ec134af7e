//! Error types for the scan pipeline.

use crate::types::{CheckpointStatus, Initiator, ScanId};
use std::fmt;

// ---------------------------------------------------------------------------
// Checkpoint store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointError {
    IllegalStatusTransition { from: CheckpointStatus, to: CheckpointStatus, initiator: Initiator },
    ConcurrentCheckpointUpdate { scan_id: ScanId, space_key: String },
    NotFound { scan_id: ScanId, space_key: String },
}

impl fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IllegalStatusTransition { from, to, initiator } => {
                write!(f, "illegal transition {from} -> {to} by {initiator:?}")
            }
            Self::ConcurrentCheckpointUpdate { scan_id, space_key } => {
                write!(f, "concurrent checkpoint update for ({scan_id}, {space_key})")
            }
            Self::NotFound { scan_id, space_key } => {
                write!(f, "no checkpoint for ({scan_id}, {space_key})")
            }
        }
    }
}

impl std::error::Error for CheckpointError {}

// ---------------------------------------------------------------------------
// Detector gateway
// ---------------------------------------------------------------------------

/// Failure taxonomy a `PiiDetector` port can raise, bubbled up as
/// `PiiDetectionException` per §4.3/§7.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PiiDetectionException {
    Timeout,
    Unavailable(String),
    Protocol(String),
    InvalidArgument(String),
    Internal(String),
}

impl fmt::Display for PiiDetectionException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "detector call exceeded its deadline"),
            Self::Unavailable(m) => write!(f, "detector unavailable: {m}"),
            Self::Protocol(m) => write!(f, "detector protocol error: {m}"),
            Self::InvalidArgument(m) => write!(f, "detector rejected argument: {m}"),
            Self::Internal(m) => write!(f, "detector internal error: {m}"),
        }
    }
}

impl std::error::Error for PiiDetectionException {}

impl PiiDetectionException {
    /// Whether §7 classifies this failure as transient (retry with bounded
    /// backoff) rather than immediately terminal for the item.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Unavailable(_))
    }
}

// ---------------------------------------------------------------------------
// Scan task manager
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanNotFound(pub ScanId);

impl fmt::Display for ScanNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scan not found or expired: {}", self.0)
    }
}

impl std::error::Error for ScanNotFound {}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    ListSpacesFailed(String),
    Checkpoint(CheckpointError),
    Cancelled,
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ListSpacesFailed(m) => write!(f, "failed to list spaces: {m}"),
            Self::Checkpoint(e) => write!(f, "checkpoint error: {e}"),
            Self::Cancelled => write!(f, "scan was cancelled"),
        }
    }
}

impl std::error::Error for OrchestratorError {}

impl From<CheckpointError> for OrchestratorError {
    fn from(e: CheckpointError) -> Self {
        Self::Checkpoint(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Fatal configuration failures: abort startup before any scan is allowed
/// (§7).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("PII_SCAN_KEK is required")]
    MissingKek,
    #[error("invalid PII_SCAN_KEK: {0}")]
    InvalidKek(String),
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}
