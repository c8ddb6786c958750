//! Error types for the relay pipeline.

use thiserror::Error;

/// Errors that can occur while relaying events.
///
/// None of these is fatal to the relay loop: source errors skip a rotation
/// step, delivery errors drop one subscriber's copy, archive errors park the
/// record for the next flush.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Event source unavailable: {reason}")]
    SourceUnavailable { reason: String },

    #[error("Filter {filter_id} is no longer installed on the node")]
    FilterNotFound { filter_id: String },

    #[error("Poll timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Delivery to subscriber {subscriber} failed: {reason}")]
    DeliveryFailure { subscriber: String, reason: String },

    #[error("Archive write failed: {reason}")]
    ArchiveWriteFailure { reason: String },

    #[error("Archive read failed: {reason}")]
    ArchiveReadFailure { reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl RelayError {
    /// Returns `true` if the failed source operation should be retried on the
    /// next rotation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable { .. } | Self::FilterNotFound { .. } | Self::Timeout { .. }
        )
    }

    /// Returns `true` if the node forgot the filter and it must be reinstalled.
    pub fn is_filter_lost(&self) -> bool {
        matches!(self, Self::FilterNotFound { .. })
    }
}
