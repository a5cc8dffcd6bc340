//! Error types for vtepsyncd
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SI-11: Error Handling - Structured error types with contextual information
//! - AU-3: Content of Audit Records - Errors include sufficient detail for audit

use thiserror::Error;

use crate::store::Table;

/// Errors that can occur in vtepsyncd
#[derive(Debug, Error)]
pub enum VtepSyncError {
    /// Redis connection or operation failed
    /// NIST: SC-8 (Transmission Confidentiality) - Database communication errors
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Entity store rejected or failed an operation
    #[error("Entity store error: {0}")]
    Store(String),

    /// FDB notification could not be delivered
    #[error("Notification error: {0}")]
    Notify(String),

    /// Agent directory lookup failed
    #[error("Agent directory error: {0}")]
    AgentDirectory(String),

    /// A referenced entity that must exist is missing
    #[error("Unresolved reference: {table} {key}")]
    Unresolved { table: Table, key: String },

    /// Change-set or stored row could not be decoded
    /// NIST: SI-10 (Information Input Validation) - Input validation
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A record carried a malformed field
    #[error("Invalid {field} in record {uuid}: {reason}")]
    InvalidRecord {
        uuid: String,
        field: &'static str,
        reason: String,
    },

    /// Configuration error
    /// NIST: CM-6 (Configuration Settings) - Configuration validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VtepSyncError {
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn notify(msg: impl Into<String>) -> Self {
        Self::Notify(msg.into())
    }

    pub fn unresolved(table: Table, key: impl Into<String>) -> Self {
        Self::Unresolved {
            table,
            key: key.into(),
        }
    }

    pub fn invalid_record(
        uuid: impl Into<String>,
        field: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidRecord {
            uuid: uuid.into(),
            field,
            reason: reason.into(),
        }
    }

    /// Returns true if re-running the whole change-set may succeed.
    ///
    /// Collaborator failures are transient; malformed input is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Redis(e) => {
                e.is_io_error() || e.is_connection_dropped() || e.is_timeout()
            }
            Self::Store(_) | Self::Notify(_) | Self::AgentDirectory(_) | Self::Io(_) => true,
            Self::Unresolved { .. }
            | Self::Decode(_)
            | Self::InvalidRecord { .. }
            | Self::Config(_) => false,
        }
    }
}

/// Result type alias for vtepsyncd operations
pub type Result<T> = std::result::Result<T, VtepSyncError>;
