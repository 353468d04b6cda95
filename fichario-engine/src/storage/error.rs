//! Storage Error Types
//!
//! TigerStyle: Explicit error taxonomy, no stringly-typed failures.
//!
//! Caller mistakes (`NotFound`, `Validation`, `AlreadyExists`) are returned
//! for user-facing handling. `Unavailable` and `Timeout` are transient and
//! must be retried with idempotent semantics. `ChecksumMismatch` means the
//! storage medium handed back a corrupted identifier and is surfaced loudly,
//! never repaired in place.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// No record with this identifier exists in the entity's store.
    #[error("not found: {entity}/{id}")]
    NotFound {
        /// Entity type searched.
        entity: String,
        /// Identifier that was not found.
        id: String,
    },

    /// The entity's store was never created on this backend.
    #[error("no store for entity '{entity}'")]
    StoreMissing {
        /// Entity type without a store.
        entity: String,
    },

    /// A record with this identifier already exists.
    #[error("already exists: {entity}/{id}")]
    AlreadyExists {
        /// Entity type written to.
        entity: String,
        /// Identifier that collided.
        id: String,
    },

    /// Caller input rejected before touching the storage medium.
    #[error("validation failed: {message}")]
    Validation {
        /// What was rejected and why.
        message: String,
    },

    /// An identifier read back from storage failed checksum verification.
    #[error("checksum mismatch in store '{entity}': '{found}'")]
    ChecksumMismatch {
        /// Store the corrupt identifier came from.
        entity: String,
        /// The corrupt string as read.
        found: String,
    },

    /// The storage medium is unreachable or refused the operation.
    #[error("backend unavailable: {message}")]
    Unavailable {
        /// Underlying cause.
        message: String,
    },

    /// The operation exceeded its deadline. Its effect is unknown.
    #[error("operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout {
        /// Operation that timed out.
        operation: String,
        /// Deadline that expired, in milliseconds.
        timeout_ms: u64,
    },

    /// Record data could not be serialized or deserialized.
    #[error("serialization error: {message}")]
    Serialization {
        /// Underlying cause.
        message: String,
    },

    /// Invariant breach inside the engine.
    #[error("internal error: {message}")]
    Internal {
        /// What broke.
        message: String,
    },
}

impl StorageError {
    /// Create a NotFound error.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Create a StoreMissing error.
    pub fn store_missing(entity: impl Into<String>) -> Self {
        Self::StoreMissing {
            entity: entity.into(),
        }
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Create a Validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a ChecksumMismatch error.
    pub fn checksum_mismatch(entity: impl Into<String>, found: impl Into<String>) -> Self {
        Self::ChecksumMismatch {
            entity: entity.into(),
            found: found.into(),
        }
    }

    /// Create an Unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Create a Timeout error.
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a Serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an Internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether retrying the operation can succeed.
    ///
    /// Transient errors leave the operation's effect unknown; callers retry
    /// with idempotent semantics and backoff.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization(e.to_string())
    }
}
