//! Error types for the Canon store
//!
//! Business failures (validation, chain, conflict, storage) surface as
//! [`CanonError`] carrying a closed [`CanonErrorCode`]. Infrastructure
//! failures inside the storage layer use [`StorageError`] and [`LockError`]
//! and are folded into a `CanonError` at the API boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Closed set of Canon error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CanonErrorCode {
    // Validation
    InvalidSubject,
    InvalidPredicate,
    InvalidValue,
    InvalidValueNan,
    InvalidEvidence,
    InvalidLineage,
    InvalidId,

    // Chain
    ChainBroken,
    DuplicateId,
    HashMismatch,

    // Conflict
    ContradictionDirect,
    ContradictionSemantic,
    EntityNotFound,
    SupersessionLoop,

    // Storage
    SegmentFull,
    StorageFailed,
    IndexCorrupt,

    // Authorization
    Unauthorized,
    SentinelDeny,
}

impl CanonErrorCode {
    /// Wire name of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonErrorCode::InvalidSubject => "INVALID_SUBJECT",
            CanonErrorCode::InvalidPredicate => "INVALID_PREDICATE",
            CanonErrorCode::InvalidValue => "INVALID_VALUE",
            CanonErrorCode::InvalidValueNan => "INVALID_VALUE_NAN",
            CanonErrorCode::InvalidEvidence => "INVALID_EVIDENCE",
            CanonErrorCode::InvalidLineage => "INVALID_LINEAGE",
            CanonErrorCode::InvalidId => "INVALID_ID",
            CanonErrorCode::ChainBroken => "CHAIN_BROKEN",
            CanonErrorCode::DuplicateId => "DUPLICATE_ID",
            CanonErrorCode::HashMismatch => "HASH_MISMATCH",
            CanonErrorCode::ContradictionDirect => "CONTRADICTION_DIRECT",
            CanonErrorCode::ContradictionSemantic => "CONTRADICTION_SEMANTIC",
            CanonErrorCode::EntityNotFound => "ENTITY_NOT_FOUND",
            CanonErrorCode::SupersessionLoop => "SUPERSESSION_LOOP",
            CanonErrorCode::SegmentFull => "SEGMENT_FULL",
            CanonErrorCode::StorageFailed => "STORAGE_FAILED",
            CanonErrorCode::IndexCorrupt => "INDEX_CORRUPT",
            CanonErrorCode::Unauthorized => "UNAUTHORIZED",
            CanonErrorCode::SentinelDeny => "SENTINEL_DENY",
        }
    }

    /// Whether the code comes from input validation
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CanonErrorCode::InvalidSubject
                | CanonErrorCode::InvalidPredicate
                | CanonErrorCode::InvalidValue
                | CanonErrorCode::InvalidValueNan
                | CanonErrorCode::InvalidEvidence
                | CanonErrorCode::InvalidLineage
                | CanonErrorCode::InvalidId
        )
    }

    /// Whether the code comes from conflict detection
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            CanonErrorCode::ContradictionDirect
                | CanonErrorCode::ContradictionSemantic
                | CanonErrorCode::EntityNotFound
                | CanonErrorCode::SupersessionLoop
        )
    }
}

impl fmt::Display for CanonErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canon business error
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct CanonError {
    /// Error code
    pub code: CanonErrorCode,

    /// Human-readable detail
    pub message: String,
}

impl CanonError {
    pub fn new(code: CanonErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(CanonErrorCode::StorageFailed, message)
    }
}

impl From<StorageError> for CanonError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Corrupt(msg) => CanonError::new(CanonErrorCode::IndexCorrupt, msg),
            other => CanonError::storage(other.to_string()),
        }
    }
}

impl From<LockError> for CanonError {
    fn from(err: LockError) -> Self {
        CanonError::from(StorageError::from(err))
    }
}

/// Result alias for Canon operations
pub type CanonResult<T> = std::result::Result<T, CanonError>;

/// Canonical serialization failure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CanonicalizeError {
    #[error("Non-finite number at {path}")]
    NonFinite { path: String },

    #[error("Unsupported value: {0}")]
    Unsupported(String),
}

impl From<serde_json::Error> for CanonicalizeError {
    fn from(err: serde_json::Error) -> Self {
        CanonicalizeError::Unsupported(err.to_string())
    }
}

impl From<CanonicalizeError> for CanonError {
    fn from(err: CanonicalizeError) -> Self {
        match err {
            CanonicalizeError::NonFinite { .. } => {
                CanonError::new(CanonErrorCode::InvalidValueNan, err.to_string())
            }
            CanonicalizeError::Unsupported(_) => {
                CanonError::new(CanonErrorCode::InvalidValue, err.to_string())
            }
        }
    }
}

/// Cross-process lock failure
#[derive(Error, Debug)]
pub enum LockError {
    /// Lock file still present after the acquisition timeout
    #[error("Lock already held: {path} (waited {waited_ms}ms)")]
    AlreadyLocked { path: PathBuf, waited_ms: u64 },

    #[error("Failed to create lock {path}: {source}")]
    LockFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to release lock {path}: {source}")]
    UnlockFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Physical storage failure (segments, manifest, index files)
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Canonicalization error: {0}")]
    Canonicalize(#[from] CanonicalizeError),

    #[error("Corrupt storage: {0}")]
    Corrupt(String),

    #[error("Writer closed")]
    Closed,
}

/// Result alias for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Configuration loading failure
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::ParseError(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(format!("YAML error: {}", err))
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseError(format!("TOML error: {}", err))
    }
}
