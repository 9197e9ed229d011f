//! Store-level error taxonomy exposed to callers of the façade.
//!
//! # Invariants
//! - "Not found" is always distinguishable from "backend unavailable".
//! - Storage failures are never converted into success.

use crate::config::ConfigError;
use crate::model::version::{RecordValidationError, Version, VersionRecord};
use crate::repo::document_store::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug)]
pub enum StoreError {
    /// Malformed identifier, selector or configuration.
    InvalidArgument(String),
    /// Encoded payload exceeds the configured ceiling.
    PayloadTooLarge { size: usize, limit: usize },
    /// Concurrent writers kept taking the next version slot.
    VersionConflict {
        collection: String,
        key: String,
        attempts: u32,
    },
    /// A parent-checked save was based on a version that is no longer the
    /// head. `delta` runs from the caller's base (when it exists) up to the
    /// current head, oldest first.
    Lineage {
        collection: String,
        key: String,
        base: Option<Version>,
        head: Version,
        delta: Vec<VersionRecord>,
    },
    /// No record matches the query; a normal negative result.
    NotFound {
        collection: String,
        key: String,
        version: Option<Version>,
    },
    StorageUnavailable(RepoError),
}

impl StoreError {
    /// Stable short code for transport layers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid",
            Self::PayloadTooLarge { .. } => "too_large",
            Self::VersionConflict { .. } => "conflict",
            Self::Lineage { .. } => "lineage",
            Self::NotFound { .. } => "notfound",
            Self::StorageUnavailable(_) => "unavailable",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(details) => write!(f, "invalid argument: {details}"),
            Self::PayloadTooLarge { size, limit } => {
                write!(f, "payload of {size} bytes exceeds limit of {limit} bytes")
            }
            Self::VersionConflict {
                collection,
                key,
                attempts,
            } => write!(
                f,
                "could not assign a version to `{key}` in `{collection}` after {attempts} attempts"
            ),
            Self::Lineage {
                collection,
                key,
                base: Some(base),
                head,
                ..
            } => write!(
                f,
                "`{key}` in `{collection}` moved from base version {base} to {head}"
            ),
            Self::Lineage {
                collection,
                key,
                base: None,
                head,
                ..
            } => write!(
                f,
                "`{key}` in `{collection}` already exists at version {head}"
            ),
            Self::NotFound {
                collection,
                key,
                version: Some(version),
            } => write!(f, "version {version} of `{key}` not found in `{collection}`"),
            Self::NotFound {
                collection,
                key,
                version: None,
            } => write!(f, "`{key}` not found in `{collection}`"),
            Self::StorageUnavailable(err) => write!(f, "storage unavailable: {err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StorageUnavailable(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for StoreError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::AlreadyExists {
                collection, key, ..
            } => Self::VersionConflict {
                collection,
                key,
                attempts: 1,
            },
            RepoError::Validation(err) => Self::InvalidArgument(err.to_string()),
            other => Self::StorageUnavailable(other),
        }
    }
}

impl From<RecordValidationError> for StoreError {
    fn from(value: RecordValidationError) -> Self {
        Self::InvalidArgument(value.to_string())
    }
}

impl From<ConfigError> for StoreError {
    fn from(value: ConfigError) -> Self {
        Self::InvalidArgument(value.to_string())
    }
}
