//! Version record domain model.
//!
//! # Responsibility
//! - Define the immutable per-write record shared by every layer.
//! - Define read selectors and their wire form.
//!
//! # Invariants
//! - `version` starts at 1 and is unique per (collection, key).
//! - `created_at` is Unix epoch milliseconds assigned by the store.
//! - A record with an empty collection or key is never valid.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

/// Per-key version number; the first save of a key is version 1.
pub type Version = u64;

/// Unix epoch milliseconds.
pub type EpochMillis = i64;

/// Deepest array/object nesting a payload may have.
///
/// Stays below serde_json's parser recursion limit (128) so every stored
/// payload can be decoded again.
pub const MAX_PAYLOAD_DEPTH: usize = 100;

/// One immutable snapshot of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub collection: String,
    pub key: String,
    pub version: Version,
    /// Opaque document content at this version.
    pub payload: Value,
    pub created_at: EpochMillis,
}

/// Validation failures for identifiers, records and selectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordValidationError {
    EmptyCollection,
    EmptyKey,
    ZeroVersion,
    PayloadTooDeep { limit: usize },
    InvalidSelector(String),
}

impl Display for RecordValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyCollection => write!(f, "collection name must not be empty"),
            Self::EmptyKey => write!(f, "document key must not be empty"),
            Self::ZeroVersion => write!(f, "versions start at 1"),
            Self::PayloadTooDeep { limit } => {
                write!(f, "payload nests arrays/objects deeper than {limit} levels")
            }
            Self::InvalidSelector(details) => write!(f, "invalid selector: {details}"),
        }
    }
}

impl Error for RecordValidationError {}

impl VersionRecord {
    /// Checks the shape invariants that storage relies on.
    pub fn validate(&self) -> Result<(), RecordValidationError> {
        validate_identifiers(&self.collection, &self.key)?;
        if self.version == 0 {
            return Err(RecordValidationError::ZeroVersion);
        }
        validate_payload_depth(&self.payload)
    }
}

/// Rejects payloads nested deeper than [`MAX_PAYLOAD_DEPTH`].
pub fn validate_payload_depth(payload: &Value) -> Result<(), RecordValidationError> {
    let mut pending = vec![(payload, 1_usize)];
    while let Some((value, depth)) = pending.pop() {
        let is_container = matches!(value, Value::Array(_) | Value::Object(_));
        if is_container && depth > MAX_PAYLOAD_DEPTH {
            return Err(RecordValidationError::PayloadTooDeep {
                limit: MAX_PAYLOAD_DEPTH,
            });
        }
        match value {
            Value::Array(items) => pending.extend(items.iter().map(|item| (item, depth + 1))),
            Value::Object(fields) => pending.extend(fields.values().map(|field| (field, depth + 1))),
            _ => {}
        }
    }
    Ok(())
}

/// Rejects empty or whitespace-only collection names and keys.
pub fn validate_identifiers(collection: &str, key: &str) -> Result<(), RecordValidationError> {
    if collection.trim().is_empty() {
        return Err(RecordValidationError::EmptyCollection);
    }
    if key.trim().is_empty() {
        return Err(RecordValidationError::EmptyKey);
    }
    Ok(())
}

/// Which version a get request resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    /// Highest version of the key.
    Latest,
    /// Exact version; never rounded to a neighbour.
    Version(Version),
    /// Version effective at the given instant (greatest `created_at <= t`).
    AsOf(EpochMillis),
}

impl Selector {
    pub fn validate(&self) -> Result<(), RecordValidationError> {
        match self {
            Self::Version(0) => Err(RecordValidationError::InvalidSelector(
                "version must be a positive integer".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Loosely-typed selector as received from transport layers.
///
/// Accepted shapes: `{}` or `{"latest": true}`, `{"version": n}`,
/// `{"asOf": ms}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GetSelector {
    #[serde(default)]
    pub latest: bool,
    #[serde(default)]
    pub version: Option<i64>,
    #[serde(default)]
    pub as_of: Option<EpochMillis>,
}

impl TryFrom<GetSelector> for Selector {
    type Error = RecordValidationError;

    fn try_from(value: GetSelector) -> Result<Self, Self::Error> {
        let selector = match (value.latest, value.version, value.as_of) {
            (_, None, None) => Self::Latest,
            (false, Some(version), None) => {
                let version = Version::try_from(version)
                    .ok()
                    .filter(|version| *version > 0)
                    .ok_or_else(|| {
                        RecordValidationError::InvalidSelector(format!(
                            "version must be a positive integer, got {version}"
                        ))
                    })?;
                Self::Version(version)
            }
            (false, None, Some(as_of)) => Self::AsOf(as_of),
            _ => {
                return Err(RecordValidationError::InvalidSelector(
                    "expected exactly one of latest, version, asOf".to_string(),
                ))
            }
        };
        Ok(selector)
    }
}

/// Result of a successful save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveReceipt {
    pub version: Version,
    pub created_at: EpochMillis,
}

/// Newest version number and its timestamp for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionHead {
    pub version: Version,
    pub created_at: EpochMillis,
}

/// Current wall clock as Unix epoch milliseconds.
pub fn now_epoch_ms() -> EpochMillis {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
}
