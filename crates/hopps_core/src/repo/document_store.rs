//! Document store adapter contract.
//!
//! # Responsibility
//! - Define the minimal insert/find/count surface the engine needs from a
//!   transactional document database.
//! - Define the repository error taxonomy shared by implementations.
//!
//! # Invariants
//! - `insert_unique` is the only write path for versions and must fail with
//!   `AlreadyExists` when (collection, key, version) is taken.
//! - Find operations never create collections or records.
//! - Each successful `insert_unique` adds exactly one commit log entry in
//!   the same atomic step.

use crate::db::DbError;
use crate::model::collection::CollectionHandle;
use crate::model::commit::{CommitEntry, CommitSequence};
use crate::model::version::{EpochMillis, RecordValidationError, Version, VersionHead, VersionRecord};
use std::error::Error;
use std::fmt::{Display, Formatter};

const HISTORY_DEFAULT_LIMIT: u32 = 10;
const HISTORY_LIMIT_MAX: u32 = 100;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for collection and version persistence.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// The composite (collection, key, version) slot is already taken.
    AlreadyExists {
        collection: String,
        key: String,
        version: Version,
    },
    Validation(RecordValidationError),
    /// Payload could not be encoded for storage.
    Payload(serde_json::Error),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::AlreadyExists {
                collection,
                key,
                version,
            } => write!(
                f,
                "version {version} of `{key}` already exists in collection `{collection}`"
            ),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Payload(err) => write!(f, "payload encoding failed: {err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted version data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Payload(err) => Some(err),
            Self::AlreadyExists { .. } | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<RecordValidationError> for RepoError {
    fn from(value: RecordValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Paging options for version history reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Maximum rows to return. Defaults to 10 and clamps to 100.
    pub limit: Option<u32>,
    /// Number of newest versions to skip.
    pub offset: u32,
}

impl HistoryQuery {
    /// Effective row limit after defaulting and clamping.
    pub fn applied_limit(&self) -> u32 {
        normalize_history_limit(self.limit)
    }
}

/// Applies the default history page size and its upper bound.
pub fn normalize_history_limit(limit: Option<u32>) -> u32 {
    match limit {
        None | Some(0) => HISTORY_DEFAULT_LIMIT,
        Some(value) => value.min(HISTORY_LIMIT_MAX),
    }
}

/// Storage contract consumed by the registry, sequencer and resolver.
///
/// Implementations must be safe for concurrent use from many threads and
/// must not hold locks across storage I/O.
pub trait DocumentStore: Send + Sync {
    /// Creates the collection if absent and returns its handle.
    fn ensure_collection(&self, name: &str) -> RepoResult<CollectionHandle>;
    /// Returns the collection handle without creating it.
    fn find_collection(&self, name: &str) -> RepoResult<Option<CollectionHandle>>;
    /// Lists known collections sorted by name.
    fn list_collections(&self) -> RepoResult<Vec<CollectionHandle>>;
    /// Inserts one version; fails with `AlreadyExists` if the slot is taken.
    fn insert_unique(&self, collection: &CollectionHandle, record: &VersionRecord)
        -> RepoResult<()>;
    /// Returns the highest version of `key` and its timestamp.
    fn find_max(&self, collection: &CollectionHandle, key: &str) -> RepoResult<Option<VersionHead>>;
    /// Returns exactly `version` of `key`.
    fn find_one(
        &self,
        collection: &CollectionHandle,
        key: &str,
        version: Version,
    ) -> RepoResult<Option<VersionRecord>>;
    /// Returns the newest version with `created_at <= upper_bound`.
    fn find_latest_at(
        &self,
        collection: &CollectionHandle,
        key: &str,
        upper_bound: EpochMillis,
    ) -> RepoResult<Option<VersionRecord>>;
    /// Returns versions of `key` newest first.
    fn find_many(
        &self,
        collection: &CollectionHandle,
        key: &str,
        query: &HistoryQuery,
    ) -> RepoResult<Vec<VersionRecord>>;
    /// Counts stored versions of `key`.
    fn count(&self, collection: &CollectionHandle, key: &str) -> RepoResult<u64>;
    /// Returns versions `from..=through` of `key`, oldest first.
    fn find_range(
        &self,
        collection: &CollectionHandle,
        key: &str,
        from: Version,
        through: Version,
    ) -> RepoResult<Vec<VersionRecord>>;
    /// Returns up to `limit` commit log entries after `after`, in log order.
    fn find_commits(&self, after: CommitSequence, limit: u32) -> RepoResult<Vec<CommitEntry>>;
}

#[cfg(test)]
mod tests {
    use super::{normalize_history_limit, HistoryQuery};

    #[test]
    fn history_limit_defaults_and_clamps() {
        assert_eq!(normalize_history_limit(None), 10);
        assert_eq!(normalize_history_limit(Some(0)), 10);
        assert_eq!(normalize_history_limit(Some(25)), 25);
        assert_eq!(normalize_history_limit(Some(5_000)), 100);
        assert_eq!(HistoryQuery::default().applied_limit(), 10);
    }
}
