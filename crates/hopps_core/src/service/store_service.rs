//! Save/get entry points consumed by transport layers.
//!
//! # Responsibility
//! - Validate identifiers, selectors and payload size.
//! - Coordinate the collection registry, sequencer and resolver.
//! - Translate storage failures into the store error taxonomy.
//!
//! # Invariants
//! - Only the save paths create collections or versions; every read path is
//!   side-effect free, including for unknown collection names.
//! - A storage error is never reported as success.

use crate::config::StoreConfig;
use crate::db::PoolOptions;
use crate::model::commit::{CommitEntry, CommitSequence};
use crate::model::version::{
    validate_identifiers, validate_payload_depth, EpochMillis, GetSelector, RecordValidationError,
    SaveReceipt, Selector, Version, VersionRecord,
};
use crate::repo::document_store::{normalize_history_limit, DocumentStore, HistoryQuery};
use crate::repo::sqlite_store::SqliteDocumentStore;
use crate::service::collection_registry::CollectionRegistry;
use crate::service::error::{StoreError, StoreResult};
use crate::service::resolver::HistoryResolver;
use crate::service::sequencer::VersionSequencer;
use log::{debug, error, info};
use serde::Serialize;
use serde_json::Value;
use std::io;
use std::path::Path;
use std::time::Instant;

/// One page of a key's history, newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPage {
    pub items: Vec<VersionRecord>,
    /// Effective normalized limit used by the query.
    pub applied_limit: u32,
}

/// One page of the commit log, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitPage {
    pub items: Vec<CommitEntry>,
    pub applied_limit: u32,
    /// Cursor for the next page; equals the request cursor when empty.
    pub next_after: CommitSequence,
}

enum Precondition {
    Unchecked,
    Head(Option<Version>),
}

/// Versioned key-value document store.
///
/// Shareable across threads; calls on different keys never wait on each
/// other inside the core.
pub struct VersionedStore<S: DocumentStore> {
    store: S,
    registry: CollectionRegistry,
    config: StoreConfig,
}

impl VersionedStore<SqliteDocumentStore> {
    /// Opens a store over a SQLite file, creating and migrating it if needed.
    pub fn open(path: impl AsRef<Path>, config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let store = SqliteDocumentStore::open(path, config.pool_options())?;
        Self::new(store, config)
    }

    /// Opens a store over a private in-memory database.
    pub fn open_in_memory(config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let options = PoolOptions {
            max_size: 1,
            ..config.pool_options()
        };
        let store = SqliteDocumentStore::open_in_memory(options)?;
        Self::new(store, config)
    }
}

impl<S: DocumentStore> VersionedStore<S> {
    pub fn new(store: S, config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            registry: CollectionRegistry::new(),
            config,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn document_store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &CollectionRegistry {
        &self.registry
    }

    /// Appends `payload` as the next version of `key` in `collection`.
    ///
    /// # Errors
    /// - `InvalidArgument` for blank identifiers or over-nested payloads.
    /// - `PayloadTooLarge` when the encoded payload exceeds the ceiling.
    /// - `VersionConflict` / `StorageUnavailable` from the storage path.
    pub fn save(&self, collection: &str, key: &str, payload: Value) -> StoreResult<SaveReceipt> {
        self.append(collection, key, payload, Precondition::Unchecked)
    }

    /// Appends `payload` only if `base` is still the newest version of `key`.
    ///
    /// Pass `None` to create a key that must not exist yet. A stale base
    /// fails with `Lineage`, carrying every version from `base` to the head
    /// so the caller can rebase; nothing is written.
    pub fn save_if_head(
        &self,
        collection: &str,
        key: &str,
        payload: Value,
        base: Option<Version>,
    ) -> StoreResult<SaveReceipt> {
        if base == Some(0) {
            return Err(RecordValidationError::ZeroVersion.into());
        }
        self.append(collection, key, payload, Precondition::Head(base))
    }

    fn append(
        &self,
        collection: &str,
        key: &str,
        payload: Value,
        precondition: Precondition,
    ) -> StoreResult<SaveReceipt> {
        let started_at = Instant::now();
        validate_identifiers(collection, key)?;
        validate_payload_depth(&payload)?;
        let size = encoded_len(&payload)?;
        if size > self.config.max_payload_bytes {
            info!(
                "event=doc_save module=service status=rejected collection={} error_code=payload_too_large size={} limit={}",
                collection, size, self.config.max_payload_bytes
            );
            return Err(StoreError::PayloadTooLarge {
                size,
                limit: self.config.max_payload_bytes,
            });
        }

        let result = self
            .registry
            .resolve(&self.store, collection)
            .map_err(StoreError::from)
            .and_then(|handle| {
                let sequencer = VersionSequencer::new(
                    &self.store,
                    self.config.max_append_attempts,
                    self.config.retry_backoff(),
                );
                match precondition {
                    Precondition::Unchecked => sequencer.append(&handle, key, payload),
                    Precondition::Head(base) => {
                        sequencer.append_if_head(&handle, key, payload, base)
                    }
                }
            });

        match result {
            Ok(record) => {
                info!(
                    "event=doc_save module=service status=ok collection={} version={} size={} duration_ms={}",
                    collection,
                    record.version,
                    size,
                    started_at.elapsed().as_millis()
                );
                Ok(SaveReceipt {
                    version: record.version,
                    created_at: record.created_at,
                })
            }
            Err(err @ StoreError::Lineage { .. }) => {
                info!(
                    "event=doc_save module=service status=rejected collection={} error_code={} duration_ms={}",
                    collection,
                    err.code(),
                    started_at.elapsed().as_millis()
                );
                Err(err)
            }
            Err(err) => {
                error!(
                    "event=doc_save module=service status=error collection={} error_code={} duration_ms={} error={}",
                    collection,
                    err.code(),
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Returns the version of `key` chosen by `selector`.
    ///
    /// # Errors
    /// - `InvalidArgument` for blank identifiers or `Version(0)`.
    /// - `NotFound` when nothing matches, including unknown collections.
    /// - `StorageUnavailable` when the backend fails.
    pub fn get(&self, collection: &str, key: &str, selector: Selector) -> StoreResult<VersionRecord> {
        validate_identifiers(collection, key)?;
        selector.validate()?;

        let not_found = || StoreError::NotFound {
            collection: collection.to_string(),
            key: key.to_string(),
            version: match selector {
                Selector::Version(version) => Some(version),
                Selector::Latest | Selector::AsOf(_) => None,
            },
        };

        let Some(handle) = self.registry.lookup(&self.store, collection)? else {
            debug!("event=doc_get module=service status=miss collection={collection} key={key}");
            return Err(not_found());
        };

        match HistoryResolver::new(&self.store).resolve(&handle, key, selector)? {
            Some(record) => {
                debug!(
                    "event=doc_get module=service status=ok collection={} key={} version={}",
                    collection, key, record.version
                );
                Ok(record)
            }
            None => {
                debug!("event=doc_get module=service status=miss collection={collection} key={key}");
                Err(not_found())
            }
        }
    }

    /// Like [`Self::get`], but takes the loosely-typed transport selector.
    pub fn get_request(
        &self,
        collection: &str,
        key: &str,
        selector: GetSelector,
    ) -> StoreResult<VersionRecord> {
        let selector = Selector::try_from(selector)?;
        self.get(collection, key, selector)
    }

    /// Shorthand for `get(.., Selector::AsOf(timestamp))`.
    pub fn get_as_of(
        &self,
        collection: &str,
        key: &str,
        timestamp: EpochMillis,
    ) -> StoreResult<VersionRecord> {
        self.get(collection, key, Selector::AsOf(timestamp))
    }

    /// Lists versions of `key` newest first. Unknown keys yield an empty page.
    pub fn history(
        &self,
        collection: &str,
        key: &str,
        limit: Option<u32>,
        offset: u32,
    ) -> StoreResult<HistoryPage> {
        validate_identifiers(collection, key)?;
        let query = HistoryQuery { limit, offset };
        let applied_limit = query.applied_limit();

        let items = match self.registry.lookup(&self.store, collection)? {
            Some(handle) => HistoryResolver::new(&self.store).history(&handle, key, &query)?,
            None => Vec::new(),
        };
        Ok(HistoryPage {
            items,
            applied_limit,
        })
    }

    /// Number of stored versions of `key`; zero for unknown keys.
    pub fn version_count(&self, collection: &str, key: &str) -> StoreResult<u64> {
        validate_identifiers(collection, key)?;
        match self.registry.lookup(&self.store, collection)? {
            Some(handle) => Ok(HistoryResolver::new(&self.store).count(&handle, key)?),
            None => Ok(0),
        }
    }

    /// Commit log entries after `after`, in the order versions were applied.
    ///
    /// Start from 0 and pass the returned `next_after` to continue tailing.
    pub fn commits(&self, after: CommitSequence, limit: Option<u32>) -> StoreResult<CommitPage> {
        let applied_limit = normalize_history_limit(limit);
        let items = self.store.find_commits(after, applied_limit)?;
        let next_after = items.last().map_or(after, |entry| entry.sequence);
        debug!(
            "event=commit_read module=service status=ok after={} count={}",
            after,
            items.len()
        );
        Ok(CommitPage {
            items,
            applied_limit,
            next_after,
        })
    }

    /// Names of all collections, sorted.
    pub fn collections(&self) -> StoreResult<Vec<String>> {
        Ok(self
            .store
            .list_collections()?
            .into_iter()
            .map(|handle| handle.name().to_string())
            .collect())
    }
}

/// Length of the compact JSON encoding without materializing it.
fn encoded_len(payload: &Value) -> StoreResult<usize> {
    let mut counter = ByteCounter(0);
    serde_json::to_writer(&mut counter, payload)
        .map_err(|err| StoreError::InvalidArgument(format!("payload is not encodable: {err}")))?;
    Ok(counter.0)
}

struct ByteCounter(usize);

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
