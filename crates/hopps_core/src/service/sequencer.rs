//! Per-key version assignment with optimistic concurrency.
//!
//! # Responsibility
//! - Read the current head of a key, claim `head + 1`, and append.
//! - Retry a bounded number of times when another writer wins the slot.
//!
//! # Invariants
//! - Versions of a key are gap-free starting at 1: every insert targets
//!   exactly `max + 1` and the store rejects duplicates.
//! - `created_at` never goes below the previous version's timestamp.
//! - Only `AlreadyExists` is retried; every other error propagates at once.
//! - A parent-checked append never retries: losing the slot means the
//!   caller's base is stale.

use crate::model::collection::CollectionHandle;
use crate::model::version::{now_epoch_ms, Version, VersionHead, VersionRecord};
use crate::repo::document_store::{DocumentStore, RepoError};
use crate::service::error::{StoreError, StoreResult};
use log::{debug, info, warn};
use serde_json::Value;
use std::time::Duration;

/// Conflict-checked appender borrowing a document store.
pub struct VersionSequencer<'store, S: DocumentStore + ?Sized> {
    store: &'store S,
    max_attempts: u32,
    backoff: Duration,
}

impl<'store, S: DocumentStore + ?Sized> VersionSequencer<'store, S> {
    /// `max_attempts` is clamped to at least one.
    pub fn new(store: &'store S, max_attempts: u32, backoff: Duration) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Appends `payload` as the next version of `key`.
    ///
    /// # Errors
    /// - `VersionConflict` after `max_attempts` lost races.
    /// - `StorageUnavailable` for any storage failure.
    pub fn append(
        &self,
        collection: &CollectionHandle,
        key: &str,
        payload: Value,
    ) -> StoreResult<VersionRecord> {
        let mut record = VersionRecord {
            collection: collection.name().to_string(),
            key: key.to_string(),
            version: 1,
            payload,
            created_at: 0,
        };

        for attempt in 1..=self.max_attempts {
            let head = self.store.find_max(collection, key)?;
            let now = now_epoch_ms();
            record.version = head.map_or(1, |head| head.version + 1);
            record.created_at = head.map_or(now, |head| now.max(head.created_at));

            match self.store.insert_unique(collection, &record) {
                Ok(()) => {
                    debug!(
                        "event=version_append module=sequencer status=ok collection={} key={} version={} attempt={}",
                        collection.name(),
                        key,
                        record.version,
                        attempt
                    );
                    return Ok(record);
                }
                Err(RepoError::AlreadyExists { version, .. }) => {
                    debug!(
                        "event=version_append module=sequencer status=retry collection={} key={} version={} attempt={}",
                        collection.name(),
                        key,
                        version,
                        attempt
                    );
                    if attempt < self.max_attempts && !self.backoff.is_zero() {
                        std::thread::sleep(self.backoff * attempt);
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }

        warn!(
            "event=version_append module=sequencer status=error error_code=version_conflict collection={} attempts={}",
            collection.name(),
            self.max_attempts
        );
        Err(StoreError::VersionConflict {
            collection: record.collection,
            key: record.key,
            attempts: self.max_attempts,
        })
    }

    /// Appends `payload` only if `base` is still the newest version of `key`.
    ///
    /// `base == None` means the caller expects `key` to have no versions yet.
    ///
    /// # Errors
    /// - `Lineage` when `key` has moved past `base`.
    /// - `InvalidArgument` when `base` names a version that does not exist.
    /// - `StorageUnavailable` for any storage failure.
    pub fn append_if_head(
        &self,
        collection: &CollectionHandle,
        key: &str,
        payload: Value,
        base: Option<Version>,
    ) -> StoreResult<VersionRecord> {
        let head = self.store.find_max(collection, key)?;
        if head.map(|head| head.version) != base {
            return Err(self.lineage_error(collection, key, base, head)?);
        }

        let now = now_epoch_ms();
        let record = VersionRecord {
            collection: collection.name().to_string(),
            key: key.to_string(),
            version: base.map_or(1, |base| base + 1),
            payload,
            created_at: head.map_or(now, |head| now.max(head.created_at)),
        };

        match self.store.insert_unique(collection, &record) {
            Ok(()) => {
                debug!(
                    "event=version_append module=sequencer status=ok collection={} key={} version={} checked=true",
                    collection.name(),
                    key,
                    record.version
                );
                Ok(record)
            }
            Err(RepoError::AlreadyExists { .. }) => {
                let head = self.store.find_max(collection, key)?;
                Err(self.lineage_error(collection, key, base, head)?)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn lineage_error(
        &self,
        collection: &CollectionHandle,
        key: &str,
        base: Option<Version>,
        head: Option<VersionHead>,
    ) -> StoreResult<StoreError> {
        let head = match (base, head) {
            (Some(base), None) => {
                return Ok(StoreError::InvalidArgument(format!(
                    "base version {base} of `{key}` does not exist"
                )));
            }
            (Some(base), Some(head)) if base > head.version => {
                return Ok(StoreError::InvalidArgument(format!(
                    "base version {base} of `{key}` does not exist"
                )));
            }
            (_, Some(head)) => head.version,
            (None, None) => {
                return Ok(StoreError::VersionConflict {
                    collection: collection.name().to_string(),
                    key: key.to_string(),
                    attempts: 1,
                });
            }
        };

        let delta = self
            .store
            .find_range(collection, key, base.unwrap_or(1), head)?;
        info!(
            "event=version_append module=sequencer status=rejected error_code=lineage collection={} head={} delta_len={}",
            collection.name(),
            head,
            delta.len()
        );
        Ok(StoreError::Lineage {
            collection: collection.name().to_string(),
            key: key.to_string(),
            base,
            head,
            delta,
        })
    }
}
