//! Read-side version resolution.
//!
//! # Invariants
//! - Every query is read-only.
//! - `at_version` never rounds to a neighbouring version.
//! - `at_time` picks the greatest `created_at <= t`, ties by version.

use crate::model::collection::CollectionHandle;
use crate::model::version::{EpochMillis, Selector, Version, VersionRecord};
use crate::repo::document_store::{DocumentStore, HistoryQuery, RepoResult};

pub struct HistoryResolver<'store, S: DocumentStore + ?Sized> {
    store: &'store S,
}

impl<'store, S: DocumentStore + ?Sized> HistoryResolver<'store, S> {
    pub fn new(store: &'store S) -> Self {
        Self { store }
    }

    /// Dispatches a validated selector to the matching query.
    pub fn resolve(
        &self,
        collection: &CollectionHandle,
        key: &str,
        selector: Selector,
    ) -> RepoResult<Option<VersionRecord>> {
        match selector {
            Selector::Latest => self.latest(collection, key),
            Selector::Version(version) => self.at_version(collection, key, version),
            Selector::AsOf(timestamp) => self.at_time(collection, key, timestamp),
        }
    }

    pub fn latest(
        &self,
        collection: &CollectionHandle,
        key: &str,
    ) -> RepoResult<Option<VersionRecord>> {
        let newest = HistoryQuery {
            limit: Some(1),
            offset: 0,
        };
        Ok(self
            .store
            .find_many(collection, key, &newest)?
            .into_iter()
            .next())
    }

    pub fn at_version(
        &self,
        collection: &CollectionHandle,
        key: &str,
        version: Version,
    ) -> RepoResult<Option<VersionRecord>> {
        if version == 0 || i64::try_from(version).is_err() {
            return Ok(None);
        }
        self.store.find_one(collection, key, version)
    }

    pub fn at_time(
        &self,
        collection: &CollectionHandle,
        key: &str,
        timestamp: EpochMillis,
    ) -> RepoResult<Option<VersionRecord>> {
        self.store.find_latest_at(collection, key, timestamp)
    }

    /// Versions of `key`, newest first.
    pub fn history(
        &self,
        collection: &CollectionHandle,
        key: &str,
        query: &HistoryQuery,
    ) -> RepoResult<Vec<VersionRecord>> {
        self.store.find_many(collection, key, query)
    }

    pub fn count(&self, collection: &CollectionHandle, key: &str) -> RepoResult<u64> {
        self.store.count(collection, key)
    }
}
