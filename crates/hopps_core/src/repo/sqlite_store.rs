//! SQLite implementation of the document store adapter.
//!
//! # Responsibility
//! - Map collection/version operations onto the `collections` and
//!   `versions` tables.
//! - Turn primary-key violations into `RepoError::AlreadyExists`.
//! - Serve the commit log that an insert trigger appends to.
//!
//! # Invariants
//! - Every operation checks out one pooled connection and runs autocommit
//!   statements; a version row lands whole or not at all.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::{ConnectionPool, PoolOptions};
use crate::model::collection::CollectionHandle;
use crate::model::commit::{CommitEntry, CommitSequence};
use crate::model::version::{now_epoch_ms, EpochMillis, Version, VersionHead, VersionRecord};
use crate::repo::document_store::{DocumentStore, HistoryQuery, RepoError, RepoResult};
use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;

const VERSION_SELECT_SQL: &str = "SELECT
    doc_key,
    version,
    payload,
    created_at
FROM versions";

/// SQLite-backed document store sharing a connection pool.
pub struct SqliteDocumentStore {
    pool: ConnectionPool,
}

impl SqliteDocumentStore {
    /// Wraps a migrated pool after checking that its schema is current.
    pub fn try_new(pool: ConnectionPool) -> RepoResult<Self> {
        {
            let conn = pool.checkout()?;
            ensure_store_connection_ready(&conn)?;
        }
        Ok(Self { pool })
    }

    /// Opens (and migrates) a store backed by a database file.
    pub fn open(path: impl AsRef<Path>, options: PoolOptions) -> RepoResult<Self> {
        Self::try_new(ConnectionPool::open_file(path, options)?)
    }

    /// Opens a store backed by a private in-memory database.
    pub fn open_in_memory(options: PoolOptions) -> RepoResult<Self> {
        Self::try_new(ConnectionPool::in_memory(options)?)
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn ensure_collection(&self, name: &str) -> RepoResult<CollectionHandle> {
        let conn = self.pool.checkout()?;
        conn.execute(
            "INSERT INTO collections (name, created_at)
             VALUES (?1, ?2)
             ON CONFLICT(name) DO NOTHING;",
            params![name, now_epoch_ms()],
        )?;

        load_collection(&conn, name)?.ok_or_else(|| {
            RepoError::InvalidData(format!("collection `{name}` missing after insert"))
        })
    }

    fn find_collection(&self, name: &str) -> RepoResult<Option<CollectionHandle>> {
        let conn = self.pool.checkout()?;
        load_collection(&conn, name)
    }

    fn list_collections(&self) -> RepoResult<Vec<CollectionHandle>> {
        let conn = self.pool.checkout()?;
        let mut stmt = conn.prepare(
            "SELECT id, name
             FROM collections
             ORDER BY name ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut handles = Vec::new();
        while let Some(row) = rows.next()? {
            handles.push(CollectionHandle::new(
                row.get::<_, i64>("id")?,
                row.get::<_, String>("name")?,
            ));
        }
        Ok(handles)
    }

    fn insert_unique(
        &self,
        collection: &CollectionHandle,
        record: &VersionRecord,
    ) -> RepoResult<()> {
        record.validate()?;
        if record.collection != collection.name() {
            return Err(RepoError::InvalidData(format!(
                "record targets collection `{}` but handle is `{}`",
                record.collection,
                collection.name()
            )));
        }

        let payload = serde_json::to_string(&record.payload).map_err(RepoError::Payload)?;
        let conn = self.pool.checkout()?;
        let inserted = conn.execute(
            "INSERT INTO versions (
                collection_id,
                doc_key,
                version,
                payload,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                collection.id(),
                record.key.as_str(),
                record.version,
                payload,
                record.created_at,
            ],
        );

        match inserted {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(RepoError::AlreadyExists {
                collection: record.collection.clone(),
                key: record.key.clone(),
                version: record.version,
            }),
            Err(err) => Err(err.into()),
        }
    }

    fn find_max(&self, collection: &CollectionHandle, key: &str) -> RepoResult<Option<VersionHead>> {
        let conn = self.pool.checkout()?;
        let head = conn
            .query_row(
                "SELECT version, created_at
                 FROM versions
                 WHERE collection_id = ?1
                   AND doc_key = ?2
                 ORDER BY version DESC
                 LIMIT 1;",
                params![collection.id(), key],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        match head {
            Some((version, created_at)) => Ok(Some(VersionHead {
                version: parse_version(version)?,
                created_at,
            })),
            None => Ok(None),
        }
    }

    fn find_one(
        &self,
        collection: &CollectionHandle,
        key: &str,
        version: Version,
    ) -> RepoResult<Option<VersionRecord>> {
        // SQLite integers are i64; larger versions can never have been stored.
        let Ok(version) = i64::try_from(version) else {
            return Ok(None);
        };
        let conn = self.pool.checkout()?;
        let mut stmt = conn.prepare(&format!(
            "{VERSION_SELECT_SQL}
             WHERE collection_id = ?1
               AND doc_key = ?2
               AND version = ?3;"
        ))?;
        let mut rows = stmt.query(params![collection.id(), key, version])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_version_row(collection, row)?)),
            None => Ok(None),
        }
    }

    fn find_latest_at(
        &self,
        collection: &CollectionHandle,
        key: &str,
        upper_bound: EpochMillis,
    ) -> RepoResult<Option<VersionRecord>> {
        let conn = self.pool.checkout()?;
        let mut stmt = conn.prepare(&format!(
            "{VERSION_SELECT_SQL}
             WHERE collection_id = ?1
               AND doc_key = ?2
               AND created_at <= ?3
             ORDER BY created_at DESC, version DESC
             LIMIT 1;"
        ))?;
        let mut rows = stmt.query(params![collection.id(), key, upper_bound])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_version_row(collection, row)?)),
            None => Ok(None),
        }
    }

    fn find_many(
        &self,
        collection: &CollectionHandle,
        key: &str,
        query: &HistoryQuery,
    ) -> RepoResult<Vec<VersionRecord>> {
        let conn = self.pool.checkout()?;
        let mut stmt = conn.prepare(&format!(
            "{VERSION_SELECT_SQL}
             WHERE collection_id = ?1
               AND doc_key = ?2
             ORDER BY version DESC
             LIMIT ?3 OFFSET ?4;"
        ))?;
        let mut rows = stmt.query(params![
            collection.id(),
            key,
            i64::from(query.applied_limit()),
            i64::from(query.offset),
        ])?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_version_row(collection, row)?);
        }
        Ok(records)
    }

    fn count(&self, collection: &CollectionHandle, key: &str) -> RepoResult<u64> {
        let conn = self.pool.checkout()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*)
             FROM versions
             WHERE collection_id = ?1
               AND doc_key = ?2;",
            params![collection.id(), key],
            |row| row.get(0),
        )?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative version count {count}")))
    }

    fn find_range(
        &self,
        collection: &CollectionHandle,
        key: &str,
        from: Version,
        through: Version,
    ) -> RepoResult<Vec<VersionRecord>> {
        let from = i64::try_from(from.max(1)).unwrap_or(i64::MAX);
        let through = i64::try_from(through).unwrap_or(i64::MAX);
        if from > through {
            return Ok(Vec::new());
        }

        let conn = self.pool.checkout()?;
        let mut stmt = conn.prepare(&format!(
            "{VERSION_SELECT_SQL}
             WHERE collection_id = ?1
               AND doc_key = ?2
               AND version BETWEEN ?3 AND ?4
             ORDER BY version ASC;"
        ))?;
        let mut rows = stmt.query(params![collection.id(), key, from, through])?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_version_row(collection, row)?);
        }
        Ok(records)
    }

    fn find_commits(&self, after: CommitSequence, limit: u32) -> RepoResult<Vec<CommitEntry>> {
        let Ok(after) = i64::try_from(after) else {
            return Ok(Vec::new());
        };

        let conn = self.pool.checkout()?;
        let mut stmt = conn.prepare(
            "SELECT
                commits.seq AS seq,
                collections.name AS name,
                versions.doc_key AS doc_key,
                versions.version AS version,
                versions.payload AS payload,
                versions.created_at AS created_at
             FROM commits
             JOIN versions
               ON versions.collection_id = commits.collection_id
              AND versions.doc_key = commits.doc_key
              AND versions.version = commits.version
             JOIN collections ON collections.id = commits.collection_id
             WHERE commits.seq > ?1
             ORDER BY commits.seq ASC
             LIMIT ?2;",
        )?;
        let mut rows = stmt.query(params![after, i64::from(limit)])?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            let sequence = row.get::<_, i64>("seq")?;
            let sequence = CommitSequence::try_from(sequence).map_err(|_| {
                RepoError::InvalidData(format!("invalid commit sequence `{sequence}`"))
            })?;
            let collection: String = row.get("name")?;
            entries.push(CommitEntry {
                sequence,
                record: parse_record(&collection, row)?,
            });
        }
        Ok(entries)
    }
}

fn load_collection(conn: &Connection, name: &str) -> RepoResult<Option<CollectionHandle>> {
    let id = conn
        .query_row(
            "SELECT id FROM collections WHERE name = ?1;",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(id.map(|id| CollectionHandle::new(id, name)))
}

fn parse_version_row(collection: &CollectionHandle, row: &Row<'_>) -> RepoResult<VersionRecord> {
    parse_record(collection.name(), row)
}

fn parse_record(collection: &str, row: &Row<'_>) -> RepoResult<VersionRecord> {
    let version = parse_version(row.get::<_, i64>("version")?)?;
    let payload_text: String = row.get("payload")?;
    let payload = serde_json::from_str(&payload_text).map_err(|err| {
        RepoError::InvalidData(format!(
            "unparseable payload for version {version} in versions.payload: {err}"
        ))
    })?;

    let record = VersionRecord {
        collection: collection.to_string(),
        key: row.get("doc_key")?,
        version,
        payload,
        created_at: row.get("created_at")?,
    };
    record.validate()?;
    Ok(record)
}

fn parse_version(value: i64) -> RepoResult<Version> {
    Version::try_from(value)
        .ok()
        .filter(|version| *version > 0)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid version `{value}` in versions.version")))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => {
            failure.code == ErrorCode::ConstraintViolation
                && matches!(
                    failure.extended_code,
                    ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE
                )
        }
        _ => false,
    }
}

fn ensure_store_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::InvalidData(format!(
            "connection schema version {actual_version} does not match expected {expected_version}"
        )));
    }

    for table in ["collections", "versions", "commits"] {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(RepoError::InvalidData(format!(
                "required table `{table}` is missing"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::SqliteDocumentStore;
    use crate::db::PoolOptions;
    use crate::model::version::VersionRecord;
    use crate::repo::document_store::{DocumentStore, HistoryQuery, RepoError};
    use serde_json::json;

    fn record(collection: &str, key: &str, version: u64, created_at: i64) -> VersionRecord {
        VersionRecord {
            collection: collection.to_string(),
            key: key.to_string(),
            version,
            payload: json!({ "v": version }),
            created_at,
        }
    }

    #[test]
    fn ensure_collection_is_idempotent() {
        let store = SqliteDocumentStore::open_in_memory(PoolOptions::default()).unwrap();
        let first = store.ensure_collection("foo").unwrap();
        let second = store.ensure_collection("foo").unwrap();
        assert_eq!(first, second);
        assert_eq!(store.list_collections().unwrap().len(), 1);
    }

    #[test]
    fn insert_unique_rejects_taken_slot() {
        let store = SqliteDocumentStore::open_in_memory(PoolOptions::default()).unwrap();
        let handle = store.ensure_collection("foo").unwrap();
        store.insert_unique(&handle, &record("foo", "K1", 1, 10)).unwrap();

        let err = store
            .insert_unique(&handle, &record("foo", "K1", 1, 11))
            .unwrap_err();
        assert!(matches!(err, RepoError::AlreadyExists { version: 1, .. }));

        let stored = store.find_one(&handle, "K1", 1).unwrap().unwrap();
        assert_eq!(stored.created_at, 10);
    }

    #[test]
    fn insert_unique_rejects_mismatched_handle() {
        let store = SqliteDocumentStore::open_in_memory(PoolOptions::default()).unwrap();
        let handle = store.ensure_collection("foo").unwrap();
        let err = store
            .insert_unique(&handle, &record("bar", "K1", 1, 10))
            .unwrap_err();
        assert!(matches!(err, RepoError::InvalidData(_)));
    }

    #[test]
    fn find_latest_at_breaks_timestamp_ties_by_version() {
        let store = SqliteDocumentStore::open_in_memory(PoolOptions::default()).unwrap();
        let handle = store.ensure_collection("foo").unwrap();
        store.insert_unique(&handle, &record("foo", "K1", 1, 100)).unwrap();
        store.insert_unique(&handle, &record("foo", "K1", 2, 100)).unwrap();
        store.insert_unique(&handle, &record("foo", "K1", 3, 200)).unwrap();

        let at_tie = store.find_latest_at(&handle, "K1", 150).unwrap().unwrap();
        assert_eq!(at_tie.version, 2);
        assert!(store.find_latest_at(&handle, "K1", 99).unwrap().is_none());
    }

    #[test]
    fn find_many_pages_newest_first() {
        let store = SqliteDocumentStore::open_in_memory(PoolOptions::default()).unwrap();
        let handle = store.ensure_collection("foo").unwrap();
        for version in 1..=5 {
            store
                .insert_unique(&handle, &record("foo", "K1", version, version as i64))
                .unwrap();
        }

        let page = store
            .find_many(
                &handle,
                "K1",
                &HistoryQuery {
                    limit: Some(2),
                    offset: 1,
                },
            )
            .unwrap();
        let versions: Vec<_> = page.iter().map(|item| item.version).collect();
        assert_eq!(versions, vec![4, 3]);
        assert_eq!(store.count(&handle, "K1").unwrap(), 5);
        assert_eq!(store.find_max(&handle, "K1").unwrap().unwrap().version, 5);
    }

    #[test]
    fn versions_are_immutable_at_the_sql_level() {
        let store = SqliteDocumentStore::open_in_memory(PoolOptions::default()).unwrap();
        let handle = store.ensure_collection("foo").unwrap();
        store.insert_unique(&handle, &record("foo", "K1", 1, 10)).unwrap();

        let conn = store.pool().checkout().unwrap();
        assert!(conn
            .execute("UPDATE versions SET payload = '{}' WHERE version = 1;", [])
            .is_err());
        assert!(conn.execute("DELETE FROM versions;", []).is_err());
    }

    #[test]
    fn find_range_returns_inclusive_span_oldest_first() {
        let store = SqliteDocumentStore::open_in_memory(PoolOptions::default()).unwrap();
        let handle = store.ensure_collection("foo").unwrap();
        for version in 1..=5 {
            store
                .insert_unique(&handle, &record("foo", "K1", version, version as i64))
                .unwrap();
        }

        let span = store.find_range(&handle, "K1", 2, 4).unwrap();
        let versions: Vec<_> = span.iter().map(|item| item.version).collect();
        assert_eq!(versions, vec![2, 3, 4]);
        assert!(store.find_range(&handle, "K1", 4, 2).unwrap().is_empty());
        assert_eq!(store.find_range(&handle, "K1", 0, u64::MAX).unwrap().len(), 5);
    }

    #[test]
    fn every_insert_appends_one_commit_in_apply_order() {
        let store = SqliteDocumentStore::open_in_memory(PoolOptions::default()).unwrap();
        let foo = store.ensure_collection("foo").unwrap();
        let bar = store.ensure_collection("bar").unwrap();
        store.insert_unique(&foo, &record("foo", "K1", 1, 30)).unwrap();
        store.insert_unique(&bar, &record("bar", "K1", 1, 10)).unwrap();
        store.insert_unique(&foo, &record("foo", "K1", 2, 40)).unwrap();
        assert!(store.insert_unique(&foo, &record("foo", "K1", 2, 50)).is_err());

        let log = store.find_commits(0, 100).unwrap();
        let applied: Vec<_> = log
            .iter()
            .map(|entry| (entry.record.collection.as_str(), entry.record.version))
            .collect();
        assert_eq!(applied, vec![("foo", 1), ("bar", 1), ("foo", 2)]);
        assert!(log.windows(2).all(|pair| pair[0].sequence < pair[1].sequence));
        assert_eq!(log[2].record.payload, json!({ "v": 2 }));

        let tail = store.find_commits(log[0].sequence, 1).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].sequence, log[1].sequence);
        assert!(store.find_commits(u64::MAX, 10).unwrap().is_empty());
    }

    #[test]
    fn commit_log_is_append_only() {
        let store = SqliteDocumentStore::open_in_memory(PoolOptions::default()).unwrap();
        let handle = store.ensure_collection("foo").unwrap();
        store.insert_unique(&handle, &record("foo", "K1", 1, 10)).unwrap();

        let conn = store.pool().checkout().unwrap();
        assert!(conn
            .execute("UPDATE commits SET committed_at = 0;", [])
            .is_err());
        assert!(conn.execute("DELETE FROM commits;", []).is_err());
    }
}
