//! Core storage engine for hopps.
//! This crate is the single source of truth for version history invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, StoreConfig};
pub use logging::{
    default_log_level, flush_logging, init_logging, logging_status, LogOutput, LoggingError,
};
pub use model::collection::CollectionHandle;
pub use model::commit::{CommitEntry, CommitSequence};
pub use model::version::{
    now_epoch_ms, validate_payload_depth, EpochMillis, GetSelector, RecordValidationError,
    SaveReceipt, Selector, Version, VersionHead, VersionRecord, MAX_PAYLOAD_DEPTH,
};
pub use repo::document_store::{DocumentStore, HistoryQuery, RepoError, RepoResult};
pub use repo::sqlite_store::SqliteDocumentStore;
pub use service::collection_registry::CollectionRegistry;
pub use service::error::{StoreError, StoreResult};
pub use service::resolver::HistoryResolver;
pub use service::sequencer::VersionSequencer;
pub use service::store_service::{CommitPage, HistoryPage, VersionedStore};
