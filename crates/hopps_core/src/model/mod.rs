//! Domain model for versioned documents.
//!
//! # Responsibility
//! - Define canonical data structures used by the storage engine.
//! - Keep transport-facing shapes serde-serializable.
//!
//! # Invariants
//! - Every document version is identified by (collection, key, version).
//! - Records are append-only; nothing in the model mutates a stored version.
//! - Every stored version has exactly one commit log entry.

pub mod collection;
pub mod commit;
pub mod version;
