//! Document store adapter contract and persistence implementations.
//!
//! # Responsibility
//! - Define the storage surface the engine depends on.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repository writes validate records before persistence.
//! - Duplicate version slots surface as `RepoError::AlreadyExists`, distinct
//!   from transport/database errors.

pub mod document_store;
pub mod sqlite_store;
