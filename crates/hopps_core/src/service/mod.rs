//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate document store calls into save/get use cases.
//! - Keep transport layers decoupled from storage details.

pub mod collection_registry;
pub mod error;
pub mod resolver;
pub mod sequencer;
pub mod store_service;
