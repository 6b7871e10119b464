//! # Record Store
//!
//! In-memory implementation of the Tabletop record-store port.
//!
//! Fixtures and assertions in a BDD scenario need a store that behaves
//! like a relational table set: monotonically assigned identifiers,
//! natural-key lookups, filtered fetches, and sequence resets. The
//! [`MemoryStore`] provides exactly that, plus an operation log so
//! suites can assert how many queries a step issued.

pub use tabletop_core;

mod memory;

pub use memory::MemoryStore;

// Re-export core types for convenience
pub use tabletop_core::{Record, RecordStore, Result, Schema, TabletopError, Value};
