//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define data access contracts for the descriptor cache.
//! - Isolate SQLite query details from store/orchestration code.
//!
//! # Invariants
//! - Repository APIs surface every storage failure; degrading to a no-op is
//!   the store's decision, not the repository's.

pub mod descriptor_repo;
