//! Catalog domain model.
//!
//! # Responsibility
//! - Define the descriptor records shared by catalog, store and session code.
//! - Define the notices core code asks the UI to show.
//!
//! # Invariants
//! - Every document is identified by a stable `DocumentId`.
//! - Every document descriptor carries its default layer first.

pub mod descriptor;
pub mod notice;
