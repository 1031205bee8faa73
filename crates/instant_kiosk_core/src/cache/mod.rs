//! In-memory caches used by the browsing grid.

pub mod preview_cache;
