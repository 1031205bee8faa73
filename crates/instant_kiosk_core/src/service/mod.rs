//! Core use-case services.
//!
//! # Responsibility
//! - Wrap the repository in the cache failure policy (`descriptor_store`).
//! - Orchestrate cache and remote catalog into refresh cycles
//!   (`catalog_refresh`).

pub mod catalog_refresh;
pub mod descriptor_store;
