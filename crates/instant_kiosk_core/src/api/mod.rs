//! Remote catalog access.
//!
//! # Responsibility
//! - Talk to the example web server that lists documents and issues tokens.
//! - Expose the `CatalogApi` seam used by refresh and session code.

pub mod catalog_client;
