//! Core of the Instant kiosk client.
//!
//! Caches the server's document catalog in SQLite, fetches the live catalog
//! and per-document sync tokens over HTTP, keeps sync sessions authenticated
//! and holds rendered previews in a bounded LRU cache.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod session;

pub use api::catalog_client::{CatalogApi, CatalogError, CatalogResult, WebCatalogClient};
pub use cache::preview_cache::{PreviewCache, PreviewKey};
pub use config::preferences::{ConnectionPreferences, PreferencesError, PreferencesStore};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::descriptor::{
    DescriptorValidationError, DocumentDescriptor, DocumentId, LayerDescriptor,
};
pub use model::notice::Notice;
pub use repo::descriptor_repo::{
    DescriptorRepository, RepoError, RepoResult, SqliteDescriptorRepository,
};
pub use service::catalog_refresh::{CatalogRefresher, CatalogView, LocalSyncStorage};
pub use service::descriptor_store::DescriptorStore;
pub use session::controller::{
    EngineError, SessionError, SessionEventSender, SessionView, SyncEngine, SyncSessionController,
};
pub use session::machine::{SessionEvent, SessionState, SyncErrorCode};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
