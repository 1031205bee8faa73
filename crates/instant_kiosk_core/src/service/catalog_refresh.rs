//! Cached-then-live catalog refresh.
//!
//! # Responsibility
//! - Show the cached catalog immediately, then fetch the live catalog.
//! - Reconcile: release sync storage of documents that disappeared
//!   remotely and make the cache match the live catalog.
//! - Deduplicate the user-visible "catalog unavailable" notice.
//!
//! # Invariants
//! - The cached snapshot is emitted before the live snapshot.
//! - The final snapshot is exactly the fetched catalog, never a mix with
//!   cached data, with one entry per document id.
//! - Disk work runs on the blocking pool; `self` is only mutated by the
//!   task that owns the refresher.

use crate::api::catalog_client::{CatalogApi, CatalogResult};
use crate::model::descriptor::{DocumentDescriptor, DocumentId};
use crate::model::notice::Notice;
use crate::service::descriptor_store::DescriptorStore;
use log::{error, info};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// Local sync-state storage owned by the sync engine.
pub trait LocalSyncStorage: Send + Sync {
    /// Releases any cached sync state of `document_id`.
    fn remove_local_storage_for_document(&self, document_id: &str);
}

/// UI consumer of catalog snapshots.
pub trait CatalogView: Send + Sync {
    fn show_documents(&self, documents: &[DocumentDescriptor]);
    fn show_notice(&self, notice: Notice);
}

/// Composes the descriptor cache and the remote catalog for one screen.
pub struct CatalogRefresher {
    store: DescriptorStore,
    catalog: Arc<dyn CatalogApi>,
    sync_storage: Arc<dyn LocalSyncStorage>,
    view: Arc<dyn CatalogView>,
    error_shown: bool,
}

impl CatalogRefresher {
    pub fn new(
        store: DescriptorStore,
        catalog: Arc<dyn CatalogApi>,
        sync_storage: Arc<dyn LocalSyncStorage>,
        view: Arc<dyn CatalogView>,
    ) -> Self {
        Self {
            store,
            catalog,
            sync_storage,
            view,
            error_shown: false,
        }
    }

    /// Runs one refresh cycle.
    ///
    /// Emits the cached snapshot, then the live one. On fetch failure the
    /// error is returned, and a notice is shown when `show_error` is set and
    /// no notice was shown since the last successful refresh.
    pub async fn refresh(&mut self, show_error: bool) -> CatalogResult<Vec<DocumentDescriptor>> {
        let started_at = Instant::now();

        let cached = self.read_cached().await;
        self.view.show_documents(&cached);

        let remote = match self.catalog.fetch_documents().await {
            Ok(remote) => dedup_by_document_id(remote),
            Err(err) => {
                error!(
                    "event=catalog_refresh module=service status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                if show_error && !self.error_shown {
                    self.error_shown = true;
                    self.view.show_notice(Notice::CatalogUnavailable);
                }
                return Err(err);
            }
        };

        let store = self.store.clone();
        let sync_storage = Arc::clone(&self.sync_storage);
        let snapshot = remote.clone();
        match tokio::task::spawn_blocking(move || {
            reconcile(&store, sync_storage.as_ref(), &snapshot)
        })
        .await
        {
            Ok(evicted) => info!(
                "event=catalog_refresh module=service status=ok count={} evicted={} duration_ms={}",
                remote.len(),
                evicted.len(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=catalog_refresh module=service status=error error_code=reconcile_failed error={}",
                err
            ),
        }

        self.error_shown = false;
        self.view.show_documents(&remote);
        Ok(remote)
    }

    async fn read_cached(&self) -> Vec<DocumentDescriptor> {
        let store = self.store.clone();
        match tokio::task::spawn_blocking(move || store.read_all()).await {
            Ok(cached) => cached,
            Err(err) => {
                error!(
                    "event=catalog_cache_read module=service status=error error={}",
                    err
                );
                Vec::new()
            }
        }
    }
}

/// Keeps one descriptor per document id, the last one listed, at the
/// position of that last occurrence. Matches what the store persists for a
/// batch with repeated ids.
pub fn dedup_by_document_id(remote: Vec<DocumentDescriptor>) -> Vec<DocumentDescriptor> {
    let mut seen: HashSet<DocumentId> = HashSet::with_capacity(remote.len());
    let mut kept: Vec<DocumentDescriptor> = remote
        .into_iter()
        .rev()
        .filter(|descriptor| seen.insert(descriptor.document_id.clone()))
        .collect();
    kept.reverse();
    kept
}

/// Replaces the cache with `remote` after releasing sync storage of every
/// cached document missing from `remote`.
///
/// Returns the ids whose sync storage was released.
pub fn reconcile(
    store: &DescriptorStore,
    sync_storage: &dyn LocalSyncStorage,
    remote: &[DocumentDescriptor],
) -> Vec<DocumentId> {
    let remote_ids: HashSet<&str> = remote
        .iter()
        .map(|descriptor| descriptor.document_id.as_str())
        .collect();

    let stale: Vec<DocumentId> = store
        .read_all()
        .into_iter()
        .filter(|descriptor| !remote_ids.contains(descriptor.document_id.as_str()))
        .map(|descriptor| descriptor.document_id)
        .collect();

    for document_id in &stale {
        sync_storage.remove_local_storage_for_document(document_id);
    }

    store.replace_all(remote);
    stale
}
