use async_trait::async_trait;
use instant_kiosk_core::{
    CatalogApi, CatalogError, CatalogRefresher, CatalogResult, CatalogView, DescriptorStore,
    DocumentDescriptor, LayerDescriptor, LocalSyncStorage, Notice,
};
use std::sync::{Arc, Mutex};

fn document(id: &str) -> DocumentDescriptor {
    DocumentDescriptor::new(
        id,
        id.to_uppercase(),
        vec![LayerDescriptor::default_layer(id, format!("{id}-token"))],
    )
    .unwrap()
}

/// Serves `documents`, or fails with 503 when `None`.
struct ScriptedCatalog {
    documents: Mutex<Option<Vec<DocumentDescriptor>>>,
}

impl ScriptedCatalog {
    fn new(documents: Option<Vec<DocumentDescriptor>>) -> Arc<Self> {
        Arc::new(Self {
            documents: Mutex::new(documents),
        })
    }

    fn set(&self, documents: Option<Vec<DocumentDescriptor>>) {
        *self.documents.lock().unwrap() = documents;
    }
}

#[async_trait]
impl CatalogApi for ScriptedCatalog {
    async fn fetch_documents(&self) -> CatalogResult<Vec<DocumentDescriptor>> {
        self.documents
            .lock()
            .unwrap()
            .clone()
            .ok_or(CatalogError::Status {
                status: 503,
                endpoint: "/documents".to_string(),
            })
    }

    async fn fetch_token(&self, document_id: &str) -> CatalogResult<String> {
        Ok(format!("{document_id}-token"))
    }
}

#[derive(Default)]
struct RecordingSyncStorage {
    removed: Mutex<Vec<String>>,
}

impl LocalSyncStorage for RecordingSyncStorage {
    fn remove_local_storage_for_document(&self, document_id: &str) {
        self.removed.lock().unwrap().push(document_id.to_string());
    }
}

#[derive(Default)]
struct RecordingView {
    snapshots: Mutex<Vec<Vec<String>>>,
    notices: Mutex<Vec<Notice>>,
}

impl CatalogView for RecordingView {
    fn show_documents(&self, documents: &[DocumentDescriptor]) {
        self.snapshots.lock().unwrap().push(
            documents
                .iter()
                .map(|document| document.document_id.clone())
                .collect(),
        );
    }

    fn show_notice(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    store: DescriptorStore,
    catalog: Arc<ScriptedCatalog>,
    sync_storage: Arc<RecordingSyncStorage>,
    view: Arc<RecordingView>,
    refresher: CatalogRefresher,
}

fn fixture(cached: &[DocumentDescriptor], remote: Option<Vec<DocumentDescriptor>>) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = DescriptorStore::in_dir(dir.path());
    store.try_add_all(cached).unwrap();

    let catalog = ScriptedCatalog::new(remote);
    let sync_storage = Arc::new(RecordingSyncStorage::default());
    let view = Arc::new(RecordingView::default());
    let refresher = CatalogRefresher::new(
        store.clone(),
        catalog.clone(),
        sync_storage.clone(),
        view.clone(),
    );

    Fixture {
        _dir: dir,
        store,
        catalog,
        sync_storage,
        view,
        refresher,
    }
}

fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[tokio::test]
async fn emits_cached_then_live_snapshot_and_evicts_removed_documents() {
    let mut fx = fixture(
        &[document("a"), document("b")],
        Some(vec![document("b"), document("c")]),
    );

    let live = fx.refresher.refresh(true).await.unwrap();

    assert_eq!(live.len(), 2);
    assert_eq!(
        *fx.view.snapshots.lock().unwrap(),
        vec![ids(&["a", "b"]), ids(&["b", "c"])]
    );
    assert_eq!(*fx.sync_storage.removed.lock().unwrap(), ids(&["a"]));

    let cached: Vec<String> = fx
        .store
        .read_all()
        .into_iter()
        .map(|document| document.document_id)
        .collect();
    assert_eq!(cached, ids(&["b", "c"]));
    assert!(fx.view.notices.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failure_keeps_cache_and_shows_notice_once() {
    let mut fx = fixture(&[document("a")], None);

    assert!(fx.refresher.refresh(true).await.is_err());
    assert!(fx.refresher.refresh(true).await.is_err());

    assert_eq!(*fx.view.notices.lock().unwrap(), vec![Notice::CatalogUnavailable]);
    assert_eq!(
        *fx.view.snapshots.lock().unwrap(),
        vec![ids(&["a"]), ids(&["a"])]
    );
    assert!(fx.sync_storage.removed.lock().unwrap().is_empty());
    assert_eq!(fx.store.read_all().len(), 1);
}

#[tokio::test]
async fn failure_without_show_error_is_silent() {
    let mut fx = fixture(&[], None);

    assert!(fx.refresher.refresh(false).await.is_err());
    assert!(fx.view.notices.lock().unwrap().is_empty());

    // The flag was never set, so the next visible failure still notifies.
    assert!(fx.refresher.refresh(true).await.is_err());
    assert_eq!(*fx.view.notices.lock().unwrap(), vec![Notice::CatalogUnavailable]);
}

#[tokio::test]
async fn success_rearms_the_notice() {
    let mut fx = fixture(&[], None);

    assert!(fx.refresher.refresh(true).await.is_err());
    fx.catalog.set(Some(vec![document("a")]));
    fx.refresher.refresh(true).await.unwrap();
    fx.catalog.set(None);
    assert!(fx.refresher.refresh(true).await.is_err());

    assert_eq!(
        *fx.view.notices.lock().unwrap(),
        vec![Notice::CatalogUnavailable, Notice::CatalogUnavailable]
    );
}

#[tokio::test]
async fn empty_live_catalog_empties_the_cache() {
    let mut fx = fixture(&[document("a"), document("b")], Some(Vec::new()));

    fx.refresher.refresh(true).await.unwrap();

    assert!(fx.store.read_all().is_empty());
    let mut removed = fx.sync_storage.removed.lock().unwrap().clone();
    removed.sort();
    assert_eq!(removed, ids(&["a", "b"]));
}

#[tokio::test]
async fn repeated_ids_in_live_catalog_match_the_stored_snapshot() {
    let mut stale_a = document("a");
    stale_a.title = "stale".to_string();
    let mut fx = fixture(&[], Some(vec![stale_a, document("b"), document("a")]));

    let live = fx.refresher.refresh(true).await.unwrap();
    let stored = fx.store.read_all();

    assert_eq!(live.len(), 2);
    assert_eq!(stored.len(), live.len());
    assert_eq!(fx.view.snapshots.lock().unwrap()[1], ids(&["b", "a"]));
    let live_a = live.iter().find(|d| d.document_id == "a").unwrap();
    let stored_a = stored.iter().find(|d| d.document_id == "a").unwrap();
    assert_eq!(live_a.title, "A");
    assert!(live_a.same_content(stored_a));
}
