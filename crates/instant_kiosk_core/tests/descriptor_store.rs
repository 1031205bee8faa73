use instant_kiosk_core::db::open_db;
use instant_kiosk_core::{
    DescriptorRepository, DescriptorStore, DocumentDescriptor, LayerDescriptor, RepoResult,
    SqliteDescriptorRepository,
};
use rusqlite::TransactionBehavior;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

fn document(id: &str, title: &str, named: &[(&str, &str)]) -> DocumentDescriptor {
    let mut layers = vec![LayerDescriptor::default_layer(id, format!("{id}-token"))];
    layers.extend(
        named
            .iter()
            .map(|(name, token)| LayerDescriptor::named(id, *name, *token)),
    );
    DocumentDescriptor::new(id, title, layers).unwrap()
}

fn ids(documents: &[DocumentDescriptor]) -> Vec<&str> {
    documents
        .iter()
        .map(|document| document.document_id.as_str())
        .collect()
}

fn store_in(dir: &tempfile::TempDir) -> DescriptorStore {
    DescriptorStore::in_dir(dir.path())
}

#[test]
fn add_then_read_returns_equal_descriptors() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let written = vec![
        document("b", "Beta", &[]),
        document("a", "Alpha", &[("review", "a-review"), ("draft", "a-draft")]),
    ];

    store.try_add_all(&written).unwrap();
    let read = store.try_read_all().unwrap();

    assert_eq!(ids(&read), vec!["a", "b"]);
    assert!(read[0].same_content(&written[1]));
    assert!(read[1].same_content(&written[0]));
    assert!(read[0].default_layer().is_default());
    assert_eq!(read[0].default_layer().token, "a-token");
}

#[test]
fn upsert_does_not_duplicate_documents_or_layers() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    store.add_all(&[document("a", "Alpha", &[("review", "r1")])]);
    store.add_all(&[document("a", "Alpha v2", &[("review", "r2")])]);

    let read = store.read_all();
    assert_eq!(read.len(), 1);
    assert_eq!(read[0].title, "Alpha v2");
    assert_eq!(read[0].layers().len(), 2);
    assert_eq!(read[0].layer(Some("review")).unwrap().token, "r2");

    let conn = open_db(store.db_path()).unwrap();
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM layers;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 2);
}

#[test]
fn upsert_replaces_layer_set_of_a_document() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    store.add_all(&[document("a", "Alpha", &[("review", "r"), ("draft", "d")])]);
    store.add_all(&[document("a", "Alpha", &[("draft", "d2")])]);

    let read = store.read_all();
    assert!(read[0].layer(Some("review")).is_none());
    assert_eq!(read[0].layer(Some("draft")).unwrap().token, "d2");
}

#[test]
fn replace_all_leaves_exactly_the_new_set() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    store.add_all(&[document("a", "Alpha", &[]), document("b", "Beta", &[])]);
    store.replace_all(&[document("b", "Beta", &[]), document("c", "Gamma", &[])]);

    assert_eq!(ids(&store.read_all()), vec!["b", "c"]);
}

#[test]
fn replace_all_with_empty_set_empties_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    store.add_all(&[document("a", "Alpha", &[])]);
    store.replace_all(&[]);

    assert!(store.read_all().is_empty());
}

#[test]
fn concurrent_reads_never_mix_old_and_new_sets() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let first = vec![document("a", "Alpha", &[]), document("b", "Beta", &[])];
    let second = vec![
        document("c", "Gamma", &[("review", "r")]),
        document("d", "Delta", &[]),
    ];
    store.try_replace_all(&first).unwrap();

    let writer_done = AtomicBool::new(false);
    let reads = std::thread::scope(|scope| {
        let reader = scope.spawn(|| {
            let mut reads = 0;
            loop {
                let finished = writer_done.load(Ordering::SeqCst);
                let read = store.try_read_all().unwrap();
                let read_ids = ids(&read);
                assert!(
                    read_ids == ["a", "b"] || read_ids == ["c", "d"],
                    "mixed snapshot: {read_ids:?}"
                );
                reads += 1;
                if finished {
                    return reads;
                }
            }
        });

        for round in 0..40 {
            let next = if round % 2 == 0 { &second } else { &first };
            store.try_replace_all(next).unwrap();
        }
        writer_done.store(true, Ordering::SeqCst);
        reader.join().unwrap()
    });

    assert!(reads > 0);
    assert_eq!(ids(&store.read_all()), vec!["a", "b"]);
}

#[test]
fn failed_replace_keeps_previous_contents() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    store.add_all(&[document("a", "Alpha", &[])]);

    // A second writer holding the reserved lock makes the replace fail.
    let mut blocker = open_db(store.db_path()).unwrap();
    let tx = blocker
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .unwrap();

    let result = std::thread::scope(|scope| {
        scope
            .spawn(|| -> RepoResult<()> {
                let mut conn = open_db(store.db_path())?;
                conn.busy_timeout(Duration::from_millis(50))?;
                let mut repo = SqliteDescriptorRepository::try_new(&mut conn)?;
                repo.replace_descriptors(&[document("z", "Zeta", &[])])
            })
            .join()
            .unwrap()
    });
    assert!(result.is_err());

    tx.rollback().unwrap();
    assert_eq!(ids(&store.read_all()), vec!["a"]);
}

#[test]
fn clear_removes_everything() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    store.add_all(&[document("a", "Alpha", &[("review", "r")])]);
    store.clear();

    assert!(store.read_all().is_empty());
    let conn = open_db(store.db_path()).unwrap();
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM layers;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 0);
}

#[test]
fn delete_database_then_read_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    store.add_all(&[document("a", "Alpha", &[])]);
    store.delete_database().unwrap();

    assert!(!store.db_path().exists());
    assert!(store.read_all().is_empty());
}
