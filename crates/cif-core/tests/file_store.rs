//! File-backed store persistence: a `Document` opened against a real file on
//! disk survives being destroyed and reopened (spec §4.1's schema/pragmas
//! are not memory-only, even though every other integration test here uses
//! `StoreLocation::Memory` for speed).

use cif_core::{Document, JournalMode, StoreConfig, StoreLocation, Synchronous, Value};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn file_config(path: std::path::PathBuf) -> StoreConfig {
    StoreConfig {
        location: StoreLocation::File(path),
        journal_mode: JournalMode::Wal,
        synchronous: Synchronous::Normal,
    }
}

#[test]
fn file_backed_document_persists_across_reopen() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir should be creatable");
    let db_path = dir.path().join("document.sqlite");

    {
        let doc = Document::create(&file_config(db_path.clone())).expect("file-backed store should open");
        let block = doc.create_block("block").unwrap();
        block
            .set_value("_cell_length_a", Some(Value::Character("5.635".to_string())))
            .unwrap();
        let lp = block.create_loop("category", &["_a", "_b"]).unwrap();
        let normalizer: std::rc::Rc<dyn cif_core::NameNormalizer> = std::rc::Rc::new(cif_core::CifNameNormalizer);
        let mut packet = cif_core::Map::new(normalizer);
        packet.set_item("_a", Value::Character("row0".to_string())).unwrap();
        lp.add_packet(&packet).unwrap();
        doc.destroy();
    }

    assert!(db_path.exists(), "the store should have created a file on disk");

    let doc = Document::create(&file_config(db_path.clone())).expect("reopening the same file should succeed");
    let block = doc.get_block("block").expect("block should have survived the reopen");
    assert_eq!(
        block.get_value("_cell_length_a").unwrap(),
        Value::Character("5.635".to_string())
    );

    let lp = block.get_category_loop("category").unwrap();
    let mut iter = lp.iter_packets().unwrap();
    let row = iter.next().unwrap().expect("the loop's packet should have survived too");
    assert_eq!(row.get_item("_a").unwrap(), Some(&Value::Character("row0".to_string())));
    assert!(iter.next().unwrap().is_none());
    iter.close().unwrap();

    doc.destroy();
}

#[test]
fn file_backed_store_rejects_a_stale_handle_after_destroy() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir should be creatable");
    let db_path = dir.path().join("document.sqlite");

    let doc = Document::create(&file_config(db_path)).unwrap();
    let block = doc.create_block("block").unwrap();
    doc.destroy();

    assert!(matches!(
        block.get_value("_anything"),
        Err(cif_core::CifError::InvalidHandle(_))
    ));
}
