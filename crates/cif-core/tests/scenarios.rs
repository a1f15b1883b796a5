//! End-to-end scenarios covering the data model's cross-cutting behaviors:
//! frame scoping, scalar-loop creation, item removal, and packet iteration
//! with in-flight update/remove.

use std::rc::Rc;

use cif_core::{CifError, CifNameNormalizer, Document, Map, NameNormalizer, StoreConfig, Value, ValueKind};

fn fresh_document() -> Document {
    Document::create(&StoreConfig::default()).expect("in-memory document should always open")
}

/// S1: a frame is visible through its own parent block but not through a
/// sibling block.
#[test]
fn s1_frame_is_scoped_to_its_parent_block() {
    let doc = fresh_document();
    let block = doc.create_block("block").unwrap();
    block.create_frame("frame").unwrap();

    assert!(block.get_frame("frame").is_ok());

    let block2 = doc.create_block("block2").unwrap();
    assert!(matches!(block2.get_frame("frame"), Err(CifError::NoSuchFrame(_))));
}

/// S2: setting a scalar value creates the reserved scalar loop; the item
/// survives a prune because its loop is non-empty.
#[test]
fn s2_scalar_set_value_creates_scalar_loop() {
    let doc = fresh_document();
    let block = doc.create_block("block").unwrap();

    block.set_value("_name1", None).unwrap();
    let value = block.get_value("_name1").unwrap();
    assert_eq!(value.kind(), ValueKind::Unknown);

    let scalar = block.get_category_loop("").unwrap();
    assert!(scalar.is_scalar());

    block.prune().unwrap();
    // The item survives: its loop has one packet, so prune leaves it alone.
    assert!(block.get_value("_name1").is_ok());
}

/// S3: removing one of two items from a loop leaves the loop (and the other
/// item) intact.
#[test]
fn s3_remove_item_keeps_loop_with_remaining_item() {
    let doc = fresh_document();
    let block = doc.create_block("block").unwrap();
    let lp = block.create_loop("category", &["_name1", "_name2"]).unwrap();

    let normalizer: Rc<dyn NameNormalizer> = Rc::new(CifNameNormalizer);
    lp.add_packet(&Map::new(normalizer)).unwrap();

    let found = block.get_item_loop("_name1").unwrap();
    assert_eq!(found.loop_num(), lp.loop_num());

    block.remove_item("_name1").unwrap();

    let still_there = block.get_category_loop("category").unwrap();
    assert_eq!(still_there.get_names(), vec!["_name2".to_string()]);
}

/// S4: removing the only item of a loop destroys the loop.
#[test]
fn s4_remove_only_item_destroys_loop() {
    let doc = fresh_document();
    let block = doc.create_block("block").unwrap();
    block.create_loop("solo_category", &["_solo"]).unwrap();

    block.remove_item("_solo").unwrap();

    assert!(matches!(block.get_category_loop("solo_category"), Err(CifError::NoSuchLoop)));
}

/// S5: a second scalar loop is rejected, and the document is left exactly
/// as it was before the failed call.
#[test]
fn s5_second_scalar_loop_is_reserved() {
    let doc = fresh_document();
    let block = doc.create_block("block").unwrap();

    block.create_loop("", &["_x"]).unwrap();
    let err = block.create_loop("", &["_y"]).unwrap_err();
    assert!(matches!(err, CifError::ReservedLoop));

    // State is unchanged by the failed call.
    assert!(matches!(block.get_item_loop("_y"), Err(CifError::NoSuchItem(_))));
    assert!(block.get_item_loop("_x").is_ok());
}

/// S6: a packet iterator visits rows in order; an in-flight update and
/// remove are reflected only after `close`.
#[test]
fn s6_iterator_update_and_remove_during_iteration() {
    let doc = fresh_document();
    let block = doc.create_block("block").unwrap();
    let lp = block.create_loop("category", &["_a", "_b", "_c"]).unwrap();

    let normalizer: Rc<dyn NameNormalizer> = Rc::new(CifNameNormalizer);
    for row in 0..3 {
        let mut packet = Map::new(normalizer.clone());
        packet.set_item("_a", Value::Character(format!("row{row}"))).unwrap();
        lp.add_packet(&packet).unwrap();
    }

    let mut iter = lp.iter_packets().unwrap();

    let p0 = iter.next().unwrap().expect("row 0");
    assert_eq!(p0.get_item("_a").unwrap(), Some(&Value::Character("row0".to_string())));

    let p1 = iter.next().unwrap().expect("row 1");
    assert_eq!(p1.get_item("_a").unwrap(), Some(&Value::Character("row1".to_string())));

    let mut patch = Map::new(normalizer.clone());
    patch.set_item("_a", Value::Character("updated".to_string())).unwrap();
    iter.update(&patch).unwrap();

    let p2 = iter.next().unwrap().expect("row 2");
    assert_eq!(p2.get_item("_a").unwrap(), Some(&Value::Character("row2".to_string())));
    iter.remove().unwrap();

    assert!(iter.next().unwrap().is_none());
    iter.close().unwrap();

    let mut verify = lp.iter_packets().unwrap();
    let v0 = verify.next().unwrap().expect("row 0 survives");
    assert_eq!(v0.get_item("_a").unwrap(), Some(&Value::Character("row0".to_string())));
    let v1 = verify.next().unwrap().expect("row 1 was updated");
    assert_eq!(v1.get_item("_a").unwrap(), Some(&Value::Character("updated".to_string())));
    assert!(verify.next().unwrap().is_none(), "row 2 was removed");
    verify.close().unwrap();
}

#[test]
fn double_iterator_is_misuse() {
    let doc = fresh_document();
    let block = doc.create_block("block").unwrap();
    let lp = block.create_loop("category", &["_a"]).unwrap();

    let first = lp.iter_packets().unwrap();
    let second = lp.iter_packets();
    assert!(matches!(second, Err(CifError::Misuse(_))));

    first.close().unwrap();
    assert!(lp.iter_packets().is_ok());
}

#[test]
fn remove_item_then_get_value_is_no_such_item() {
    let doc = fresh_document();
    let block = doc.create_block("block").unwrap();
    block.set_value("_name1", Some(Value::Character("x".to_string()))).unwrap();

    block.remove_item("_name1").unwrap();

    assert!(matches!(block.get_value("_name1"), Err(CifError::NoSuchItem(_))));
}

#[test]
fn destroying_a_block_cascades_to_its_frames() {
    let doc = fresh_document();
    let block = doc.create_block("block").unwrap();
    let frame = block.create_frame("frame").unwrap();
    frame.set_value("_x", Some(Value::Character("y".to_string()))).unwrap();

    block.destroy().unwrap();

    let block2 = doc.get_block("block");
    assert!(matches!(block2, Err(CifError::NoSuchBlock(_))));
}
