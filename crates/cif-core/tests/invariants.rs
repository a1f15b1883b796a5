//! Property-based checks for a subset of the quantified invariants in
//! spec §8: scalar-loop uniqueness, row-number consistency across a loop's
//! items, and packet/value round-tripping through the store.

use std::rc::Rc;

use cif_core::{CifNameNormalizer, Document, Map, NameNormalizer, StoreConfig, Value};
use proptest::prelude::*;

fn normalizer() -> Rc<dyn NameNormalizer> {
    Rc::new(CifNameNormalizer)
}

fn item_name() -> impl Strategy<Value = String> {
    "_[a-z]{1,8}".prop_map(|s| s)
}

proptest! {
    /// Invariant 3: a container never ends up with more than one scalar
    /// (category `""`) loop, no matter how many times `set_value` is called
    /// on distinct item names.
    #[test]
    fn repeated_set_value_keeps_a_single_scalar_loop(names in prop::collection::hash_set(item_name(), 1..6)) {
        let doc = Document::create(&StoreConfig::default()).unwrap();
        let block = doc.create_block("b").unwrap();

        for name in &names {
            block.set_value(name, Some(Value::Character("x".to_string()))).unwrap();
        }

        let scalar = block.get_category_loop("").unwrap();
        prop_assert!(scalar.is_scalar());
        prop_assert_eq!(scalar.get_names().len(), names.len());
    }

    /// Invariant 2: after `add_packet`, every item of a loop has a value
    /// recorded for exactly the same set of row numbers.
    #[test]
    fn add_packet_keeps_row_numbers_aligned_across_items(packet_count in 1usize..6) {
        let doc = Document::create(&StoreConfig::default()).unwrap();
        let block = doc.create_block("b").unwrap();
        let lp = block.create_loop("cat", &["_a", "_b"]).unwrap();

        let norm = normalizer();
        for i in 0..packet_count {
            let mut packet = Map::new(norm.clone());
            packet.set_item("_a", Value::Character(format!("{i}"))).unwrap();
            lp.add_packet(&packet).unwrap();
        }

        let mut iter = lp.iter_packets().unwrap();
        let mut seen = 0usize;
        while let Some(packet) = iter.next().unwrap() {
            prop_assert!(packet.get_item("_a").unwrap().is_some());
            prop_assert!(packet.get_item("_b").unwrap().is_some());
            seen += 1;
        }
        iter.close().unwrap();
        prop_assert_eq!(seen, packet_count);
    }

    /// A value written through `set_value` and read back through
    /// `get_value` round-trips exactly (spec §3 testable property 5,
    /// restricted here to the `Character` variant).
    #[test]
    fn character_value_round_trips_through_store(text in "\\PC{0,40}") {
        let doc = Document::create(&StoreConfig::default()).unwrap();
        let block = doc.create_block("b").unwrap();

        block.set_value("_x", Some(Value::Character(text.clone()))).unwrap();
        let got = block.get_value("_x").unwrap();
        prop_assert_eq!(got, Value::Character(text));
    }

    /// Creating the same block code twice is rejected and leaves the first
    /// block intact (no partial state from the failed call).
    #[test]
    fn duplicate_block_code_is_rejected_without_disturbing_the_original(code in "[a-zA-Z][a-zA-Z0-9_]{0,10}") {
        let doc = Document::create(&StoreConfig::default()).unwrap();
        let first = doc.create_block(&code).unwrap();
        first.set_value("_marker", Some(Value::Character("present".to_string()))).unwrap();

        let second = doc.create_block(&code);
        prop_assert!(second.is_err());

        let reloaded = doc.get_block(&code).unwrap();
        prop_assert_eq!(reloaded.get_value("_marker").unwrap(), Value::Character("present".to_string()));
    }
}

/// Not a proptest: removing every item from a loop one at a time always
/// ends with the loop gone, regardless of removal order.
#[test]
fn removing_all_items_destroys_the_loop() {
    let doc = Document::create(&StoreConfig::default()).unwrap();
    let block = doc.create_block("b").unwrap();
    block.create_loop("cat", &["_a", "_b", "_c"]).unwrap();

    block.remove_item("_a").unwrap();
    block.remove_item("_b").unwrap();
    assert!(block.get_category_loop("cat").is_ok(), "one item still remains");
    block.remove_item("_c").unwrap();

    assert!(block.get_category_loop("cat").is_err());
}
