//! Ordered name -> value container shared by packets and table-valued
//! values (spec §3 "Map").
//!
//! Keys are `Rc<str>` rather than `String` so a [`Map`] can cheaply share
//! its key allocations with the `Loop` it was created from (the "borrowed"
//! mode of spec §3/§4.7) without resorting to lifetimes or unsafe code; see
//! `SPEC_FULL.md` design resolution 3 for the rationale.

use cif_normalize::{InvalidNameError, NameNormalizer};
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

use crate::value::Value;

#[derive(Clone)]
pub struct Map {
    entries: IndexMap<Rc<str>, Value>,
    normalizer: Rc<dyn NameNormalizer>,
    /// Whether every key in `entries` is an allocation owned by this map
    /// alone (as opposed to shared with, e.g., a `Loop`'s item-name list).
    standalone: bool,
}

/// Deep value equality, ignoring the normalizer strategy and the
/// borrowed/standalone flag — two maps holding the same name/value pairs are
/// equal regardless of how they came to hold them. Needed so `Value`'s
/// derived `PartialEq` (spec §3 testable property 5, "deep-equal") can cover
/// the `Table` variant.
impl PartialEq for Map {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Map")
            .field("entries", &self.entries)
            .field("standalone", &self.standalone)
            .finish()
    }
}

impl Map {
    /// A fresh, standalone, empty map (e.g. a table value created ad hoc).
    pub fn new(normalizer: Rc<dyn NameNormalizer>) -> Map {
        Map {
            entries: IndexMap::new(),
            normalizer,
            standalone: true,
        }
    }

    /// Builds a borrowed-mode map pre-populated with `keys`, all bound to
    /// `Value::Unknown`. Used by `PacketIterator`/`Loop` to hand out packet
    /// templates that share their key allocations with the loop's item list
    /// until the caller writes a genuinely new item name into them.
    pub fn from_borrowed_keys(normalizer: Rc<dyn NameNormalizer>, keys: impl IntoIterator<Item = Rc<str>>) -> Map {
        let entries = keys.into_iter().map(|k| (k, Value::Unknown)).collect();
        Map {
            entries,
            normalizer,
            standalone: false,
        }
    }

    pub fn is_standalone(&self) -> bool {
        self.standalone
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Rc<str>, &Value)> {
        self.entries.iter()
    }

    pub fn get_names(&self) -> Vec<Rc<str>> {
        self.entries.keys().cloned().collect()
    }

    pub fn get_item(&self, name: &str) -> Result<Option<&Value>, InvalidNameError> {
        let key = self.normalizer.normalize(name)?;
        Ok(self.entries.get(key.as_str()))
    }

    /// Whether a (normalized) name already has an entry, without allocating.
    pub fn contains_key(&self, name: &str) -> Result<bool, InvalidNameError> {
        let key = self.normalizer.normalize(name)?;
        Ok(self.entries.contains_key(key.as_str()))
    }

    /// Normalizes `name` and writes `value`. If `name` is new to this map
    /// and the map is currently borrowed, the map first becomes standalone
    /// by cloning owned keys for every existing entry (spec §4.7).
    pub fn set_item(&mut self, name: &str, value: Value) -> Result<(), InvalidNameError> {
        let key = self.normalizer.normalize(name)?;
        if let Some(slot) = self.entries.get_mut(key.as_str()) {
            *slot = value;
            return Ok(());
        }
        if !self.standalone {
            self.make_standalone();
        }
        self.entries.insert(Rc::from(key.as_str()), value);
        Ok(())
    }

    pub fn remove_item(&mut self, name: &str) -> Result<Option<Value>, InvalidNameError> {
        let key = self.normalizer.normalize(name)?;
        Ok(self.entries.shift_remove(key.as_str()))
    }

    fn make_standalone(&mut self) {
        let owned: IndexMap<Rc<str>, Value> = std::mem::take(&mut self.entries)
            .into_iter()
            .map(|(k, v)| (Rc::from(k.as_ref()), v))
            .collect();
        self.entries = owned;
        self.standalone = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cif_normalize::CifNameNormalizer;

    fn normalizer() -> Rc<dyn NameNormalizer> {
        Rc::new(CifNameNormalizer)
    }

    #[test]
    fn new_map_is_standalone() {
        let m = Map::new(normalizer());
        assert!(m.is_standalone());
    }

    #[test]
    fn borrowed_map_becomes_standalone_on_new_key() {
        let shared: Rc<str> = Rc::from("_name1");
        let mut m = Map::from_borrowed_keys(normalizer(), vec![shared.clone()]);
        assert!(!m.is_standalone());

        m.set_item("_name2", Value::Unknown).unwrap();
        assert!(m.is_standalone());
        // The originally-shared key is still present, now via a fresh Rc.
        assert!(m.get_item("_name1").unwrap().is_some());
        assert!(!Rc::ptr_eq(&shared, m.get_names().iter().find(|k| ***k == *shared).unwrap()));
    }

    #[test]
    fn overwriting_existing_key_does_not_disturb_standalone_flag() {
        let mut m = Map::from_borrowed_keys(normalizer(), vec![Rc::from("_name1")]);
        m.set_item("_name1", Value::Character("x".into())).unwrap();
        assert!(!m.is_standalone());
    }

    #[test]
    fn remove_item_returns_removed_value() {
        let mut m = Map::new(normalizer());
        m.set_item("_a", Value::Character("v".into())).unwrap();
        let removed = m.remove_item("_a").unwrap();
        assert_eq!(removed, Some(Value::Character("v".into())));
        assert!(m.is_empty());
    }
}
