//! A named table of items and packets inside a container (spec §3/§4.4
//! "Loop"). Like [`crate::container::Container`], a `Loop` is a thin handle
//! re-resolving state through the shared [`DocumentInner`] on every call; its
//! item-name list is cached at load time since loop membership only changes
//! through this same handle's methods.

use std::rc::Rc;

use rusqlite::params;

use cif_primitives::{ContainerId, LoopNum};

use crate::document::DocumentInner;
use crate::error::{from_sqlite, CifError, CifResult};
use crate::packet_iterator::PacketIterator;
use crate::rows;
use crate::value::Value;

struct LoopItem {
    normalized: Rc<str>,
    orig: String,
}

/// A loop: its container, loop number, category, and ordered item names.
pub struct Loop {
    pub(crate) inner: Rc<DocumentInner>,
    container_id: ContainerId,
    loop_num: LoopNum,
    category: String,
    items: Vec<LoopItem>,
}

/// Loads a `Loop` handle's item-name list from the store. Used by every
/// `Container` loop lookup/creation operation rather than duplicating the
/// query at each call site.
pub(crate) fn load(inner: Rc<DocumentInner>, container_id: ContainerId, loop_num: LoopNum, category: String) -> CifResult<Loop> {
    let conn = inner.store.connection();
    let mut stmt = conn
        .prepare_cached("SELECT name, name_orig FROM loop_item WHERE container_id = ?1 AND loop_num = ?2 ORDER BY name")
        .map_err(from_sqlite)?;
    let rows = stmt
        .query_map(params![container_id.0, loop_num.0], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(from_sqlite)?;

    let mut items = Vec::new();
    for row in rows {
        let (normalized, orig) = row.map_err(from_sqlite)?;
        items.push(LoopItem {
            normalized: Rc::from(normalized.as_str()),
            orig,
        });
    }
    Ok(Loop {
        inner,
        container_id,
        loop_num,
        category,
        items,
    })
}

impl Loop {
    pub fn container_id(&self) -> ContainerId {
        self.container_id
    }

    pub fn loop_num(&self) -> LoopNum {
        self.loop_num
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// The reserved scalar loop has the empty-string category.
    pub fn is_scalar(&self) -> bool {
        self.category.is_empty()
    }

    /// The loop's item names, in original case, in load order (spec §4.4
    /// `loop.get_names()`).
    pub fn get_names(&self) -> Vec<String> {
        self.items.iter().map(|item| item.orig.clone()).collect()
    }

    pub(crate) fn normalized_names(&self) -> impl Iterator<Item = &Rc<str>> {
        self.items.iter().map(|item| &item.normalized)
    }

    pub(crate) fn contains_item(&self, normalized_name: &str) -> bool {
        self.items.iter().any(|item| item.normalized.as_ref() == normalized_name)
    }

    /// Deletes this loop and everything in it (spec §4.4 `loop.destroy()`).
    pub fn destroy(self) -> CifResult<()> {
        self.inner.check_alive()?;
        let (container_id, loop_num) = (self.container_id, self.loop_num);
        self.inner.store.with_tx(|conn| {
            conn.execute(
                "DELETE FROM loop WHERE container_id = ?1 AND loop_num = ?2",
                params![container_id.0, loop_num.0],
            )
            .map_err(from_sqlite)?;
            Ok(())
        })
    }

    /// Appends one packet: a new row number (one past the current maximum,
    /// or zero for the first) holding `values[name]` for each of this loop's
    /// items, defaulting to [`Value::Unknown`] for any item `values` doesn't
    /// mention (spec §4.4 `loop.add_packet`).
    pub fn add_packet(&self, values: &crate::map::Map) -> CifResult<()> {
        self.inner.check_alive()?;
        for (key, _) in values.iter() {
            if !self.contains_item(key) {
                return Err(CifError::WrongLoop(key.to_string()));
            }
        }

        let (container_id, loop_num) = (self.container_id, self.loop_num);
        let normalized_names: Vec<Rc<str>> = self.normalized_names().cloned().collect();

        self.inner.store.with_tx(|conn| {
            let existing_rows = rows::row_nums_of_loop(conn, container_id, loop_num)?;
            let next_row = existing_rows.iter().max().map(|r| r + 1).unwrap_or(0);
            for name in &normalized_names {
                let value = values.get_item(name).ok().flatten().cloned().unwrap_or(Value::Unknown);
                let encoded = crate::codec::encode(&value);
                rows::upsert_item_value(
                    conn,
                    container_id,
                    name,
                    cif_primitives::RowNum(next_row),
                    &encoded,
                )?;
            }
            Ok(())
        })
    }

    /// Adds a new item to this loop, filling every row this loop already has
    /// with `value` (spec §4.4 `loop.add_item`).
    pub fn add_item(&mut self, name: &str, value: Value) -> CifResult<()> {
        self.inner.check_alive()?;
        let normalizer = self.inner.normalizer.clone();
        let normalized = normalizer
            .normalize(name)
            .map_err(|_| CifError::InvalidItemName(name.to_string()))?;
        let (container_id, loop_num) = (self.container_id, self.loop_num);

        self.inner.store.with_savepoint(|conn| {
            rows::insert_loop_item(conn, container_id, loop_num, &normalized, name)?;
            rows::set_all_values(conn, container_id, loop_num, &normalized, &value)
        })?;

        self.items.push(LoopItem {
            normalized: Rc::from(normalized.as_str()),
            orig: name.to_string(),
        });
        Ok(())
    }

    /// Changes this loop's category, refusing the change if it would create
    /// a second scalar loop (spec §4.4 `loop.set_category`; the scalar-loop
    /// trigger in the schema only fires on `INSERT`, so the uniqueness check
    /// for an `UPDATE` is done here instead).
    pub fn set_category(&mut self, category: &str) -> CifResult<()> {
        self.inner.check_alive()?;
        let (container_id, loop_num) = (self.container_id, self.loop_num);
        let category_owned = category.to_string();

        self.inner.store.with_tx(|conn| {
            if category_owned.is_empty() {
                let other_scalar: Option<i64> = conn
                    .query_row(
                        "SELECT loop_num FROM loop WHERE container_id = ?1 AND category = '' AND loop_num != ?2",
                        params![container_id.0, loop_num.0],
                        |row| row.get(0),
                    )
                    .ok();
                if other_scalar.is_some() {
                    return Err(CifError::ReservedLoop);
                }
            }
            conn.execute(
                "UPDATE loop SET category = ?1 WHERE container_id = ?2 AND loop_num = ?3",
                params![category_owned, container_id.0, loop_num.0],
            )
            .map_err(from_sqlite)?;
            Ok(())
        })?;

        self.category = category.to_string();
        Ok(())
    }

    /// Opens a [`PacketIterator`] over this loop's rows, holding the
    /// document's top-level transaction open for the iterator's lifetime
    /// (spec §4.6/§5: only one iterator may be active per document).
    pub fn iter_packets(&self) -> CifResult<PacketIterator> {
        self.inner.check_alive()?;
        PacketIterator::new(self)
    }
}
