//! Streams the packets (rows) of one loop under a long-running transaction,
//! with cursor-relative update and delete (spec §4.6/§5).
//!
//! Only one `PacketIterator` may be live per [`crate::Document`] at a time —
//! it holds the document's top-level transaction open for its entire
//! lifetime, which is also what makes "in-place update/remove of the current
//! row while iterating" safe: nothing else can mutate the document
//! concurrently. `next`/`next_into` model the `Packet | Finished` outcome
//! (spec §4.6) as `Option` rather than a third `CifError::Finished` value,
//! matching ordinary Rust iterator idiom; see `DESIGN.md`.

use std::rc::Rc;

use cif_normalize::NameNormalizer;
use rusqlite::params;

use cif_primitives::{ContainerId, LoopNum, RowNum};

use crate::document::DocumentInner;
use crate::error::{from_sqlite, CifError, CifResult};
use crate::loop_::Loop;
use crate::map::Map;
use crate::value::Value;

pub struct PacketIterator {
    inner: Rc<DocumentInner>,
    container_id: ContainerId,
    loop_num: LoopNum,
    /// Whether the bound loop is the reserved scalar loop (category `""`),
    /// which gets its row numbering reset to zero after a `remove` (spec
    /// §4.6).
    is_scalar: bool,
    normalizer: Rc<dyn NameNormalizer>,
    /// This loop's item names at the moment the iterator was opened.
    item_names: Vec<Rc<str>>,
    /// Distinct row numbers present for this loop, fixed at iterator
    /// creation: `update`/`remove` only ever touch the row just yielded, so
    /// the remaining order can't change underneath the cursor.
    row_nums: Vec<i64>,
    position: usize,
    previous_row_num: Option<i64>,
    finished: bool,
    /// Set by `close`/`abort`; guards the `Drop` impl against double-ending
    /// the held transaction.
    done: bool,
}

impl PacketIterator {
    pub(crate) fn new(loop_: &Loop) -> CifResult<PacketIterator> {
        if loop_.inner.store.has_active_transaction() {
            return Err(CifError::Misuse(
                "a transaction (another PacketIterator) is already active on this document".to_string(),
            ));
        }
        loop_.inner.store.begin_iterator_tx()?;

        let row_nums = match crate::rows::row_nums_of_loop(loop_.inner.store.connection(), loop_.container_id(), loop_.loop_num())
        {
            Ok(v) => v,
            Err(e) => {
                loop_.inner.store.rollback_iterator_tx();
                return Err(e);
            }
        };

        Ok(PacketIterator {
            inner: loop_.inner.clone(),
            container_id: loop_.container_id(),
            loop_num: loop_.loop_num(),
            is_scalar: loop_.is_scalar(),
            normalizer: loop_.inner.normalizer.clone(),
            item_names: loop_.normalized_names().cloned().collect(),
            row_nums,
            position: 0,
            previous_row_num: None,
            finished: false,
            done: false,
        })
    }

    fn check_transaction_active(&self) -> CifResult<()> {
        if self.inner.store.has_active_transaction() {
            Ok(())
        } else {
            Err(CifError::InvalidHandle("this iterator's transaction has ended".to_string()))
        }
    }

    fn advance(&mut self) -> Option<i64> {
        if self.finished || self.position >= self.row_nums.len() {
            self.finished = true;
            return None;
        }
        let row_num = self.row_nums[self.position];
        self.position += 1;
        self.previous_row_num = Some(row_num);
        Some(row_num)
    }

    fn fetch_row(&self, row_num: i64) -> CifResult<Vec<(String, Value)>> {
        let conn = self.inner.store.connection();
        let mut stmt = conn
            .prepare_cached(
                "SELECT iv.name, iv.kind, iv.val, iv.val_text, iv.val_digits, iv.su_digits, iv.scale, iv.sign
                 FROM item_value iv
                 JOIN loop_item li ON iv.container_id = li.container_id AND iv.name = li.name
                 WHERE li.container_id = ?1 AND li.loop_num = ?2 AND iv.row_num = ?3",
            )
            .map_err(from_sqlite)?;
        let mut rows = stmt
            .query(params![self.container_id.0, self.loop_num.0, row_num])
            .map_err(from_sqlite)?;

        let mut fetched = Vec::new();
        while let Some(row) = rows.next().map_err(from_sqlite)? {
            let name: String = row.get(0).map_err(from_sqlite)?;
            let value = crate::codec::decode(row, (1, 2, 3, 4, 5, 6, 7), &self.normalizer)?;
            fetched.push((name, value));
        }
        Ok(fetched)
    }

    /// Returns the next packet as a freshly-allocated, standalone [`Map`], or
    /// `None` once every row has been yielded (spec §4.6 `next`).
    pub fn next(&mut self) -> CifResult<Option<Map>> {
        self.check_transaction_active()?;
        let Some(row_num) = self.advance() else {
            return Ok(None);
        };
        let fetched = self.fetch_row(row_num)?;
        let mut packet = Map::from_borrowed_keys(self.normalizer.clone(), self.item_names.iter().cloned());
        for (name, value) in fetched {
            packet.set_item(&name, value)?;
        }
        Ok(Some(packet))
    }

    /// Like [`Self::next`], but copies values into `dest` in place instead of
    /// allocating a fresh packet. If `dest` doesn't own its keys (spec's
    /// "dependent target packet"), a name missing from `dest` is an
    /// [`CifError::ArgumentError`] rather than silently growing it.
    pub fn next_into(&mut self, dest: &mut Map) -> CifResult<bool> {
        self.check_transaction_active()?;
        let Some(row_num) = self.advance() else {
            return Ok(false);
        };
        let fetched = self.fetch_row(row_num)?;
        for (name, value) in fetched {
            if !dest.is_standalone() && !dest.contains_key(&name)? {
                return Err(CifError::ArgumentError(format!(
                    "target packet does not own its keys and has no entry for {name:?}"
                )));
            }
            dest.set_item(&name, value)?;
        }
        Ok(true)
    }

    /// Applies `packet`'s entries to the row last returned by `next`/
    /// `next_into` (spec §4.6 `update`). Every key must be one of this
    /// loop's item names.
    pub fn update(&mut self, packet: &Map) -> CifResult<()> {
        self.check_transaction_active()?;
        let row_num = self
            .previous_row_num
            .ok_or_else(|| CifError::Misuse("update called before next() yielded a packet".to_string()))?;

        for (key, _) in packet.iter() {
            if !self.item_names.iter().any(|n| n.as_ref() == key.as_ref()) {
                return Err(CifError::WrongLoop(key.to_string()));
            }
        }

        let container_id = self.container_id;
        self.inner.store.with_savepoint(|conn| {
            for (key, value) in packet.iter() {
                let encoded = crate::codec::encode(value);
                crate::rows::upsert_item_value(conn, container_id, key, RowNum(row_num), &encoded)?;
            }
            Ok(())
        })
    }

    /// Deletes the row last returned by `next`/`next_into` (spec §4.6
    /// `remove`). Resets the cursor so a further `update`/`remove` without an
    /// intervening `next` fails with [`CifError::Misuse`]. For the scalar
    /// loop, the surviving rows are then renumbered down to a dense,
    /// zero-based sequence (spec §4.6: "a subsequent internal 'reset packet
    /// number' step renormalizes row numbering to zero").
    pub fn remove(&mut self) -> CifResult<()> {
        self.check_transaction_active()?;
        let row_num = self
            .previous_row_num
            .ok_or_else(|| CifError::Misuse("remove called before next() yielded a packet".to_string()))?;

        let container_id = self.container_id;
        let loop_num = self.loop_num;
        let is_scalar = self.is_scalar;
        self.inner.store.with_savepoint(|conn| {
            conn.execute(
                "DELETE FROM item_value WHERE container_id = ?1 AND row_num = ?2
                 AND name IN (SELECT name FROM loop_item WHERE container_id = ?1 AND loop_num = ?3)",
                params![container_id.0, row_num, loop_num.0],
            )
            .map_err(from_sqlite)?;
            if is_scalar {
                crate::rows::renumber_rows_from_zero(conn, container_id, loop_num)?;
            }
            Ok(())
        })?;
        self.previous_row_num = None;
        Ok(())
    }

    /// Commits the held transaction and releases the iterator's resources
    /// (spec §4.6 `close`). Rolls back and reports the error if commit fails.
    pub fn close(mut self) -> CifResult<()> {
        self.done = true;
        match self.inner.store.commit_iterator_tx() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.inner.store.rollback_iterator_tx();
                Err(e)
            }
        }
    }

    /// Rolls back the held transaction unconditionally (spec §4.6 `abort`).
    pub fn abort(mut self) {
        self.done = true;
        self.inner.store.rollback_iterator_tx();
    }
}

impl Drop for PacketIterator {
    /// A `PacketIterator` dropped without `close`/`abort` (e.g. on an early
    /// return or panic unwind) must not leave the document's one transaction
    /// slot wedged open forever.
    fn drop(&mut self) {
        if !self.done {
            tracing::warn!("PacketIterator dropped without close()/abort(); rolling back");
            self.inner.store.rollback_iterator_tx();
        }
    }
}
