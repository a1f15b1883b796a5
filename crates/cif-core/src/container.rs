//! Block and save-frame containers (spec §3/§4.3 "Container").
//!
//! A `Container` is a thin handle: the identifying `(document, id)` pair plus
//! the cached code and parent, with every operation re-resolving state
//! through the shared [`DocumentInner`]. Like every other handle derived from
//! a `Document`, it holds an `Rc` clone rather than owning the store, and
//! every method starts by checking the document is still alive.

use std::rc::Rc;

use rusqlite::{params, OptionalExtension};

use cif_primitives::{ContainerId, LoopNum};

use crate::document::DocumentInner;
use crate::error::{from_sqlite, CifError, CifResult};
use crate::store::map_unique_violation;
use crate::loop_::Loop;
use crate::rows;
use crate::value::Value;

/// Whether a [`Container`] is a top-level block or a save frame nested
/// inside one (spec §3: "Container (variant: Block | Frame)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Block,
    Frame,
}

/// A block or save frame: an identified grouping of loops (spec §3, §4.3).
pub struct Container {
    pub(crate) inner: Rc<DocumentInner>,
    id: ContainerId,
    kind: ContainerKind,
    /// `Some` for a frame (its owning block's id); `None` for a block.
    parent: Option<ContainerId>,
    name: String,
    name_orig: String,
}

impl Container {
    pub(crate) fn new_block(inner: Rc<DocumentInner>, id: ContainerId, name: String, name_orig: String) -> Container {
        Container {
            inner,
            id,
            kind: ContainerKind::Block,
            parent: None,
            name,
            name_orig,
        }
    }

    pub(crate) fn new_frame(
        inner: Rc<DocumentInner>,
        id: ContainerId,
        parent: ContainerId,
        name: String,
        name_orig: String,
    ) -> Container {
        Container {
            inner,
            id,
            kind: ContainerKind::Frame,
            parent: Some(parent),
            name,
            name_orig,
        }
    }

    pub fn id(&self) -> ContainerId {
        self.id
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    /// The owning block's id, for a frame; `None` for a block.
    pub fn parent(&self) -> Option<ContainerId> {
        self.parent
    }

    /// The original-case code this container was created/looked-up with.
    pub fn get_code(&self) -> &str {
        &self.name_orig
    }

    pub(crate) fn normalized_code(&self) -> &str {
        &self.name
    }

    /// Re-checks that this container's own row still exists in the store
    /// (spec §4.4 `get_all_loops`: "Validates the container handle first...
    /// then returns the list"; spec §7: a handle referring to destroyed
    /// state is `INVALID_HANDLE`). `Container` handles are plain values, not
    /// `Rc`-shared, so a second handle aliasing an id that another handle's
    /// `destroy()` already removed would otherwise read back an empty/absent
    /// result instead of failing.
    fn check_exists(&self) -> CifResult<()> {
        let conn = self.inner.store.connection();
        let exists = conn
            .query_row("SELECT 1 FROM container WHERE id = ?1", params![self.id.0], |_| Ok(()))
            .optional()
            .map_err(from_sqlite)?
            .is_some();
        if exists {
            Ok(())
        } else {
            Err(CifError::InvalidHandle(format!(
                "container {} no longer exists",
                self.id.0
            )))
        }
    }

    /// `Ok` for a block, [`CifError::ArgumentError`] for a frame (spec §4.3).
    pub fn assert_block(&self) -> CifResult<()> {
        self.inner.check_alive()?;
        match self.kind {
            ContainerKind::Block => Ok(()),
            ContainerKind::Frame => Err(CifError::ArgumentError(
                "container is a save frame, not a block".to_string(),
            )),
        }
    }

    /// Creates a save frame nested directly inside this container. Atomic;
    /// fails with [`CifError::InvalidFrameCode`] on a bad code, or
    /// [`CifError::DupFrameCode`] if a sibling frame already has that code.
    pub fn create_frame(&self, code: &str) -> CifResult<Container> {
        self.inner.check_alive()?;
        let normalized = self
            .inner
            .normalizer
            .normalize(code)
            .map_err(|_| CifError::InvalidFrameCode(code.to_string()))?;

        let parent_id = self.id;
        let frame_id = self.inner.store.with_tx(|conn| {
            conn.execute("INSERT INTO container DEFAULT VALUES", [])
                .map_err(from_sqlite)?;
            let frame_id = conn.last_insert_rowid();
            conn.execute(
                "INSERT INTO save_frame (container_id, data_block_id, name, name_orig) VALUES (?1, ?2, ?3, ?4)",
                params![frame_id, parent_id.0, normalized, code],
            )
            .map_err(|e| map_unique_violation(e, CifError::DupFrameCode(code.to_string())))?;
            Ok(frame_id)
        })?;

        tracing::debug!(code, frame_id, parent = parent_id.0, "created save frame");
        Ok(Container::new_frame(
            self.inner.clone(),
            ContainerId(frame_id),
            parent_id,
            normalized,
            code.to_string(),
        ))
    }

    /// Looks up a direct child frame by (normalized) code.
    pub fn get_frame(&self, code: &str) -> CifResult<Container> {
        self.inner.check_alive()?;
        self.check_exists()?;
        let normalized = self
            .inner
            .normalizer
            .normalize(code)
            .map_err(|_| CifError::InvalidFrameCode(code.to_string()))?;

        let conn = self.inner.store.connection();
        let (frame_id, name, name_orig) = conn
            .query_row(
                "SELECT container_id, name, name_orig FROM save_frame WHERE data_block_id = ?1 AND name = ?2",
                params![self.id.0, normalized],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(from_sqlite)?
            .ok_or_else(|| CifError::NoSuchFrame(code.to_string()))?;

        Ok(Container::new_frame(
            self.inner.clone(),
            ContainerId(frame_id),
            self.id,
            name,
            name_orig,
        ))
    }

    /// All direct child frames, in creation order.
    pub fn get_all_frames(&self) -> CifResult<Vec<Container>> {
        self.inner.check_alive()?;
        self.check_exists()?;
        let conn = self.inner.store.connection();
        let mut stmt = conn
            .prepare_cached(
                "SELECT container_id, name, name_orig FROM save_frame WHERE data_block_id = ?1 ORDER BY container_id",
            )
            .map_err(from_sqlite)?;
        let rows = stmt
            .query_map(params![self.id.0], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(from_sqlite)?;

        let mut frames = Vec::new();
        for row in rows {
            let (frame_id, name, name_orig) = row.map_err(from_sqlite)?;
            frames.push(Container::new_frame(
                self.inner.clone(),
                ContainerId(frame_id),
                self.id,
                name,
                name_orig,
            ));
        }
        Ok(frames)
    }

    /// Deletes this container and everything nested under it: child frames
    /// (recursively), loops, items and values (spec §3 "Destroying a
    /// container cascades..."). The schema's `ON DELETE CASCADE` chains
    /// handle a single container's own loops/items/values, but a nested
    /// frame's row is keyed off its *parent's* id rather than its own, so
    /// descendants are deleted bottom-up explicitly before this container's
    /// row is removed.
    pub fn destroy(self) -> CifResult<()> {
        self.inner.check_alive()?;
        let id = self.id;
        self.inner.store.with_tx(|conn| delete_container_recursive(conn, id))
    }

    /// Deletes every loop of this container that currently has zero packets
    /// (spec §4.3 `prune`). Idempotent.
    pub fn prune(&self) -> CifResult<()> {
        self.inner.check_alive()?;
        let id = self.id;
        self.inner.store.with_tx(|conn| {
            let empty_loops: Vec<i64> = {
                let mut stmt = conn
                    .prepare_cached(
                        "SELECT l.loop_num FROM loop l
                         WHERE l.container_id = ?1
                           AND NOT EXISTS (
                               SELECT 1 FROM loop_item li
                               JOIN item_value iv ON iv.container_id = li.container_id AND iv.name = li.name
                               WHERE li.container_id = l.container_id AND li.loop_num = l.loop_num
                           )",
                    )
                    .map_err(from_sqlite)?;
                let rows = stmt
                    .query_map(params![id.0], |row| row.get(0))
                    .map_err(from_sqlite)?;
                rows.collect::<Result<_, _>>().map_err(from_sqlite)?
            };
            for loop_num in empty_loops {
                conn.execute(
                    "DELETE FROM loop WHERE container_id = ?1 AND loop_num = ?2",
                    params![id.0, loop_num],
                )
                .map_err(from_sqlite)?;
            }
            Ok(())
        })
    }

    // -- §4.5 item value operations -------------------------------------

    /// Sets the value of the named item in every packet of its loop,
    /// creating a scalar loop for it if it doesn't yet exist (spec §4.5
    /// `set_value`). `None` is treated as a freshly-created unknown value.
    pub fn set_value(&self, name: &str, value: Option<Value>) -> CifResult<()> {
        self.inner.check_alive()?;
        let normalized = self
            .inner
            .normalizer
            .normalize(name)
            .map_err(|_| CifError::InvalidItemName(name.to_string()))?;
        let value = value.unwrap_or(Value::Unknown);
        let container_id = self.id;

        self.inner.store.with_tx(|conn| {
            match rows::find_item_loop_num(conn, container_id, &normalized)? {
                None => add_scalar(conn, container_id, &normalized, name, &value),
                Some(loop_num) => rows::set_all_values(conn, container_id, loop_num, &normalized, &value),
            }
        })
    }

    /// The value of the named item, when it occurs in at most one packet of
    /// its loop (spec §4.5 `get_value`). A zero-packet loop's item has no
    /// recorded value; this implementation reports [`Value::Unknown`] for
    /// that case rather than inventing a new error code (see `DESIGN.md`).
    pub fn get_value(&self, name: &str) -> CifResult<Value> {
        self.inner.check_alive()?;
        self.check_exists()?;
        let normalized = self
            .inner
            .normalizer
            .normalize(name)
            .map_err(|_| CifError::InvalidItemName(name.to_string()))?;
        let conn = self.inner.store.connection();

        rows::find_item_loop_num(conn, self.id, &normalized)?.ok_or_else(|| CifError::NoSuchItem(name.to_string()))?;

        let normalizer = self.inner.normalizer.clone();
        let mut stmt = conn
            .prepare_cached(
                "SELECT kind, val, val_text, val_digits, su_digits, scale, sign
                 FROM item_value WHERE container_id = ?1 AND name = ?2 ORDER BY row_num",
            )
            .map_err(from_sqlite)?;
        let mut result_rows = stmt.query(params![self.id.0, normalized]).map_err(from_sqlite)?;

        let mut values = Vec::new();
        while let Some(row) = result_rows.next().map_err(from_sqlite)? {
            values.push(crate::codec::decode(row, (0, 1, 2, 3, 4, 5, 6), &normalizer)?);
        }

        match values.len() {
            0 => Ok(Value::Unknown),
            1 => Ok(values.into_iter().next().expect("len checked above")),
            _ => Err(CifError::AmbiguousItem(name.to_string())),
        }
    }

    /// Removes the named item: destroys its loop if it was the loop's only
    /// item, otherwise deletes just this item's values and column (spec
    /// §4.5 `remove_item`).
    pub fn remove_item(&self, name: &str) -> CifResult<()> {
        self.inner.check_alive()?;
        let normalized = self
            .inner
            .normalizer
            .normalize(name)
            .map_err(|_| CifError::InvalidItemName(name.to_string()))?;
        let container_id = self.id;

        self.inner.store.with_tx(|conn| {
            let loop_num = rows::find_item_loop_num(conn, container_id, &normalized)?
                .ok_or_else(|| CifError::NoSuchItem(name.to_string()))?;

            let item_count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM loop_item WHERE container_id = ?1 AND loop_num = ?2",
                    params![container_id.0, loop_num.0],
                    |row| row.get(0),
                )
                .map_err(from_sqlite)?;

            if item_count <= 1 {
                conn.execute(
                    "DELETE FROM loop WHERE container_id = ?1 AND loop_num = ?2",
                    params![container_id.0, loop_num.0],
                )
                .map_err(from_sqlite)?;
            } else {
                conn.execute(
                    "DELETE FROM item_value WHERE container_id = ?1 AND name = ?2",
                    params![container_id.0, normalized],
                )
                .map_err(from_sqlite)?;
                conn.execute(
                    "DELETE FROM loop_item WHERE container_id = ?1 AND name = ?2",
                    params![container_id.0, normalized],
                )
                .map_err(from_sqlite)?;
            }
            Ok(())
        })
    }

    // -- §4.4 loop CRUD ---------------------------------------------------

    /// Creates a loop with `category` (the empty string means "scalar") and
    /// the given item names. Atomic: either every name is inserted or none
    /// is (spec §4.4 `create_loop`).
    pub fn create_loop(&self, category: &str, names: &[&str]) -> CifResult<Loop> {
        self.inner.check_alive()?;
        if names.is_empty() {
            return Err(CifError::NullLoop);
        }
        let container_id = self.id;
        let normalizer = self.inner.normalizer.clone();
        let category_owned = category.to_string();

        let loop_num = self.inner.store.with_tx(|conn| {
            let loop_num = rows::insert_loop_row(conn, container_id, &category_owned)?;
            for name in names {
                let normalized = normalizer
                    .normalize(name)
                    .map_err(|_| CifError::InvalidItemName((*name).to_string()))?;
                rows::insert_loop_item(conn, container_id, loop_num, &normalized, name)?;
            }
            Ok(loop_num)
        })?;

        crate::loop_::load(self.inner.clone(), container_id, loop_num, category_owned)
    }

    /// The unique loop with `category` (spec §4.4 `get_category_loop`).
    pub fn get_category_loop(&self, category: &str) -> CifResult<Loop> {
        self.inner.check_alive()?;
        self.check_exists()?;
        let conn = self.inner.store.connection();
        let matches: Vec<i64> = {
            let mut stmt = conn
                .prepare_cached("SELECT loop_num FROM loop WHERE container_id = ?1 AND category = ?2")
                .map_err(from_sqlite)?;
            let rows = stmt
                .query_map(params![self.id.0, category], |row| row.get(0))
                .map_err(from_sqlite)?;
            rows.collect::<Result<_, _>>().map_err(from_sqlite)?
        };
        match matches.len() {
            0 => Err(CifError::NoSuchLoop),
            1 => crate::loop_::load(self.inner.clone(), self.id, LoopNum(matches[0]), category.to_string()),
            _ => Err(CifError::CatNotUnique),
        }
    }

    /// The loop containing the named item (spec §4.4 `get_item_loop`).
    pub fn get_item_loop(&self, name: &str) -> CifResult<Loop> {
        self.inner.check_alive()?;
        self.check_exists()?;
        let normalized = self
            .inner
            .normalizer
            .normalize(name)
            .map_err(|_| CifError::InvalidItemName(name.to_string()))?;
        let conn = self.inner.store.connection();

        let matches: Vec<i64> = {
            let mut stmt = conn
                .prepare_cached("SELECT loop_num FROM loop_item WHERE container_id = ?1 AND name = ?2")
                .map_err(from_sqlite)?;
            let rows = stmt
                .query_map(params![self.id.0, normalized], |row| row.get(0))
                .map_err(from_sqlite)?;
            rows.collect::<Result<_, _>>().map_err(from_sqlite)?
        };
        let loop_num = match matches.len() {
            0 => return Err(CifError::NoSuchItem(name.to_string())),
            1 => LoopNum(matches[0]),
            _ => {
                return Err(CifError::InternalError(format!(
                    "item {name:?} is claimed by more than one loop"
                )))
            }
        };
        let category: String = conn
            .query_row(
                "SELECT category FROM loop WHERE container_id = ?1 AND loop_num = ?2",
                params![self.id.0, loop_num.0],
                |row| row.get(0),
            )
            .map_err(from_sqlite)?;
        crate::loop_::load(self.inner.clone(), self.id, loop_num, category)
    }

    /// Every loop of this container, in creation order (spec §4.4
    /// `get_all_loops`).
    pub fn get_all_loops(&self) -> CifResult<Vec<Loop>> {
        self.inner.check_alive()?;
        self.check_exists()?;
        let conn = self.inner.store.connection();
        let loops: Vec<(i64, String)> = {
            let mut stmt = conn
                .prepare_cached("SELECT loop_num, category FROM loop WHERE container_id = ?1 ORDER BY loop_num")
                .map_err(from_sqlite)?;
            let rows = stmt
                .query_map(params![self.id.0], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(from_sqlite)?;
            rows.collect::<Result<_, _>>().map_err(from_sqlite)?
        };
        loops
            .into_iter()
            .map(|(loop_num, category)| crate::loop_::load(self.inner.clone(), self.id, LoopNum(loop_num), category))
            .collect()
    }
}

/// Deletes `id` and every descendant frame, leaves-first, so no child frame
/// ever outlives the parent row its own `save_frame` entry is keyed off of.
fn delete_container_recursive(conn: &rusqlite::Connection, id: ContainerId) -> CifResult<()> {
    let children: Vec<i64> = {
        let mut stmt = conn
            .prepare_cached("SELECT container_id FROM save_frame WHERE data_block_id = ?1")
            .map_err(from_sqlite)?;
        let rows = stmt.query_map(params![id.0], |row| row.get(0)).map_err(from_sqlite)?;
        rows.collect::<Result<_, _>>().map_err(from_sqlite)?
    };
    for child in children {
        delete_container_recursive(conn, ContainerId(child))?;
    }
    conn.execute("DELETE FROM container WHERE id = ?1", params![id.0])
        .map_err(from_sqlite)?;
    Ok(())
}

/// Finds or creates the scalar loop (category `""`) and writes `value` into
/// it for `normalized_name` (spec §4.5 `add_scalar`).
fn add_scalar(
    conn: &rusqlite::Connection,
    container_id: ContainerId,
    normalized_name: &str,
    orig_name: &str,
    value: &Value,
) -> CifResult<()> {
    let scalar_loop: Option<i64> = conn
        .query_row(
            "SELECT loop_num FROM loop WHERE container_id = ?1 AND category = ''",
            params![container_id.0],
            |row| row.get(0),
        )
        .optional()
        .map_err(from_sqlite)?;

    match scalar_loop {
        None => {
            let loop_num = rows::insert_loop_row(conn, container_id, "")?;
            rows::insert_loop_item(conn, container_id, loop_num, normalized_name, orig_name)?;
            let encoded = crate::codec::encode(value);
            rows::upsert_item_value(
                conn,
                container_id,
                normalized_name,
                cif_primitives::RowNum::FIRST,
                &encoded,
            )
        }
        Some(loop_num) => {
            let loop_num = LoopNum(loop_num);
            rows::insert_loop_item(conn, container_id, loop_num, normalized_name, orig_name)?;
            rows::set_all_values(conn, container_id, loop_num, normalized_name, value)
        }
    }
}
