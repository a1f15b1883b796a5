//! The root aggregate: one persisted store plus the container handles
//! layered over it (spec §3 "Document").

use std::cell::Cell;
use std::rc::Rc;

use cif_normalize::{CifNameNormalizer, NameNormalizer};
use rusqlite::params;

use crate::config::StoreConfig;
use crate::container::Container;
use crate::error::{CifError, CifResult};
use crate::store::{map_unique_violation, Store};
use cif_primitives::ContainerId;

/// Shared state behind every handle (`Document`, `Container`, `Loop`,
/// `PacketIterator`) derived from one document. Containers/Loops/Iterators
/// hold a clone of this `Rc` rather than owning the store themselves —
/// the weak/borrowed back-reference relationship spec §3/§9 calls for,
/// implemented with reference counting plus the `alive` flag standing in
/// for a generation check (see `SPEC_FULL.md` design resolution 4).
pub(crate) struct DocumentInner {
    pub(crate) store: Store,
    pub(crate) normalizer: Rc<dyn NameNormalizer>,
    alive: Cell<bool>,
}

impl DocumentInner {
    pub(crate) fn check_alive(&self) -> CifResult<()> {
        if self.alive.get() {
            Ok(())
        } else {
            Err(CifError::InvalidHandle("document has been destroyed".to_string()))
        }
    }
}

/// The root handle for one CIF document: an identified set of blocks, each
/// possibly containing save frames, each containing loops.
pub struct Document {
    pub(crate) inner: Rc<DocumentInner>,
}

impl Document {
    /// Opens (or creates) the backing store and runs the DDL. Fails with
    /// [`CifError::EnvironmentError`] if foreign keys cannot be enforced.
    pub fn create(config: &StoreConfig) -> CifResult<Document> {
        Self::create_with_normalizer(config, Rc::new(CifNameNormalizer))
    }

    pub fn create_with_normalizer(
        config: &StoreConfig,
        normalizer: Rc<dyn NameNormalizer>,
    ) -> CifResult<Document> {
        let store = Store::open(config)?;
        Ok(Document {
            inner: Rc::new(DocumentInner {
                store,
                normalizer,
                alive: Cell::new(true),
            }),
        })
    }

    /// Creates a new, empty block. Atomic; fails with
    /// [`CifError::InvalidBlockCode`] if `code` fails normalization, or
    /// [`CifError::DupBlockCode`] if a block with that code already exists.
    pub fn create_block(&self, code: &str) -> CifResult<Container> {
        self.inner.check_alive()?;
        let normalized = self
            .inner
            .normalizer
            .normalize(code)
            .map_err(|_| CifError::InvalidBlockCode(code.to_string()))?;

        let container_id = self.inner.store.with_tx(|conn| {
            conn.execute("INSERT INTO container DEFAULT VALUES", [])
                .map_err(crate::error::from_sqlite)?;
            let container_id = conn.last_insert_rowid();
            conn.execute(
                "INSERT INTO data_block (container_id, name, name_orig) VALUES (?1, ?2, ?3)",
                params![container_id, normalized, code],
            )
            .map_err(|e| map_unique_violation(e, CifError::DupBlockCode(code.to_string())))?;
            Ok(container_id)
        })?;

        tracing::debug!(code, container_id, "created block");
        Ok(Container::new_block(
            self.inner.clone(),
            ContainerId(container_id),
            normalized,
            code.to_string(),
        ))
    }

    /// Looks up a block by (normalized) code.
    pub fn get_block(&self, code: &str) -> CifResult<Container> {
        self.inner.check_alive()?;
        let normalized = self
            .inner
            .normalizer
            .normalize(code)
            .map_err(|_| CifError::InvalidBlockCode(code.to_string()))?;

        let conn = self.inner.store.connection();
        let row = conn
            .query_row(
                "SELECT container_id, name, name_orig FROM data_block WHERE name = ?1",
                [&normalized],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional_no_such(|| CifError::NoSuchBlock(code.to_string()))?;

        let (container_id, name, name_orig) = row;
        Ok(Container::new_block(
            self.inner.clone(),
            ContainerId(container_id),
            name,
            name_orig,
        ))
    }

    /// All blocks, in creation order.
    pub fn get_all_blocks(&self) -> CifResult<Vec<Container>> {
        self.inner.check_alive()?;
        let conn = self.inner.store.connection();
        let mut stmt = conn
            .prepare_cached("SELECT container_id, name, name_orig FROM data_block ORDER BY container_id")
            .map_err(crate::error::from_sqlite)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(crate::error::from_sqlite)?;

        let mut blocks = Vec::new();
        for row in rows {
            let (container_id, name, name_orig) = row.map_err(crate::error::from_sqlite)?;
            blocks.push(Container::new_block(
                self.inner.clone(),
                ContainerId(container_id),
                name,
                name_orig,
            ));
        }
        Ok(blocks)
    }

    /// Rolls back any open transaction, drops the store connection. The
    /// `Document` (and any `Container`/`Loop` handles still referencing it)
    /// subsequently report [`CifError::InvalidHandle`] on every call.
    pub fn destroy(self) {
        if self.inner.store.has_active_transaction() {
            tracing::warn!("destroying document with an active transaction; rolling back");
            self.inner.store.rollback_active();
        }
        self.inner.alive.set(false);
    }
}

/// Small helper trait to turn rusqlite's "no row" outcome into a specific
/// `CifError` at each call site, rather than one generic mapping.
pub(crate) trait OptionalNoSuch<T> {
    fn optional_no_such(self, err: impl FnOnce() -> CifError) -> CifResult<T>;
}

impl<T> OptionalNoSuch<T> for Result<T, rusqlite::Error> {
    fn optional_no_such(self, err: impl FnOnce() -> CifError) -> CifResult<T> {
        match self {
            Ok(v) => Ok(v),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(err()),
            Err(e) => Err(crate::error::from_sqlite(e)),
        }
    }
}
