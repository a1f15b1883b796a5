//! The relational store underlying one [`Document`](crate::Document):
//! connection, schema, and the transaction/savepoint discipline of spec
//! §4.1.
//!
//! Nesting model (the same shape as `RelationalDB::with_auto_commit` /
//! `finish_tx` / `rollback_on_err` use for an internal MVCC datastore,
//! adapted here to SQLite's own BEGIN/SAVEPOINT vocabulary): top-level
//! operations bracket themselves in `BEGIN`/`COMMIT`/`ROLLBACK`;
//! multi-step internals nest `SAVEPOINT`/`RELEASE`/`ROLLBACK TO` inside that.
//! Only one top-level transaction may be open at a time per `Document` —
//! this is also how a live `PacketIterator` excludes any other mutation.
//!
//! `rusqlite::Connection`'s own methods take `&self` (it manages its
//! statement cache and transaction state internally), so the bookkeeping
//! this module adds on top — whether a top-level transaction is open, and
//! how deeply savepoints are nested — is kept in `Cell`s rather than
//! requiring `&mut Store` everywhere. That lets nested helpers (e.g.
//! `add_scalar` opening a savepoint while already inside the caller's
//! top-level transaction) borrow the store no differently than a leaf call.

mod schema;

use crate::config::StoreConfig;
use crate::error::{from_sqlite, CifError, CifResult};
use rusqlite::Connection;
use std::cell::Cell;

pub(crate) struct Store {
    conn: Connection,
    /// `true` once a top-level `BEGIN` has run and not yet been closed by a
    /// matching `COMMIT`/`ROLLBACK`. A live `PacketIterator` holds this open
    /// across calls; everything else opens and closes it within one method.
    top_level_active: Cell<bool>,
    /// Current savepoint nesting depth.
    sp_depth: Cell<u32>,
}

impl Store {
    pub fn open(config: &StoreConfig) -> CifResult<Store> {
        let conn = match &config.location {
            crate::config::StoreLocation::Memory => Connection::open_in_memory(),
            crate::config::StoreLocation::File(path) => Connection::open(path),
        }
        .map_err(|e| CifError::EnvironmentError(e.to_string()))?;

        conn.execute_batch(&format!(
            "PRAGMA journal_mode = {};\nPRAGMA synchronous = {};",
            config.journal_mode.as_pragma(),
            config.synchronous.as_pragma(),
        ))
        .map_err(|e| CifError::EnvironmentError(e.to_string()))?;

        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| CifError::EnvironmentError(e.to_string()))?;
        let fk_enabled: i64 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .map_err(|e| CifError::EnvironmentError(e.to_string()))?;
        if fk_enabled != 1 {
            return Err(CifError::EnvironmentError(
                "this SQLite build cannot enforce foreign keys".to_string(),
            ));
        }

        conn.execute_batch(schema::DDL)
            .map_err(|e| CifError::Error(format!("DDL failed: {e}")))?;

        Ok(Store {
            conn,
            top_level_active: Cell::new(false),
            sp_depth: Cell::new(0),
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn has_active_transaction(&self) -> bool {
        self.top_level_active.get()
    }

    /// Opens the top-level transaction, fails with [`CifError::Misuse`] if
    /// one is already open (e.g. a live `PacketIterator`).
    fn begin_top(&self) -> CifResult<()> {
        if self.top_level_active.get() {
            return Err(CifError::Misuse(
                "a transaction is already active on this document".to_string(),
            ));
        }
        self.conn
            .execute_batch("BEGIN")
            .map_err(|e| CifError::Error(e.to_string()))?;
        self.top_level_active.set(true);
        Ok(())
    }

    fn commit_top(&self) -> CifResult<()> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| CifError::Error(e.to_string()))?;
        self.top_level_active.set(false);
        Ok(())
    }

    fn rollback_top(&self) {
        // Best-effort: a rollback runs on every non-success exit path, so it
        // must not itself hide the caller's original error.
        let _ = self.conn.execute_batch("ROLLBACK");
        self.top_level_active.set(false);
        self.sp_depth.set(0);
    }

    /// Runs `f` inside a top-level `BEGIN`/`COMMIT`, rolling back on `Err`.
    /// This is the workhorse behind every public mutating operation in
    /// `Document`/`Container`/`Loop`, the same shape as
    /// `RelationalDB::with_auto_commit`.
    pub fn with_tx<F, A>(&self, f: F) -> CifResult<A>
    where
        F: FnOnce(&Connection) -> CifResult<A>,
    {
        self.begin_top()?;
        match f(&self.conn) {
            Ok(value) => {
                self.commit_top()?;
                Ok(value)
            }
            Err(e) => {
                self.rollback_top();
                Err(e)
            }
        }
    }

    /// Runs `f` inside a nested `SAVEPOINT`, assumed to be called while a
    /// top-level transaction (or SQLite's own autocommit mode) is already
    /// in effect. Rolls back to (and releases) the savepoint on `Err`.
    pub fn with_savepoint<F, A>(&self, f: F) -> CifResult<A>
    where
        F: FnOnce(&Connection) -> CifResult<A>,
    {
        let depth = self.sp_depth.get() + 1;
        let name = format!("sp_{depth}");
        self.conn
            .execute_batch(&format!("SAVEPOINT {name}"))
            .map_err(|e| CifError::Error(e.to_string()))?;
        self.sp_depth.set(depth);

        let result = f(&self.conn);

        self.sp_depth.set(depth - 1);
        match result {
            Ok(value) => {
                self.conn
                    .execute_batch(&format!("RELEASE {name}"))
                    .map_err(|e| CifError::Error(e.to_string()))?;
                Ok(value)
            }
            Err(e) => {
                let _ = self
                    .conn
                    .execute_batch(&format!("ROLLBACK TO {name};\nRELEASE {name}"));
                Err(e)
            }
        }
    }

    /// Opens the top-level transaction and leaves it open for the caller —
    /// used exclusively by `PacketIterator::new` (spec §4.6/§5). The caller
    /// is responsible for eventually calling [`Store::commit_iterator_tx`]
    /// or [`Store::rollback_iterator_tx`].
    pub fn begin_iterator_tx(&self) -> CifResult<()> {
        self.begin_top()
    }

    pub fn commit_iterator_tx(&self) -> CifResult<()> {
        self.commit_top()
    }

    pub fn rollback_iterator_tx(&self) {
        self.rollback_top();
    }

    /// Rolls back whatever top-level transaction is currently open, if any
    /// (used by `Document::destroy`, regardless of who opened it).
    pub fn rollback_active(&self) {
        self.rollback_top();
    }
}

/// Maps a constraint-violation error to `on_dup`, anything else to the
/// generic classification in [`crate::error::from_sqlite`].
pub(crate) fn map_unique_violation(err: rusqlite::Error, on_dup: CifError) -> CifError {
    if let rusqlite::Error::SqliteFailure(ffi_err, _) = &err {
        if ffi_err.code == rusqlite::ErrorCode::ConstraintViolation {
            return on_dup;
        }
    }
    from_sqlite(err)
}
