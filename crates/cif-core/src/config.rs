//! Configuration for opening a [`Document`](crate::Document)'s backing
//! store. Kept deliberately tiny — the core has no CLI or env-var surface —
//! but still modeled as a real config struct rather than a pile of function
//! arguments, with WAL/NORMAL as sensible defaults for a single-writer store.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where a `Document`'s SQLite store lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum StoreLocation {
    /// In-memory, discarded when the `Document` is destroyed.
    #[default]
    Memory,
    /// Backed by a file on disk.
    File(PathBuf),
}

/// Connection-level tuning. `Serialize`/`Deserialize` so a host application
/// can embed this as a section of its own on-disk configuration rather than
/// wiring up document stores from bare constructor arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub location: StoreLocation,
    /// `PRAGMA journal_mode`.
    pub journal_mode: JournalMode,
    /// `PRAGMA synchronous`.
    pub synchronous: Synchronous,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            location: StoreLocation::Memory,
            journal_mode: JournalMode::Wal,
            synchronous: Synchronous::Normal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalMode {
    Delete,
    Wal,
    Memory,
}

impl JournalMode {
    pub(crate) fn as_pragma(self) -> &'static str {
        match self {
            JournalMode::Delete => "DELETE",
            JournalMode::Wal => "WAL",
            JournalMode::Memory => "MEMORY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Synchronous {
    Off,
    Normal,
    Full,
}

impl Synchronous {
    pub(crate) fn as_pragma(self) -> &'static str {
        match self {
            Synchronous::Off => "OFF",
            Synchronous::Normal => "NORMAL",
            Synchronous::Full => "FULL",
        }
    }
}
