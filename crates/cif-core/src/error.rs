//! The result-code taxonomy used across the public API.
//!
//! Modeled on the `DatastoreError`/`TableError` pattern used by larger
//! relational stores: a flat, exhaustive `thiserror` enum rather than a
//! hierarchy of nested error types, since (unlike a multi-table store) the
//! CIF core's error surface is small and fixed by the external contract in
//! spec §6.

use cif_normalize::InvalidNameError;
use enum_as_inner::EnumAsInner;
use thiserror::Error;

/// Every fallible core operation returns this.
pub type CifResult<T> = Result<T, CifError>;

/// `EnumAsInner` mirrors the `DatastoreError`/`TableError` style: callers
/// that only care about one failure mode can match it directly
/// (`err.is_no_such_item()`) instead of writing out the full `match`.
#[derive(Error, Debug, EnumAsInner)]
pub enum CifError {
    /// Generic, otherwise-unclassified failure (store I/O, allocation, or
    /// any SQLite error this crate does not give a specific meaning to).
    #[error("error: {0}")]
    Error(String),

    /// The runtime/DBMS environment could not satisfy a required capability
    /// (e.g. foreign keys could not be enabled).
    #[error("environment error: {0}")]
    EnvironmentError(String),

    /// A caller passed an invalid argument (e.g. a null/empty out-param, or
    /// an update key into a dependent packet that doesn't already have it).
    #[error("argument error: {0}")]
    ArgumentError(String),

    /// The API was used in a way its contract forbids regardless of
    /// arguments (double iterator, stale cursor update/remove).
    #[error("misuse: {0}")]
    Misuse(String),

    /// Allocation failure surfaced from the store layer.
    #[error("memory error")]
    MemoryError,

    /// An invariant the store itself is supposed to guarantee was violated.
    #[error("internal error: {0}")]
    InternalError(String),

    /// A handle (Document/Container/Loop/PacketIterator) is null, destroyed,
    /// or its live transaction has ended.
    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    /// A block code failed normalization.
    #[error("invalid block code: {0:?}")]
    InvalidBlockCode(String),

    /// `create_block` with a code already present (post-normalization).
    #[error("duplicate block code: {0:?}")]
    DupBlockCode(String),

    /// `get_block` found no block with that normalized code.
    #[error("no such block: {0:?}")]
    NoSuchBlock(String),

    /// A frame code failed normalization.
    #[error("invalid frame code: {0:?}")]
    InvalidFrameCode(String),

    /// `get_frame` found no frame with that normalized code in the parent.
    #[error("no such frame: {0:?}")]
    NoSuchFrame(String),

    /// `create_frame` with a code already used by a sibling frame. Not part
    /// of the literal §6 taxonomy (which has no `DUP_FRAMECODE` member,
    /// unlike its block-code counterpart) but added here for symmetry; see
    /// `DESIGN.md`.
    #[error("duplicate frame code: {0:?}")]
    DupFrameCode(String),

    /// A loop category failed normalization (currently: none do, reserved
    /// for dictionary-aware normalizers that reject malformed categories).
    #[error("invalid category: {0:?}")]
    InvalidCategory(String),

    /// `get_category_loop` found no loop with that category.
    #[error("no such loop")]
    NoSuchLoop,

    /// `get_category_loop` found more than one loop with that category.
    #[error("category not unique")]
    CatNotUnique,

    /// Creating a second scalar loop (category `""`) on one container.
    #[error("reserved loop: container already has a scalar loop")]
    ReservedLoop,

    /// `create_loop` was given a null/empty item name.
    #[error("null loop: item name list was empty or contained a null entry")]
    NullLoop,

    /// An item name failed normalization.
    #[error("invalid item name: {0:?}")]
    InvalidItemName(String),

    /// An item name already exists in the container (in some loop).
    #[error("duplicate item name: {0:?}")]
    DupItemName(String),

    /// No item by that name exists in the container.
    #[error("no such item: {0:?}")]
    NoSuchItem(String),

    /// `get_value` found the item present in more than one packet of its
    /// loop, so there is no single value to return.
    #[error("ambiguous item: {0:?}")]
    AmbiguousItem(String),

    /// A `PacketIterator::update` entry named an item that is not one of
    /// the bound loop's items.
    #[error("wrong loop: item {0:?} does not belong to this loop")]
    WrongLoop(String),

    /// The iterator has yielded its last packet; `next` was called again.
    #[error("finished")]
    Finished,
}

impl From<InvalidNameError> for CifError {
    fn from(_: InvalidNameError) -> Self {
        // The specific "invalid X" variant is chosen by call sites, which
        // know whether the rejected name was a block/frame/item name; this
        // blanket impl only covers call sites that don't distinguish.
        CifError::ArgumentError("invalid name".to_string())
    }
}

impl From<anyhow::Error> for CifError {
    fn from(err: anyhow::Error) -> Self {
        CifError::Error(err.to_string())
    }
}

/// The substring SQLite raises via `RAISE(ABORT, ...)` in the scalar-loop
/// uniqueness trigger (see `store::schema`). Part of the external contract
/// between the core and the store (spec §6).
pub const DUPLICATE_SCALAR_LOOP_MARKER: &str = "duplicate scalar loop";

/// Classifies a raw `rusqlite::Error` that isn't otherwise handled by a more
/// specific call site into the closest taxonomy member.
pub(crate) fn from_sqlite(err: rusqlite::Error) -> CifError {
    use rusqlite::ErrorCode;
    if let rusqlite::Error::SqliteFailure(ffi_err, _) = &err {
        if ffi_err.code == ErrorCode::ConstraintViolation {
            let msg = err.to_string();
            return if msg.contains(DUPLICATE_SCALAR_LOOP_MARKER) {
                CifError::ReservedLoop
            } else {
                CifError::InvalidHandle(msg)
            };
        }
    }
    CifError::Error(err.to_string())
}
