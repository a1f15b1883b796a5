//! Low-level row-shaped helpers shared by [`crate::container`] and
//! [`crate::loop_`]: the handful of prepared-statement calls that read or
//! write a single `loop`/`loop_item`/`item_value` row. Kept out of both
//! modules so neither has to reach into the other's private SQL.

use cif_primitives::{ContainerId, LoopNum, RowNum};
use rusqlite::{params, Connection, OptionalExtension};

use crate::codec::{self, EncodedValue};
use crate::error::{from_sqlite, CifError, CifResult};
use crate::store::map_unique_violation;
use crate::value::Value;

/// The `loop_num` of the loop that owns `name` in `container_id`, if any.
pub(crate) fn find_item_loop_num(
    conn: &Connection,
    container_id: ContainerId,
    normalized_name: &str,
) -> CifResult<Option<LoopNum>> {
    conn.query_row(
        "SELECT loop_num FROM loop_item WHERE container_id = ?1 AND name = ?2",
        params![container_id.0, normalized_name],
        |row| row.get::<_, i64>(0),
    )
    .optional()
    .map_err(from_sqlite)
    .map(|opt| opt.map(LoopNum))
}

/// Inserts a fresh `loop` row at the next `loop_num` for `container_id`.
/// Maps the scalar-loop trigger marker to [`CifError::ReservedLoop`] and any
/// other constraint failure (typically a missing container) to
/// [`CifError::InvalidHandle`] — see spec §4.4.
pub(crate) fn insert_loop_row(conn: &Connection, container_id: ContainerId, category: &str) -> CifResult<LoopNum> {
    let next_num: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(loop_num), -1) + 1 FROM loop WHERE container_id = ?1",
            params![container_id.0],
            |row| row.get(0),
        )
        .map_err(from_sqlite)?;
    conn.execute(
        "INSERT INTO loop (container_id, category, loop_num) VALUES (?1, ?2, ?3)",
        params![container_id.0, category, next_num],
    )
    .map_err(from_sqlite)?;
    Ok(LoopNum(next_num))
}

/// Inserts one `loop_item` row, mapping a unique-constraint failure to
/// [`CifError::DupItemName`].
pub(crate) fn insert_loop_item(
    conn: &Connection,
    container_id: ContainerId,
    loop_num: LoopNum,
    normalized_name: &str,
    orig_name: &str,
) -> CifResult<()> {
    conn.execute(
        "INSERT INTO loop_item (container_id, name, name_orig, loop_num) VALUES (?1, ?2, ?3, ?4)",
        params![container_id.0, normalized_name, orig_name, loop_num.0],
    )
    .map_err(|e| map_unique_violation(e, CifError::DupItemName(orig_name.to_string())))?;
    Ok(())
}

/// Insert-or-replace of one `item_value` row (spec §4.5 `set_all_values`).
pub(crate) fn upsert_item_value(
    conn: &Connection,
    container_id: ContainerId,
    normalized_name: &str,
    row_num: RowNum,
    encoded: &EncodedValue,
) -> CifResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO item_value
            (container_id, name, row_num, kind, val, val_text, val_digits, su_digits, scale, sign)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            container_id.0,
            normalized_name,
            row_num.0,
            encoded.kind,
            encoded.val,
            encoded.val_text,
            encoded.val_digits,
            encoded.su_digits,
            encoded.scale,
            encoded.sign,
        ],
    )
    .map_err(from_sqlite)?;
    Ok(())
}

/// The distinct row numbers currently populated for any item of `loop_num`
/// (spec invariant 2: every item of a loop shares the same row-number set).
pub(crate) fn row_nums_of_loop(conn: &Connection, container_id: ContainerId, loop_num: LoopNum) -> CifResult<Vec<i64>> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT DISTINCT iv.row_num FROM item_value iv
             JOIN loop_item li ON iv.container_id = li.container_id AND iv.name = li.name
             WHERE li.container_id = ?1 AND li.loop_num = ?2
             ORDER BY iv.row_num",
        )
        .map_err(from_sqlite)?;
    let rows = stmt
        .query_map(params![container_id.0, loop_num.0], |row| row.get(0))
        .map_err(from_sqlite)?;
    rows.collect::<Result<_, _>>().map_err(from_sqlite)
}

/// Re-numbers every row currently belonging to `loop_num` to a dense,
/// zero-based sequence, preserving relative order. Used only for the scalar
/// loop after `PacketIterator::remove` (spec §4.6: "a subsequent internal
/// 'reset packet number' step renormalizes row numbering to zero"). Rows are
/// processed lowest-old-row-first, so each new slot was already vacated by an
/// earlier delete/renumber and no `(container_id, name, row_num)` collision
/// is possible mid-loop.
pub(crate) fn renumber_rows_from_zero(conn: &Connection, container_id: ContainerId, loop_num: LoopNum) -> CifResult<()> {
    let row_nums = row_nums_of_loop(conn, container_id, loop_num)?;
    for (new_row, old_row) in row_nums.into_iter().enumerate() {
        let new_row = new_row as i64;
        if new_row != old_row {
            conn.execute(
                "UPDATE item_value SET row_num = ?1
                 WHERE container_id = ?2 AND row_num = ?3
                 AND name IN (SELECT name FROM loop_item WHERE container_id = ?2 AND loop_num = ?4)",
                params![new_row, container_id.0, old_row, loop_num.0],
            )
            .map_err(from_sqlite)?;
        }
    }
    Ok(())
}

/// Writes `value` into every row currently belonging to `loop_num` for
/// `normalized_name`. Zero rows affected is success (spec §9 open-question
/// resolution: a zero-packet loop's "set all values" is a no-op).
pub(crate) fn set_all_values(
    conn: &Connection,
    container_id: ContainerId,
    loop_num: LoopNum,
    normalized_name: &str,
    value: &Value,
) -> CifResult<()> {
    let row_nums = row_nums_of_loop(conn, container_id, loop_num)?;
    let encoded = codec::encode(value);
    for row_num in row_nums {
        upsert_item_value(conn, container_id, normalized_name, RowNum(row_num), &encoded)?;
    }
    Ok(())
}
