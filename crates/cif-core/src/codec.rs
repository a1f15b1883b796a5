//! Encodes/decodes a [`Value`] to and from the columns of `item_value`
//! (spec §4.1). `List`/`Table` values, which have no flat relational
//! decomposition, are serialized as JSON into the `val` column; every other
//! kind uses its own dedicated columns so that e.g. a numeric comparison or
//! an uncertainty-aware query could be written directly against the schema.

use std::rc::Rc;

use cif_normalize::NameNormalizer;
use rusqlite::Row;
use serde_json::json;

use crate::error::{CifError, CifResult};
use crate::map::Map;
use crate::value::{Number, Sign, Value, ValueKind};

/// The columns written for one `item_value` row, in schema order following
/// `kind`.
pub(crate) struct EncodedValue {
    pub kind: i64,
    pub val: Option<String>,
    pub val_text: Option<String>,
    pub val_digits: Option<String>,
    pub su_digits: Option<String>,
    pub scale: Option<i64>,
    pub sign: Option<i64>,
}

pub(crate) fn encode(value: &Value) -> EncodedValue {
    match value {
        Value::Unknown => EncodedValue {
            kind: ValueKind::Unknown as i64,
            val: None,
            val_text: None,
            val_digits: None,
            su_digits: None,
            scale: None,
            sign: None,
        },
        Value::NotApplicable => EncodedValue {
            kind: ValueKind::NotApplicable as i64,
            val: None,
            val_text: None,
            val_digits: None,
            su_digits: None,
            scale: None,
            sign: None,
        },
        Value::Character(s) => EncodedValue {
            kind: ValueKind::Character as i64,
            val: Some(s.clone()),
            val_text: None,
            val_digits: None,
            su_digits: None,
            scale: None,
            sign: None,
        },
        Value::Number(n) => EncodedValue {
            kind: ValueKind::Number as i64,
            val: None,
            val_text: Some(n.to_canonical_text()),
            val_digits: Some(n.digits().to_string()),
            su_digits: n.su_digits().map(|s| s.to_string()),
            scale: Some(n.scale() as i64),
            sign: Some(if n.sign() == Sign::Positive { 1 } else { -1 }),
        },
        Value::List(items) => EncodedValue {
            kind: ValueKind::List as i64,
            val: Some(serde_json::to_string(&value_to_json(value)).unwrap_or_else(|_| "[]".to_string())),
            val_text: None,
            val_digits: None,
            su_digits: None,
            scale: Some(items.len() as i64),
            sign: None,
        },
        Value::Table(_) => EncodedValue {
            kind: ValueKind::Table as i64,
            val: Some(serde_json::to_string(&value_to_json(value)).unwrap_or_else(|_| "{}".to_string())),
            val_text: None,
            val_digits: None,
            su_digits: None,
            scale: None,
            sign: None,
        },
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Unknown => json!({"k": "unknown"}),
        Value::NotApplicable => json!({"k": "na"}),
        Value::Character(s) => json!({"k": "char", "v": s}),
        Value::Number(n) => json!({
            "k": "number",
            "sign": if n.sign() == Sign::Positive { 1 } else { -1 },
            "digits": n.digits(),
            "su": n.su_digits(),
            "scale": n.scale(),
        }),
        Value::List(items) => json!({
            "k": "list",
            "v": items.iter().map(value_to_json).collect::<Vec<_>>(),
        }),
        Value::Table(map) => json!({
            "k": "table",
            "v": map.iter().map(|(k, v)| (k.to_string(), value_to_json(v))).collect::<serde_json::Map<_, _>>(),
        }),
    }
}

fn json_to_value(json: &serde_json::Value, normalizer: &Rc<dyn NameNormalizer>) -> CifResult<Value> {
    let kind = json
        .get("k")
        .and_then(|k| k.as_str())
        .ok_or_else(|| CifError::InternalError("malformed encoded composite value".to_string()))?;
    Ok(match kind {
        "unknown" => Value::Unknown,
        "na" => Value::NotApplicable,
        "char" => Value::Character(json["v"].as_str().unwrap_or_default().to_string()),
        "number" => {
            let sign = if json["sign"].as_i64().unwrap_or(1) >= 0 {
                Sign::Positive
            } else {
                Sign::Negative
            };
            let digits = json["digits"].as_str().unwrap_or("0").to_string();
            let su = json["su"].as_str().map(|s| s.to_string());
            let scale = json["scale"].as_u64().unwrap_or(0) as u32;
            Value::Number(Number::new(sign, digits, su, scale))
        }
        "list" => {
            let items = json["v"]
                .as_array()
                .ok_or_else(|| CifError::InternalError("malformed encoded list value".to_string()))?
                .iter()
                .map(|v| json_to_value(v, normalizer))
                .collect::<CifResult<Vec<_>>>()?;
            Value::List(items)
        }
        "table" => {
            let mut map = Map::new(normalizer.clone());
            let obj = json["v"]
                .as_object()
                .ok_or_else(|| CifError::InternalError("malformed encoded table value".to_string()))?;
            for (k, v) in obj {
                map.set_item(k, json_to_value(v, normalizer)?)
                    .map_err(|_| CifError::InternalError("malformed encoded table key".to_string()))?;
            }
            Value::Table(map)
        }
        other => {
            return Err(CifError::InternalError(format!(
                "unrecognized encoded value kind {other:?}"
            )))
        }
    })
}

/// Reconstructs a `Value` from a `item_value` row. `columns` gives the
/// 0-based indices, in the caller's own `SELECT`, of
/// `(kind, val, val_text, val_digits, su_digits, scale, sign)` — see §9
/// open-question resolution 1: every call site documents and uses its own
/// query's column order rather than assuming a shared convention.
pub(crate) fn decode(
    row: &Row<'_>,
    columns: (usize, usize, usize, usize, usize, usize, usize),
    normalizer: &Rc<dyn NameNormalizer>,
) -> CifResult<Value> {
    let (kind_col, val_col, text_col, digits_col, su_col, scale_col, sign_col) = columns;
    let kind_raw: i64 = row.get(kind_col).map_err(crate::error::from_sqlite)?;
    let kind = ValueKind::from_i64(kind_raw)
        .ok_or_else(|| CifError::InternalError(format!("unrecognized value kind {kind_raw}")))?;

    Ok(match kind {
        ValueKind::Unknown => Value::Unknown,
        ValueKind::NotApplicable => Value::NotApplicable,
        ValueKind::Character => {
            let s: String = row.get(val_col).map_err(crate::error::from_sqlite)?;
            Value::Character(s)
        }
        ValueKind::Number => {
            let digits: String = row.get(digits_col).map_err(crate::error::from_sqlite)?;
            let su: Option<String> = row.get(su_col).map_err(crate::error::from_sqlite)?;
            let scale: i64 = row.get(scale_col).map_err(crate::error::from_sqlite)?;
            let sign: i64 = row.get(sign_col).map_err(crate::error::from_sqlite)?;
            let _ = text_col; // canonical text is derived, not re-parsed
            Value::Number(Number::new(
                if sign >= 0 { Sign::Positive } else { Sign::Negative },
                digits,
                su,
                scale as u32,
            ))
        }
        ValueKind::List | ValueKind::Table => {
            let raw: String = row.get(val_col).map_err(crate::error::from_sqlite)?;
            let json: serde_json::Value = serde_json::from_str(&raw)
                .map_err(|e| CifError::InternalError(format!("malformed composite value: {e}")))?;
            json_to_value(&json, normalizer)?
        }
    })
}
