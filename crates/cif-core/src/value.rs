//! The tagged [`Value`] union (spec §3 "Value") and its canonical text /
//! numeric decomposition.
//!
//! Modeled as a plain Rust enum with per-variant payloads rather than an
//! inheritance hierarchy, per spec §9 ("Ad-hoc polymorphism of Value").

use crate::map::Map;
use std::fmt;

/// Decimal sign, `+1` or `-1`. There is no signed zero: `Number::zero()`
/// always carries `Sign::Positive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Positive,
    Negative,
}

impl Sign {
    fn as_char(self) -> &'static str {
        match self {
            Sign::Positive => "",
            Sign::Negative => "-",
        }
    }
}

/// A CIF numeric value: canonical text plus the decomposition required
/// (spec §3 "Invariants for Number"): sign, digit string with no
/// leading zeros (except a literal `"0"`), optional standard-uncertainty
/// digits, and decimal scale (number of digits after the decimal point).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Number {
    sign: Sign,
    digits: String,
    su_digits: Option<String>,
    scale: u32,
}

impl Number {
    /// Builds a `Number` from its decomposed parts, validating the
    /// "no leading zeros except literal zero" invariant.
    pub fn new(sign: Sign, digits: impl Into<String>, su_digits: Option<String>, scale: u32) -> Number {
        let digits = digits.into();
        debug_assert!(
            digits == "0" || !digits.starts_with('0'),
            "digit string must not have leading zeros (got {digits:?})"
        );
        Number {
            sign,
            digits,
            su_digits,
            scale,
        }
    }

    pub fn zero() -> Number {
        Number::new(Sign::Positive, "0", None, 0)
    }

    pub fn sign(&self) -> Sign {
        self.sign
    }

    pub fn digits(&self) -> &str {
        &self.digits
    }

    pub fn su_digits(&self) -> Option<&str> {
        self.su_digits.as_deref()
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Renders the canonical text form, e.g. `-12.340(7)`.
    pub fn to_canonical_text(&self) -> String {
        let mut out = String::new();
        out.push_str(self.sign.as_char());

        let scale = self.scale as usize;
        if scale == 0 {
            out.push_str(&self.digits);
        } else if self.digits.len() > scale {
            let split = self.digits.len() - scale;
            out.push_str(&self.digits[..split]);
            out.push('.');
            out.push_str(&self.digits[split..]);
        } else {
            out.push_str("0.");
            out.push_str(&"0".repeat(scale - self.digits.len()));
            out.push_str(&self.digits);
        }

        if let Some(su) = &self.su_digits {
            out.push('(');
            out.push_str(su);
            out.push(')');
        }
        out
    }
}

/// One of the six value kinds described in spec §3.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing but presumed measurable (CIF `?`).
    Unknown,
    /// Missing by design (CIF `.`).
    NotApplicable,
    /// Free text.
    Character(String),
    /// Numeric, with a canonical decomposition.
    Number(Number),
    /// An ordered sequence of values.
    List(Vec<Value>),
    /// A name -> value map.
    Table(Map),
}

/// Discriminant stored in `item_value.kind`. Order is part of the on-disk
/// format and must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum ValueKind {
    Unknown = 0,
    NotApplicable = 1,
    Character = 2,
    Number = 3,
    List = 4,
    Table = 5,
}

impl ValueKind {
    pub(crate) fn from_i64(v: i64) -> Option<ValueKind> {
        Some(match v {
            0 => ValueKind::Unknown,
            1 => ValueKind::NotApplicable,
            2 => ValueKind::Character,
            3 => ValueKind::Number,
            4 => ValueKind::List,
            5 => ValueKind::Table,
            _ => return None,
        })
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Unknown => ValueKind::Unknown,
            Value::NotApplicable => ValueKind::NotApplicable,
            Value::Character(_) => ValueKind::Character,
            Value::Number(_) => ValueKind::Number,
            Value::List(_) => ValueKind::List,
            Value::Table(_) => ValueKind::Table,
        }
    }

    /// The canonical text form. Creating an unknown/not-applicable value
    /// yields no text (spec §4.7); a freshly-created number defaults to
    /// `"0"`.
    pub fn get_text(&self) -> Option<String> {
        match self {
            Value::Unknown | Value::NotApplicable => None,
            Value::Character(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_canonical_text()),
            Value::List(_) | Value::Table(_) => None,
        }
    }

    /// Element count for `List`/`Table` values (spec §4.7
    /// `get_element_count`); `None` for scalar kinds.
    pub fn get_element_count(&self) -> Option<usize> {
        match self {
            Value::List(items) => Some(items.len()),
            Value::Table(map) => Some(map.len()),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Unknown
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unknown => write!(f, "?"),
            Value::NotApplicable => write!(f, "."),
            Value::Character(s) => write!(f, "{s}"),
            Value::Number(n) => write!(f, "{}", n.to_canonical_text()),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Table(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_renders_as_single_digit() {
        assert_eq!(Number::zero().to_canonical_text(), "0");
    }

    #[test]
    fn scale_inserts_decimal_point() {
        let n = Number::new(Sign::Negative, "1234", Some("7".to_string()), 2);
        assert_eq!(n.to_canonical_text(), "-12.34(7)");
    }

    #[test]
    fn scale_wider_than_digits_pads_with_zeros() {
        let n = Number::new(Sign::Positive, "5", None, 3);
        assert_eq!(n.to_canonical_text(), "0.005");
    }

    #[test]
    fn unknown_and_na_have_no_text() {
        assert_eq!(Value::Unknown.get_text(), None);
        assert_eq!(Value::NotApplicable.get_text(), None);
    }
}
