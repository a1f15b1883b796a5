//! Name normalization strategy used for identity comparisons of item, block,
//! frame and table-key names throughout the CIF core.
//!
//! This is deliberately a small, swappable trait rather than a single
//! hard-coded function: callers embedding a dictionary-aware comparison
//! (e.g. DDLm `_name.linked_item_id`-style folding) can supply their own
//! [`NameNormalizer`] without touching the container/loop/value machinery.
//! Full Unicode text normalization of *values* (as opposed to *names*) is
//! out of scope here, as it is for the core as a whole.

use unicode_normalization::UnicodeNormalization;

/// A name failed normalization (empty, or made up entirely of whitespace).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("name is empty or contains no significant characters")]
pub struct InvalidNameError;

/// Canonicalizes a name for identity comparisons.
///
/// Implementations must be deterministic and idempotent:
/// `normalize(normalize(x)?)? == normalize(x)?` for every `x` that
/// normalizes successfully.
pub trait NameNormalizer {
    fn normalize(&self, name: &str) -> Result<String, InvalidNameError>;
}

/// The default normalizer: Unicode NFC-normalizes the input, then
/// lowercases it. This mirrors the case-insensitive identity comparison CIF
/// dictionaries define for data names, block codes and frame codes.
#[derive(Debug, Default, Clone, Copy)]
pub struct CifNameNormalizer;

impl NameNormalizer for CifNameNormalizer {
    fn normalize(&self, name: &str) -> Result<String, InvalidNameError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(InvalidNameError);
        }
        let nfc: String = trimmed.nfc().collect();
        Ok(nfc.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_blank_names() {
        assert!(CifNameNormalizer.normalize("").is_err());
        assert!(CifNameNormalizer.normalize("   ").is_err());
    }

    #[test]
    fn folds_case() {
        assert_eq!(
            CifNameNormalizer.normalize("_Cell_Length_A").unwrap(),
            "_cell_length_a"
        );
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(s in "\\PC{1,40}") {
            if let Ok(once) = CifNameNormalizer.normalize(&s) {
                let twice = CifNameNormalizer.normalize(&once).unwrap();
                prop_assert_eq!(once, twice);
            }
        }
    }
}
