//! Option-stock ledger: pure bookkeeping for per-option-value stock.
//!
//! Option declarations (name -> ordered value list) and the numeric ledger
//! are kept as separate structures and reconciled only at the boundary, so
//! callers may redefine available values without having supplied stock for
//! all of them yet. Combinations without a ledger entry count as zero stock.

use crate::errors::ServiceError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Declared options: option name -> ordered list of permitted values.
pub type OptionMap = BTreeMap<String, Vec<String>>;

/// Composite ledger key. The `"name:value"` wire form is parsed/emitted only
/// at the API and storage boundaries; everything internal works on the pair.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OptionKey {
    pub name: String,
    pub value: String,
}

impl OptionKey {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Parses the `"name:value"` wire form. The value side keeps any further
    /// colons, matching how keys are split at the storage boundary.
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        match raw.split_once(':') {
            Some((name, value)) if !name.trim().is_empty() && !value.trim().is_empty() => {
                Ok(Self::new(name.trim(), value.trim()))
            }
            _ => Err(ServiceError::InconsistentLedger(format!(
                "ledger key '{}' is not of the form 'name:value'",
                raw
            ))),
        }
    }

    /// Wire/storage form of the key.
    pub fn storage_key(&self) -> String {
        format!("{}:{}", self.name, self.value)
    }
}

/// Per-option-value stock counts for one product.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StockLedger {
    entries: BTreeMap<OptionKey, i32>,
}

impl StockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a ledger from the wire representation (`"name:value" -> stock`).
    pub fn from_raw(raw: &HashMap<String, i32>) -> Result<Self, ServiceError> {
        let mut entries = BTreeMap::new();
        for (key, stock) in raw {
            entries.insert(OptionKey::parse(key)?, *stock);
        }
        Ok(Self { entries })
    }

    pub fn insert(&mut self, key: OptionKey, stock: i32) {
        self.entries.insert(key, stock);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: &OptionKey) -> Option<i32> {
        self.entries.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OptionKey, i32)> {
        self.entries.iter().map(|(k, v)| (k, *v))
    }

    /// Sum of all ledger values, saturating at the `i32` bounds; 0 for an
    /// empty ledger.
    pub fn total_stock(&self) -> i32 {
        let total: i64 = self.entries.values().map(|&v| i64::from(v)).sum();
        total.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }

    /// Checks the ledger against the declared option map.
    ///
    /// Fails when an entry references an undeclared `(name, value)` pair or
    /// carries a negative count. Entries absent for a declared combination
    /// are fine; they default to zero stock.
    pub fn validate(&self, options: &OptionMap) -> Result<(), ServiceError> {
        for (key, stock) in self.iter() {
            if stock < 0 {
                return Err(ServiceError::InconsistentLedger(format!(
                    "stock for '{}' is negative ({})",
                    key.storage_key(),
                    stock
                )));
            }

            let declared = options
                .get(&key.name)
                .map(|values| values.iter().any(|v| v == &key.value))
                .unwrap_or(false);

            if !declared {
                return Err(ServiceError::InconsistentLedger(format!(
                    "ledger entry '{}' does not match any declared option value",
                    key.storage_key()
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    fn color_size_options() -> OptionMap {
        let mut options = OptionMap::new();
        options.insert(
            "Color".to_string(),
            vec!["Red".to_string(), "Blue".to_string()],
        );
        options.insert(
            "Size".to_string(),
            vec!["S".to_string(), "M".to_string(), "L".to_string()],
        );
        options
    }

    #[test]
    fn empty_ledger_totals_zero() {
        assert_eq!(StockLedger::new().total_stock(), 0);
    }

    #[test]
    fn total_sums_all_entries() {
        let mut ledger = StockLedger::new();
        ledger.insert(OptionKey::new("Color", "Red"), 3);
        ledger.insert(OptionKey::new("Size", "M"), 4);
        assert_eq!(ledger.total_stock(), 7);
    }

    #[test]
    fn total_saturates_instead_of_overflowing() {
        let mut ledger = StockLedger::new();
        ledger.insert(OptionKey::new("Color", "Red"), i32::MAX);
        ledger.insert(OptionKey::new("Color", "Blue"), i32::MAX);
        assert_eq!(ledger.total_stock(), i32::MAX);
    }

    #[test]
    fn parse_round_trips_storage_key() {
        let key = OptionKey::parse("Color:Red").unwrap();
        assert_eq!(key.name, "Color");
        assert_eq!(key.value, "Red");
        assert_eq!(key.storage_key(), "Color:Red");
    }

    #[test]
    fn parse_keeps_extra_colons_in_value() {
        let key = OptionKey::parse("Finish:Matte:Dark").unwrap();
        assert_eq!(key.name, "Finish");
        assert_eq!(key.value, "Matte:Dark");
    }

    #[test]
    fn parse_rejects_malformed_keys() {
        assert_matches!(
            OptionKey::parse("NoSeparator"),
            Err(ServiceError::InconsistentLedger(_))
        );
        assert_matches!(
            OptionKey::parse(":Red"),
            Err(ServiceError::InconsistentLedger(_))
        );
        assert_matches!(
            OptionKey::parse("Color:"),
            Err(ServiceError::InconsistentLedger(_))
        );
    }

    #[test]
    fn validate_accepts_partial_coverage() {
        // Only Color:Red has stock; every other declared combination is
        // implicitly zero and that is acceptable.
        let mut ledger = StockLedger::new();
        ledger.insert(OptionKey::new("Color", "Red"), 3);
        assert!(ledger.validate(&color_size_options()).is_ok());
    }

    #[test]
    fn validate_rejects_undeclared_pair() {
        let mut ledger = StockLedger::new();
        ledger.insert(OptionKey::new("Material", "Wool"), 2);
        assert_matches!(
            ledger.validate(&color_size_options()),
            Err(ServiceError::InconsistentLedger(_))
        );
    }

    #[test]
    fn validate_rejects_declared_name_with_unknown_value() {
        let mut ledger = StockLedger::new();
        ledger.insert(OptionKey::new("Color", "Green"), 1);
        assert_matches!(
            ledger.validate(&color_size_options()),
            Err(ServiceError::InconsistentLedger(_))
        );
    }

    #[test]
    fn validate_rejects_negative_stock() {
        let mut ledger = StockLedger::new();
        ledger.insert(OptionKey::new("Color", "Red"), -1);
        assert_matches!(
            ledger.validate(&color_size_options()),
            Err(ServiceError::InconsistentLedger(_))
        );
    }

    #[test]
    fn from_raw_builds_typed_entries() {
        let mut raw = HashMap::new();
        raw.insert("Color:Red".to_string(), 3);
        raw.insert("Size:M".to_string(), 5);

        let ledger = StockLedger::from_raw(&raw).unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.get(&OptionKey::new("Color", "Red")), Some(3));
        assert_eq!(ledger.total_stock(), 8);
    }

    proptest! {
        #[test]
        fn total_equals_sum_of_declared_subset(counts in proptest::collection::vec(0i32..10_000, 0..20)) {
            let mut options = OptionMap::new();
            let mut ledger = StockLedger::new();
            let mut expected: i64 = 0;

            for (i, count) in counts.iter().enumerate() {
                let name = format!("Opt{}", i % 4);
                let value = format!("V{}", i);
                options.entry(name.clone()).or_default().push(value.clone());
                ledger.insert(OptionKey::new(name, value), *count);
                expected += i64::from(*count);
            }

            prop_assert!(ledger.validate(&options).is_ok());
            prop_assert_eq!(i64::from(ledger.total_stock()), expected);
        }
    }
}
