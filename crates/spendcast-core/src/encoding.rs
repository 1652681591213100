//! Stable categorical encoding
//!
//! A [`CategoryMap`] assigns contiguous ids from 0 in first-seen order of a
//! reference corpus. It is immutable once built; values it has never seen
//! encode to [`UNSEEN`] both when aggregating and when predicting.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::Transaction;

/// Code for any value absent from its map
pub const UNSEEN: i64 = -1;

/// Bidirectional string <-> id map
///
/// Serialized as the ordered list of values, so a persisted map rebuilds to
/// exactly the same ids.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct CategoryMap {
    values: Vec<String>,
    ids: HashMap<String, i64>,
}

impl CategoryMap {
    /// Build from a corpus; values are trimmed, duplicates keep their first id
    pub fn build<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut map = Self::default();
        for value in values {
            let value = value.as_ref().trim();
            if !map.ids.contains_key(value) {
                map.ids.insert(value.to_string(), map.values.len() as i64);
                map.values.push(value.to_string());
            }
        }
        map
    }

    /// Id for `value`, or [`UNSEEN`]
    pub fn encode(&self, value: &str) -> i64 {
        self.ids.get(value.trim()).copied().unwrap_or(UNSEEN)
    }

    pub fn decode(&self, id: i64) -> Option<&str> {
        usize::try_from(id)
            .ok()
            .and_then(|i| self.values.get(i))
            .map(String::as_str)
    }

    pub fn contains(&self, value: &str) -> bool {
        self.ids.contains_key(value.trim())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values in id order
    pub fn values(&self) -> &[String] {
        &self.values
    }
}

impl From<Vec<String>> for CategoryMap {
    fn from(values: Vec<String>) -> Self {
        Self::build(values)
    }
}

impl From<CategoryMap> for Vec<String> {
    fn from(map: CategoryMap) -> Self {
        map.values
    }
}

/// The four maps fixed when the models were trained
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CategoryMaps {
    pub client: CategoryMap,
    pub merchant: CategoryMap,
    pub category: CategoryMap,
    pub sale_type: CategoryMap,
}

/// Encoded categorical columns of one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncodedCategories {
    pub client: i64,
    pub merchant: i64,
    pub category: i64,
    pub sale_type: i64,
}

impl CategoryMaps {
    /// Build all four maps from a reference corpus
    pub fn from_corpus(transactions: &[Transaction]) -> Self {
        Self {
            client: CategoryMap::build(transactions.iter().map(|t| &t.client_id)),
            merchant: CategoryMap::build(transactions.iter().map(|t| &t.merchant)),
            category: CategoryMap::build(transactions.iter().map(|t| &t.merchant_category)),
            sale_type: CategoryMap::build(transactions.iter().map(|t| &t.sale_type)),
        }
    }

    pub fn encode(&self, tx: &Transaction) -> EncodedCategories {
        EncodedCategories {
            client: self.client.encode(&tx.client_id),
            merchant: self.merchant.encode(&tx.merchant),
            category: self.category.encode(&tx.merchant_category),
            sale_type: self.sale_type.encode(&tx.sale_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_first_seen_order() {
        let map = CategoryMap::build(["grocery", "fuel", "grocery", "pharmacy"]);
        assert_eq!(map.len(), 3);
        assert_eq!(map.encode("grocery"), 0);
        assert_eq!(map.encode("fuel"), 1);
        assert_eq!(map.encode("pharmacy"), 2);
        assert_eq!(map.values(), &["grocery", "fuel", "pharmacy"]);
    }

    #[test]
    fn test_build_trims_values() {
        let map = CategoryMap::build(["  OXXO ", "OXXO", "Walmart"]);
        assert_eq!(map.len(), 2);
        assert_eq!(map.encode("OXXO"), 0);
        assert_eq!(map.encode(" OXXO  "), 0);
    }

    #[test]
    fn test_unseen_encodes_to_minus_one() {
        let map = CategoryMap::build(["a", "b"]);
        assert_eq!(map.encode("c"), UNSEEN);
        assert_eq!(map.encode(""), UNSEEN);
        assert_eq!(CategoryMap::default().encode("a"), UNSEEN);
    }

    #[test]
    fn test_decode() {
        let map = CategoryMap::build(["a", "b"]);
        assert_eq!(map.decode(1), Some("b"));
        assert_eq!(map.decode(2), None);
        assert_eq!(map.decode(UNSEEN), None);
    }

    #[test]
    fn test_serde_preserves_ids() {
        let map = CategoryMap::build(["z", "y", "x"]);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"["z","y","x"]"#);

        let restored: CategoryMap = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, map);
        assert_eq!(restored.encode("x"), 2);
    }
}
