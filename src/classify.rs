//! Dimension/fact tagging of warehouse columns.
//!
//! Classification is a pure function of a table's column catalog. [`KeywordClassifier`] matches
//! column names against fixed keyword lists; other strategies can be plugged in through
//! [`ColumnClassifier`].

use std::collections::BTreeMap;

use crate::warehouse::CatalogColumn;

/// Substrings that mark a dimension column (checked first).
pub const DIMENSION_KEYWORDS: [&str; 5] = ["name", "desc", "category", "type", "date"];

/// Substrings that mark a fact column.
pub const FACT_KEYWORDS: [&str; 5] = ["amount", "price", "quantity", "count", "total"];

/// Role of a classified column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ColumnRole {
    Dimension,
    Fact,
}

/// Classification of one table. Unclassified columns are absent from `columns`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Classification {
    pub table: String,
    pub columns: BTreeMap<String, ColumnRole>,
    /// Reserved for foreign-key inference; always empty.
    pub relationships: Vec<String>,
}

impl Classification {
    pub fn dimensions(&self) -> impl Iterator<Item = &str> {
        self.with_role(ColumnRole::Dimension)
    }

    pub fn facts(&self) -> impl Iterator<Item = &str> {
        self.with_role(ColumnRole::Fact)
    }

    fn with_role(&self, role: ColumnRole) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter(move |(_, r)| **r == role)
            .map(|(name, _)| name.as_str())
    }
}

/// Strategy turning a column catalog into a [`Classification`].
pub trait ColumnClassifier: Send + Sync {
    fn classify(&self, table: &str, columns: &[CatalogColumn]) -> Classification;
}

/// Case-insensitive substring matching against [`DIMENSION_KEYWORDS`] and [`FACT_KEYWORDS`].
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    /// Role for a single column name.
    pub fn role_of(name: &str) -> Option<ColumnRole> {
        let lower = name.to_lowercase();
        if DIMENSION_KEYWORDS.iter().any(|k| lower.contains(k)) {
            Some(ColumnRole::Dimension)
        } else if FACT_KEYWORDS.iter().any(|k| lower.contains(k)) {
            Some(ColumnRole::Fact)
        } else {
            None
        }
    }
}

impl ColumnClassifier for KeywordClassifier {
    fn classify(&self, table: &str, columns: &[CatalogColumn]) -> Classification {
        Classification {
            table: table.to_string(),
            columns: columns
                .iter()
                .filter_map(|c| Self::role_of(&c.name).map(|role| (c.name.clone(), role)))
                .collect(),
            relationships: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(names: &[&str]) -> Vec<CatalogColumn> {
        names.iter().map(|n| CatalogColumn::new(*n, "text")).collect()
    }

    #[test]
    fn classifies_example_columns() {
        let c = KeywordClassifier.classify(
            "orders",
            &catalog(&["customer_name", "total_amount", "order_date", "id"]),
        );
        assert_eq!(c.dimensions().collect::<Vec<_>>(), vec!["customer_name", "order_date"]);
        assert_eq!(c.facts().collect::<Vec<_>>(), vec!["total_amount"]);
        assert!(!c.columns.contains_key("id"));
        assert!(c.relationships.is_empty());
    }

    #[test]
    fn matching_is_case_insensitive_and_dimension_first() {
        assert_eq!(KeywordClassifier::role_of("UnitPrice"), Some(ColumnRole::Fact));
        assert_eq!(KeywordClassifier::role_of("PRODUCT_TYPE"), Some(ColumnRole::Dimension));
        // both lists match; dimension wins
        assert_eq!(KeywordClassifier::role_of("count_by_date"), Some(ColumnRole::Dimension));
        assert_eq!(KeywordClassifier::role_of("region"), None);
    }

    #[test]
    fn declared_type_does_not_matter() {
        let a = KeywordClassifier.classify("t", &[CatalogColumn::new("price", "numeric")]);
        let b = KeywordClassifier.classify("t", &[CatalogColumn::new("price", "text")]);
        assert_eq!(a, b);
    }
}
