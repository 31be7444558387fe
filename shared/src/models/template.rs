//! Fixed-layout stock template: product names, abbreviations and row positions

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::CellValue;
use crate::validation::normalize_name;

/// The three identifying cells of one template row
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TemplateRow {
    /// 1-based sheet row
    pub row: u32,
    pub date: CellValue,
    pub full_name: CellValue,
    pub abbreviation: CellValue,
}

/// Full product name to template abbreviation, exact and normalized
#[derive(Debug, Clone, Default)]
pub struct ProductIndex {
    exact: HashMap<String, String>,
    normalized: HashMap<String, String>,
}

impl ProductIndex {
    pub fn insert(&mut self, full_name: &str, abbreviation: &str) {
        self.exact
            .insert(full_name.trim().to_uppercase(), abbreviation.to_string());
        let normalized = normalize_name(full_name);
        if !normalized.is_empty() {
            self.normalized.insert(normalized, abbreviation.to_string());
        }
    }

    /// Template abbreviation for a report's good name.
    ///
    /// Tries the trimmed, uppercased name first and falls back to the
    /// normalized form, which tolerates spacing and plural-`S` differences.
    pub fn resolve(&self, good_name: &str) -> Option<&str> {
        let key = good_name.trim().to_uppercase();
        if let Some(abbreviation) = self.exact.get(&key) {
            return Some(abbreviation);
        }
        let normalized = normalize_name(&key);
        if normalized.is_empty() {
            return None;
        }
        self.normalized.get(&normalized).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty()
    }
}

/// Where each `(date, abbreviation)` lives in the template.
///
/// Built by scanning top to bottom. A date cell applies to its row and every
/// following row until the next non-blank date cell; a non-blank cell that is
/// not a date (a header, a section title) clears the current date.
#[derive(Debug, Clone, Default)]
pub struct TemplateIndex {
    rows: HashMap<(NaiveDate, String), u32>,
    products: ProductIndex,
    first_date: Option<NaiveDate>,
}

impl TemplateIndex {
    pub fn from_rows(rows: &[TemplateRow]) -> Self {
        let mut index = TemplateIndex::default();
        let mut current_date: Option<NaiveDate> = None;

        for row in rows {
            let abbreviation = row.abbreviation.as_text().trim().to_string();

            if !row.full_name.is_blank() && !abbreviation.is_empty() {
                index
                    .products
                    .insert(&row.full_name.as_text(), &abbreviation);
            }

            if !row.date.is_blank() {
                current_date = row.date.as_template_date();
            }

            if let Some(date) = current_date {
                if !abbreviation.is_empty() {
                    // Later rows win when a key repeats
                    index.rows.insert((date, abbreviation), row.row);
                }
            }
        }

        index.first_date = index.rows.keys().map(|(date, _)| *date).min();
        index
    }

    pub fn row_for(&self, date: NaiveDate, abbreviation: &str) -> Option<u32> {
        self.rows.get(&(date, abbreviation.to_string())).copied()
    }

    /// Earliest date that keys any template row
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.first_date
    }

    pub fn products(&self) -> &ProductIndex {
        &self.products
    }

    pub fn key_count(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(n: u32, date: CellValue, name: &str, abr: &str) -> TemplateRow {
        TemplateRow {
            row: n,
            date,
            full_name: CellValue::Text(name.to_string()),
            abbreviation: CellValue::Text(abr.to_string()),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_sticky_date_carries_forward() {
        let index = TemplateIndex::from_rows(&[
            row(2, CellValue::Number(45292.0), "Apple Box", "AB1"),
            row(3, CellValue::Empty, "Berry Bag", "BB2"),
            row(4, CellValue::Number(45296.0), "Apple Box", "AB1"),
            row(5, CellValue::Empty, "Berry Bag", "BB2"),
        ]);
        assert_eq!(index.row_for(date(2024, 1, 1), "BB2"), Some(3));
        assert_eq!(index.row_for(date(2024, 1, 5), "BB2"), Some(5));
        assert_eq!(index.first_date(), Some(date(2024, 1, 1)));
        assert_eq!(index.key_count(), 4);
    }

    #[test]
    fn test_text_in_date_column_clears_date() {
        let index = TemplateIndex::from_rows(&[
            row(1, CellValue::Text("DATE".into()), "PRODUCT", "ABR"),
            row(2, CellValue::Empty, "Apple Box", "AB1"),
        ]);
        assert_eq!(index.key_count(), 0);
        // the header row still feeds the name index
        assert_eq!(index.products().resolve("product"), Some("ABR"));
    }

    #[test]
    fn test_resolve_exact_then_normalized() {
        let mut products = ProductIndex::default();
        products.insert("Apple Boxes", "AB1");
        assert_eq!(products.resolve("  apple boxes "), Some("AB1"));
        assert_eq!(products.resolve("APPLE BOXE"), Some("AB1"));
        assert_eq!(products.resolve("Apple Box"), None);
        assert_eq!(products.resolve(""), None);
    }

    #[test]
    fn test_rows_without_names_are_not_indexed() {
        let index = TemplateIndex::from_rows(&[TemplateRow {
            row: 2,
            date: CellValue::Number(45292.0),
            full_name: CellValue::Empty,
            abbreviation: CellValue::Text("AB1".into()),
        }]);
        assert!(index.products().is_empty());
        assert_eq!(index.row_for(date(2024, 1, 1), "AB1"), Some(2));
    }
}
