//! Product catalog — a flat name → unit-price table loaded from CSV.
//!
//! The catalog is read fresh at the start of each polling cycle and is
//! read-only for the rest of the run. Lookups are case-insensitive; when
//! two rows normalize to the same name the last row wins.

use std::collections::HashMap;
use std::path::Path;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::CatalogError;

/// One catalog row.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub unit_price: Decimal,
}

/// In-memory catalog with case-insensitive name lookup.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    index: HashMap<String, usize>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Load the catalog from a CSV file with the two named columns.
    ///
    /// Fails when the file is missing, a required column is absent, or a
    /// price cell does not parse as a decimal. Column matching on headers
    /// is case-insensitive, like the lookups.
    pub fn load(
        path: &Path,
        name_column: &str,
        price_column: &str,
    ) -> Result<Self, CatalogError> {
        if !path.exists() {
            return Err(CatalogError::NotFound(path.display().to_string()));
        }

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)?;

        let headers = reader.headers()?.clone();
        let name_idx = find_column(&headers, name_column)
            .ok_or_else(|| CatalogError::MissingColumn(name_column.to_string()))?;
        let price_idx = find_column(&headers, price_column)
            .ok_or_else(|| CatalogError::MissingColumn(price_column.to_string()))?;

        let mut catalog = Self::new();

        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let name = record.get(name_idx).unwrap_or("").to_string();
            if name.is_empty() {
                continue;
            }
            let raw_price = record.get(price_idx).unwrap_or("");
            let unit_price = parse_price(raw_price).ok_or_else(|| CatalogError::BadPrice {
                name: name.clone(),
                value: raw_price.to_string(),
                row: row + 1,
            })?;
            catalog.insert(CatalogEntry { name, unit_price });
        }

        tracing::debug!(entries = catalog.len(), path = %path.display(), "Catalog loaded");
        Ok(catalog)
    }

    /// Insert an entry; a later entry with the same normalized name wins.
    pub fn insert(&mut self, entry: CatalogEntry) {
        let key = normalize(&entry.name);
        match self.index.get(&key) {
            Some(&i) => self.entries[i] = entry,
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    /// Case-insensitive exact lookup.
    pub fn lookup(&self, name: &str) -> Option<Decimal> {
        self.index
            .get(&normalize(name))
            .map(|&i| self.entries[i].unit_price)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize the full table for the matcher request framing.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(&self.entries).unwrap_or_else(|_| "[]".to_string())
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

fn find_column(headers: &csv::StringRecord, wanted: &str) -> Option<usize> {
    headers.iter().position(|h| h.eq_ignore_ascii_case(wanted))
}

/// Parse a price cell, tolerating a leading currency symbol.
fn parse_price(raw: &str) -> Option<Decimal> {
    let cleaned = raw.trim().trim_start_matches('$').replace(',', "");
    cleaned.parse().ok()
}
