//! Per-item override table loaded from delimited text.
//!
//! The first row is the header. One designated column (or the first column) holds the
//! item identity; every other column is a raw string override for that item. Parsing,
//! including quoted fields with embedded delimiters and newlines, is left to `csv`.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{BatchError, Result};

/// Column name → raw cell value for one table row.
pub type FieldMap = BTreeMap<String, String>;

/// Immutable identity → field map lookup, in file order.
#[derive(Debug, Clone, Default)]
pub struct OverrideTable {
    headers: Vec<String>,
    rows: Vec<(String, FieldMap)>,
}

/// How the table is read.
#[derive(Debug, Clone)]
pub struct TableOptions {
    pub delimiter: u8,
    pub identity_column: Option<String>,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            identity_column: None,
        }
    }
}

impl OverrideTable {
    pub fn load(path: &Path, opts: &TableOptions) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let table = Self::from_reader(file, opts)?;
        debug!(
            path = %path.display(),
            rows = table.len(),
            columns = table.headers.len(),
            "loaded override table"
        );
        Ok(table)
    }

    pub fn from_reader<R: Read>(reader: R, opts: &TableOptions) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(opts.delimiter)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
            return Err(BatchError::InvalidInput(
                "override table has no header row".into(),
            ));
        }

        let id_idx = match &opts.identity_column {
            Some(name) => headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(name.trim()))
                .ok_or_else(|| {
                    BatchError::InvalidInput(format!(
                        "identity column '{name}' not found in override table"
                    ))
                })?,
            None => 0,
        };

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let identity = record.get(id_idx).unwrap_or("").trim().to_string();
            if identity.is_empty() {
                continue;
            }
            let fields: FieldMap = headers
                .iter()
                .enumerate()
                .filter(|(i, h)| *i != id_idx && !h.is_empty())
                .filter_map(|(i, h)| record.get(i).map(|v| (h.clone(), v.to_string())))
                .collect();
            if rows.iter().any(|(id, _)| *id == identity) {
                warn!(identity = %identity, "duplicate override row ignored");
                continue;
            }
            rows.push((identity, fields));
        }

        Ok(Self { headers, rows })
    }

    /// Builds a table directly from rows; mostly useful for callers that already hold
    /// parsed data.
    pub fn from_rows<I, K>(headers: Vec<String>, rows: I) -> Self
    where
        I: IntoIterator<Item = (K, FieldMap)>,
        K: Into<String>,
    {
        Self {
            headers,
            rows: rows.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Every header seen in the file, identity column included.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Identity keys in file order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|(k, _)| k.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&FieldMap> {
        self.rows.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
