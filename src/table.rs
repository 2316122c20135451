//! The canonical table schema: the single contract between structuring and
//! export.
//!
//! Every downstream consumer (spreadsheet, paginated, flow encoders) receives
//! a [`TableSet`] that has already been validated and repaired once, at
//! construction — consumers never re-validate.
//!
//! Wire shape (what the AI is asked to return and what the exporters read):
//!
//! ```json
//! {"tables": [{"name": "main", "headers": ["Date", "Amount"], "rows": [["2024-01-01", "100"]]}]}
//! ```

use serde::{Deserialize, Serialize};

/// One named table with ordered headers and rows.
///
/// Invariant: when `headers` is non-empty, every row has exactly
/// `headers.len()` cells. [`StructuredTable::new`] repairs violations by
/// truncating long rows and padding short ones with empty strings — rows are
/// never dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredTable {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl StructuredTable {
    /// Construct a table, repairing ragged rows against the header width.
    pub fn new(
        name: impl Into<String>,
        headers: Vec<String>,
        mut rows: Vec<Vec<String>>,
    ) -> Self {
        let width = headers.len();
        if width > 0 {
            for row in &mut rows {
                if row.len() > width {
                    row.truncate(width);
                } else {
                    while row.len() < width {
                        row.push(String::new());
                    }
                }
            }
        }
        StructuredTable {
            name: name.into(),
            headers,
            rows,
        }
    }

    /// Number of columns: header width when present, else the widest row.
    pub fn column_count(&self) -> usize {
        if self.headers.is_empty() {
            self.rows.iter().map(Vec::len).max().unwrap_or(0)
        } else {
            self.headers.len()
        }
    }
}

/// Ordered collection of [`StructuredTable`]s.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableSet {
    pub tables: Vec<StructuredTable>,
}

impl TableSet {
    pub fn new(tables: Vec<StructuredTable>) -> Self {
        TableSet { tables }
    }

    /// Terminal fallback state: a single `main` table with one `text` column
    /// and no rows. Used when there is nothing at all to structure.
    pub fn empty_fallback() -> Self {
        TableSet {
            tables: vec![StructuredTable::new(
                "main",
                vec!["text".to_string()],
                Vec::new(),
            )],
        }
    }

    /// True when no table carries any rows.
    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(|t| t.rows.is_empty())
    }

    /// Total row count across all tables.
    pub fn row_count(&self) -> usize {
        self.tables.iter().map(|t| t.rows.len()).sum()
    }
}
