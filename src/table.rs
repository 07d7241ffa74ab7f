//! In-memory CSV tables with header-aware access.

use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};
use indexmap::IndexSet;

use crate::errors::SyncError;
use crate::layout::ensure_parent_dir;
use crate::types::Cell;

/// Header row plus string cells, in file order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Create an empty table with `headers`.
    pub fn with_headers(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Read a CSV file. Short rows are padded to the header width.
    pub fn read(path: &Path) -> Result<Self, SyncError> {
        let mut reader = ReaderBuilder::new().flexible(true).from_path(path)?;
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut row: Vec<Cell> = record.iter().map(str::to_string).collect();
            row.resize(headers.len().max(row.len()), String::new());
            rows.push(row);
        }
        Ok(Self { headers, rows })
    }

    /// Write the table as CSV, creating the parent folder.
    pub fn write(&self, path: &Path) -> Result<(), SyncError> {
        ensure_parent_dir(path)?;
        let mut writer = WriterBuilder::new().flexible(true).from_path(path)?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Index of column `name`.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    /// Cell `name` of `row`, when both the column and the cell exist.
    pub fn cell<'a>(&self, row: &'a [Cell], name: &str) -> Option<&'a str> {
        self.column(name)
            .and_then(|idx| row.get(idx))
            .map(String::as_str)
    }

    /// Append a column filled by `value` for every row; returns its index.
    pub fn push_column(&mut self, name: &str, mut value: impl FnMut(&[Cell]) -> Cell) -> usize {
        for row in &mut self.rows {
            let cell = value(row);
            row.push(cell);
        }
        self.headers.push(name.to_string());
        self.headers.len() - 1
    }

    /// True when there are no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Concatenate tables with possibly different headers.
    ///
    /// The output header is the union of input headers in first-seen order;
    /// rows missing a column get an empty cell.
    pub fn concat(tables: Vec<Table>) -> Table {
        let mut headers: IndexSet<String> = IndexSet::new();
        for table in &tables {
            headers.extend(table.headers.iter().cloned());
        }
        let mut combined = Table::with_headers(headers.iter().cloned().collect());
        for table in tables {
            let positions: Vec<usize> = table
                .headers
                .iter()
                .filter_map(|header| headers.get_index_of(header))
                .collect();
            for row in table.rows {
                let mut aligned = vec![String::new(); headers.len()];
                for (value, position) in row.into_iter().zip(&positions) {
                    aligned[*position] = value;
                }
                combined.rows.push(aligned);
            }
        }
        combined
    }

    /// Drop rows equal to an earlier row, keeping first occurrences.
    pub fn dedup_rows(&mut self) {
        let mut seen: IndexSet<Vec<Cell>> = IndexSet::with_capacity(self.rows.len());
        self.rows.retain(|row| seen.insert(row.clone()));
    }
}
