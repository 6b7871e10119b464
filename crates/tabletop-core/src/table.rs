//! The step-table shape: ordered headings, ordered rows of string cells.
//!
//! This is the wire format between Gherkin and the resolution engine,
//! and also the rendering target for failure reports.

use crate::error::{Result, TabletopError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An ordered table of string cells. A `None` cell means "absent", which
/// the coercer treats the same as an empty cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTable {
    headings: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl StepTable {
    pub fn new(headings: Vec<String>) -> Self {
        Self {
            headings,
            rows: Vec::new(),
        }
    }

    /// Build from raw Gherkin rows, the first row being the headings.
    pub fn from_rows(rows: &[Vec<String>]) -> Result<Self> {
        let mut iter = rows.iter();
        let headings = iter
            .next()
            .ok_or_else(|| TabletopError::InvalidTable {
                reason: "table has no heading row".to_string(),
            })?
            .clone();
        let mut table = Self::new(headings);
        for row in iter {
            table.push_row(row.iter().cloned().map(Some).collect())?;
        }
        Ok(table)
    }

    pub fn push_row(&mut self, cells: Vec<Option<String>>) -> Result<()> {
        if cells.len() != self.headings.len() {
            return Err(TabletopError::InvalidTable {
                reason: format!(
                    "row has {} cells but the table has {} headings",
                    cells.len(),
                    self.headings.len()
                ),
            });
        }
        self.rows.push(cells);
        Ok(())
    }

    pub fn headings(&self) -> &[String] {
        &self.headings
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn cell(&self, row: usize, heading: &str) -> Option<&str> {
        let col = self.headings.iter().position(|h| h == heading)?;
        self.rows.get(row)?.get(col)?.as_deref()
    }

    pub fn rows(&self) -> impl Iterator<Item = RowView<'_>> {
        (0..self.rows.len()).map(move |index| RowView { table: self, index })
    }
}

/// A borrowed view over one table row, addressed by heading.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    table: &'a StepTable,
    index: usize,
}

impl<'a> RowView<'a> {
    pub fn get(&self, heading: &str) -> Option<&'a str> {
        self.table.cell(self.index, heading)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// The row as a heading-to-cell map, absent cells omitted.
    pub fn as_map(&self) -> BTreeMap<String, String> {
        self.table
            .headings
            .iter()
            .filter_map(|h| self.get(h).map(|cell| (h.clone(), cell.to_string())))
            .collect()
    }
}

/// Render heading-keyed string rows as a plain-text table for failure
/// messages, padded to column width:
///
/// ```text
/// | nk | name       |
/// | S1 | John Smith |
/// ```
pub fn pretty_table(headings: &[String], rows: &[BTreeMap<String, String>]) -> String {
    let mut widths: Vec<usize> = headings.iter().map(String::len).collect();
    for row in rows {
        for (i, heading) in headings.iter().enumerate() {
            if let Some(cell) = row.get(heading) {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let mut out = String::new();
    let mut write_row = |cells: Vec<&str>| {
        out.push('|');
        for (i, cell) in cells.iter().enumerate() {
            out.push_str(&format!(" {:<width$} |", cell, width = widths[i]));
        }
        out.push('\n');
    };

    write_row(headings.iter().map(String::as_str).collect());
    for row in rows {
        write_row(
            headings
                .iter()
                .map(|h| row.get(h).map_or("", String::as_str))
                .collect(),
        );
    }
    out
}
