use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use rust_xlsxwriter::{Workbook, Worksheet};

/// Excel caps worksheet names at 31 characters.
const MAX_SHEET_NAME: usize = 31;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Integer(i64),
}

impl Cell {
    pub fn text(value: Option<&str>) -> Self {
        match value {
            Some(v) => Cell::Text(v.to_string()),
            None => Cell::Empty,
        }
    }

    pub fn number(value: Option<f64>) -> Self {
        match value {
            Some(v) if v.is_finite() => Cell::Number(v),
            _ => Cell::Empty,
        }
    }

    pub fn integer(value: Option<i64>) -> Self {
        value.map(Cell::Integer).unwrap_or(Cell::Empty)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            Cell::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }
}

/// A named table: ordered columns and rows of cells in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Cell>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&Cell> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }
}

pub trait TableSink {
    fn publish(&mut self, table: &Table) -> Result<()>;

    /// Flush everything published so far.
    fn finish(&mut self) -> Result<()>;
}

/// Writes every published table to its own worksheet of one workbook.
pub struct XlsxSink {
    path: PathBuf,
    workbook: Workbook,
    sheets: usize,
}

impl XlsxSink {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            workbook: Workbook::new(),
            sheets: 0,
        }
    }
}

impl TableSink for XlsxSink {
    fn publish(&mut self, table: &Table) -> Result<()> {
        let sheet = self.workbook.add_worksheet();
        sheet
            .set_name(sheet_name(&table.name))
            .with_context(|| format!("invalid sheet name {:?}", table.name))?;
        write_table(sheet, table)?;
        self.sheets += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.sheets == 0 {
            return Err(anyhow!("no tables published"));
        }
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).ok();
        }
        self.workbook
            .save(&self.path)
            .with_context(|| format!("failed writing workbook to {}", self.path.display()))?;
        Ok(())
    }
}

fn sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|ch| match ch {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => ' ',
            other => other,
        })
        .collect();
    cleaned.trim().chars().take(MAX_SHEET_NAME).collect()
}

fn write_table(worksheet: &mut Worksheet, table: &Table) -> Result<()> {
    for (col_idx, name) in table.columns.iter().enumerate() {
        worksheet
            .write_string(0, col_idx as u16, name)
            .with_context(|| format!("write header ({col_idx})"))?;
    }
    for (row_idx, row) in table.rows.iter().enumerate() {
        let r = (row_idx + 1) as u32;
        for (col_idx, value) in row.iter().enumerate() {
            let c = col_idx as u16;
            match value {
                Cell::Empty => continue,
                Cell::Text(v) => worksheet.write_string(r, c, v),
                Cell::Number(v) => worksheet.write_number(r, c, *v),
                Cell::Integer(v) => worksheet.write_number(r, c, *v as f64),
            }
            .with_context(|| format!("write cell ({r},{c})"))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sheet_names_are_sanitized_and_truncated() {
        assert_eq!(sheet_name("PP/UD: matched"), "PP UD  matched");
        assert_eq!(sheet_name(&"x".repeat(40)).len(), 31);
    }

    #[test]
    fn cells_drop_non_finite_numbers() {
        assert_eq!(Cell::number(Some(f64::NAN)), Cell::Empty);
        assert_eq!(Cell::number(Some(1.5)), Cell::Number(1.5));
        assert_eq!(Cell::text(None), Cell::Empty);
    }

    #[test]
    fn table_cell_lookup_by_column() {
        let mut t = Table::new("t", vec!["A".to_string(), "B".to_string()]);
        t.push_row(vec![Cell::Integer(1), Cell::Text("x".to_string())]);
        assert_eq!(t.cell(0, "B").and_then(Cell::as_text), Some("x"));
        assert_eq!(t.cell(0, "A").and_then(Cell::as_number), Some(1.0));
        assert!(t.cell(1, "A").is_none());
    }
}
