//! Planned export output.

use serde::Serialize;

use crate::catalog::EntityType;

/// One named table: a header row plus data rows of rendered cells.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sheet {
    pub name: String,
    pub entity_type: EntityType,
    /// 1-based row the header is written at.
    pub start_row: usize,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Cells of the column headed `header`.
    pub fn column(&self, header: &str) -> Option<Vec<&str>> {
        let position = self.headers.iter().position(|h| h == header)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(position).map(String::as_str).unwrap_or(""))
                .collect(),
        )
    }
}

/// The sheets of one export, in request order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new(sheets: Vec<Sheet>) -> Self {
        Self { sheets }
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }
}

impl From<Sheet> for Workbook {
    fn from(sheet: Sheet) -> Self {
        Self::new(vec![sheet])
    }
}
