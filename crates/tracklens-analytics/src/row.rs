use tracklens_core::AnalyticsDateTime;

use crate::sort::SortValue;

/// One resolved value of one projected column.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Cell {
    /// Raw stored value; `None` when nothing was recorded.
    pub raw: Option<String>,
    /// Rendered value as it appears in the grid.
    pub display: String,
    pub sort: SortValue,
    /// The stage or enrollment instance behind this cell is missing.
    pub no_data: bool,
}

impl Cell {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn no_data() -> Self {
        Self {
            no_data: true,
            ..Self::default()
        }
    }
}

/// A tracked entity projected onto the planned columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub entity_uid: String,
    pub last_updated: AnalyticsDateTime,
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn cell(&self, column: usize) -> Option<&Cell> {
        self.cells.get(column)
    }
}
