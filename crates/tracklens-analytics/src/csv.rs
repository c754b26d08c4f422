//! CSV rendering of a [`Grid`] and the reverse parser.

use std::io::{Read, Write};

use crate::error::QueryError;
use crate::grid::Grid;

pub const CONTENT_TYPE: &str = "text/csv; charset=utf-8";

/// CSV writer configuration.
#[derive(Debug, Clone)]
pub struct CsvWriter {
    /// Field delimiter (default: comma).
    pub delimiter: u8,
    /// Quote character (default: double quote).
    pub quote: u8,
}

impl Default for CsvWriter {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
        }
    }
}

impl CsvWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Writes a header line of column display names, then every row.
    pub fn write(&self, grid: &Grid, output: &mut dyn Write) -> Result<(), QueryError> {
        let mut writer = ::csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .quote(self.quote)
            .has_headers(false)
            .from_writer(output);

        let headers: Vec<&str> = grid.headers.iter().map(|h| h.column.as_str()).collect();
        writer
            .write_record(&headers)
            .map_err(|e| QueryError::Output(e.to_string()))?;
        for row in &grid.rows {
            writer
                .write_record(row)
                .map_err(|e| QueryError::Output(e.to_string()))?;
        }
        writer
            .flush()
            .map_err(|e| QueryError::Output(e.to_string()))?;
        Ok(())
    }

    pub fn to_string(&self, grid: &Grid) -> Result<String, QueryError> {
        let mut buffer = Vec::new();
        self.write(grid, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| QueryError::Output(e.to_string()))
    }
}

/// A CSV grid read back: header names and row values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Parses CSV produced by [`CsvWriter`].
pub fn read_csv(input: impl Read, delimiter: u8) -> Result<CsvTable, QueryError> {
    let mut reader = ::csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(false)
        .from_reader(input);
    let headers = reader
        .headers()
        .map_err(|e| QueryError::Output(e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| QueryError::Output(e.to_string()))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(CsvTable { headers, rows })
}
