use std::path::Path;

use csv::StringRecord;
use tracing::debug;

use crate::error::{CleaningError, Result};

/// Cell values read as missing, matching the markers pandas' `read_csv`
/// treats as NA by default. The empty cell is handled separately.
const MISSING_MARKERS: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN", "<NA>",
    "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

fn is_missing(cell: &str) -> bool {
    cell.is_empty() || MISSING_MARKERS.contains(&cell)
}

/// A CSV table held as raw text cells.
///
/// Cells are never re-formatted, so columns the filters do not look at are
/// written back exactly as they were read.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<StringRecord>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<StringRecord>) -> Self {
        Self { headers, rows }
    }

    /// Load a comma-separated file with a header row.
    pub fn load_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();

        let rows = reader.records().collect::<std::result::Result<Vec<_>, _>>()?;
        debug!("Loaded {} rows x {} columns from {:?}", rows.len(), headers.len(), path);

        Ok(Self { headers, rows })
    }

    /// Write the table with its header row and no index column.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[StringRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| CleaningError::MissingColumn(name.to_string()))
    }

    /// Parse a column as `f64`. Empty cells and NA markers such as `NA`,
    /// `N/A` or `null` become NaN. Anything else that fails to parse is an
    /// error.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>> {
        let idx = self.column_index(name)?;
        self.rows
            .iter()
            .enumerate()
            .map(|(row, record)| {
                let cell = record.get(idx).unwrap_or("").trim();
                if is_missing(cell) {
                    return Ok(f64::NAN);
                }
                cell.parse::<f64>().map_err(|_| CleaningError::NonNumericCell {
                    row,
                    column: name.to_string(),
                    value: cell.to_string(),
                })
            })
            .collect()
    }

    /// Keep only the rows whose mask entry is true, preserving order.
    pub fn retain_mask(&mut self, mask: &[bool]) {
        debug_assert_eq!(mask.len(), self.rows.len());
        let mut keep = mask.iter();
        self.rows.retain(|_| keep.next().copied().unwrap_or(false));
    }
}
