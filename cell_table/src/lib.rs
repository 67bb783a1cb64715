//! CSV cell tables: typed access to the segmentation centroids plus opaque
//! passthrough of every measurement column, and writing of the augmented
//! table after compartment assignment.
//!
//! Every output row is traceable to exactly one input row; unassigned cells
//! are written with the flat-file sentinel (empty id and name, index -1)
//! rather than being dropped.
#![deny(missing_docs)]

use csv::StringRecord;
use geo_types::{point, Point};
use pipeline_types::{AnalysisError, Assignment};
use std::path::Path;

/// Default name of the x centroid column.
pub const DEFAULT_X_COLUMN: &str = "X_centroid";
/// Default name of the y centroid column.
pub const DEFAULT_Y_COLUMN: &str = "Y_centroid";

/// Compartment id column appended on output.
pub const CRYPT_ID_COLUMN: &str = "crypt_id";
/// Compartment name column appended on output.
pub const CRYPT_NAME_COLUMN: &str = "crypt_name";
/// Compartment index column appended on output.
pub const CRYPT_INDEX_COLUMN: &str = "crypt_index";

/// A loaded cell table: parsed centroids plus the untouched source records.
#[derive(Debug, Clone)]
pub struct CellTable {
    headers: StringRecord,
    records: Vec<StringRecord>,
    points: Vec<Point<f64>>,
}

fn column_index(headers: &StringRecord, name: &str) -> Result<usize, AnalysisError> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| AnalysisError::DataFormat(format!("missing required column {name:?}")))
}

fn parse_coordinate(record: &StringRecord, col: usize, row: usize) -> Result<f64, AnalysisError> {
    let field = record.get(col).ok_or_else(|| {
        AnalysisError::DataFormat(format!("row {row}: short record, no field {col}"))
    })?;
    field.trim().parse().map_err(|_| {
        AnalysisError::DataFormat(format!("row {row}: cannot parse coordinate {field:?}"))
    })
}

impl CellTable {
    /// Read a cell table, extracting the two centroid columns and carrying
    /// every other column through untouched. A missing file is a
    /// configuration error; missing columns or unparseable coordinates are
    /// data format errors.
    pub fn read(path: &Path, x_col: &str, y_col: &str) -> Result<Self, AnalysisError> {
        let mut reader = csv::ReaderBuilder::new().from_path(path).map_err(|e| {
            AnalysisError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let headers = reader
            .headers()
            .map_err(|e| AnalysisError::DataFormat(format!("bad header row: {e}")))?
            .clone();
        let x_idx = column_index(&headers, x_col)?;
        let y_idx = column_index(&headers, y_col)?;

        let mut records = Vec::new();
        let mut points = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record =
                record.map_err(|e| AnalysisError::DataFormat(format!("row {row}: {e}")))?;
            let x = parse_coordinate(&record, x_idx, row)?;
            let y = parse_coordinate(&record, y_idx, row)?;
            points.push(point!(x: x, y: y));
            records.push(record);
        }
        Ok(CellTable {
            headers,
            records,
            points,
        })
    }

    /// Number of cells (rows).
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table has no cells.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Cell centroids, in row order.
    pub fn points(&self) -> &[Point<f64>] {
        &self.points
    }

    /// Source column names.
    pub fn headers(&self) -> &StringRecord {
        &self.headers
    }

    /// Write the table with `crypt_id`, `crypt_name` and `crypt_index`
    /// appended. `assignments` must have one entry per row. The internal
    /// `distance_to_crypt` value never reaches the output.
    pub fn write_with_assignments(
        &self,
        path: &Path,
        assignments: &[Assignment],
    ) -> Result<(), AnalysisError> {
        if assignments.len() != self.records.len() {
            return Err(AnalysisError::DataFormat(format!(
                "{} assignments for {} rows",
                assignments.len(),
                self.records.len()
            )));
        }
        let mut writer = csv::Writer::from_path(path).map_err(|e| {
            AnalysisError::Configuration(format!("cannot write {}: {e}", path.display()))
        })?;
        let write_err =
            |e: csv::Error| AnalysisError::Configuration(format!("write {}: {e}", path.display()));

        writer
            .write_record(self.headers.iter().chain([
                CRYPT_ID_COLUMN,
                CRYPT_NAME_COLUMN,
                CRYPT_INDEX_COLUMN,
            ]))
            .map_err(write_err)?;
        for (record, assignment) in self.records.iter().zip(assignments) {
            let index_field = assignment.index_field().to_string();
            writer
                .write_record(record.iter().chain([
                    assignment.id_field(),
                    assignment.name_field(),
                    index_field.as_str(),
                ]))
                .map_err(write_err)?;
        }
        writer.flush().map_err(|e| {
            AnalysisError::Configuration(format!("write {}: {e}", path.display()))
        })?;
        Ok(())
    }
}
