//! Shared types for the CyCIF spatial analysis pipeline: the error taxonomy
//! and the compartment assignment value carried from the assigner to the
//! table writer.
#![deny(missing_docs)]

use thiserror::Error;

/// Errors produced across the pipeline crates.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Malformed geometry documents, missing required columns, or
    /// unparseable numeric fields.
    #[error("data format error: {0}")]
    DataFormat(String),
    /// A required external file is missing or a configured value is unusable.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Degenerate but reportable situations: no compartments, no cells,
    /// not enough groups to test.
    #[error("empty result: {0}")]
    EmptyResult(String),
}

/// Index value written to flat files for cells assigned to no compartment.
pub const UNASSIGNED_INDEX: i64 = -1;

/// Outcome of assigning one cell to a compartment.
///
/// Unassigned cells are an explicit variant rather than empty-string/-1
/// in-memory sentinels; the flat-file sentinel only appears at the CSV
/// boundary (see [`Assignment::id_field`] and friends).
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    /// The cell belongs to a compartment.
    Assigned {
        /// Compartment identifier (external feature id or synthesized).
        id: String,
        /// Human-readable compartment name.
        name: String,
        /// Position of the compartment in the loaded sequence.
        index: usize,
        /// Distance to the compartment's true (unbuffered) boundary,
        /// 0 for cells inside the polygon itself.
        distance: f64,
    },
    /// The cell lies in no compartment (nor any buffered capture zone).
    Unassigned,
}

impl Assignment {
    /// Whether this cell was assigned to a compartment.
    pub fn is_assigned(&self) -> bool {
        matches!(self, Assignment::Assigned { .. })
    }

    /// Distance to the assigned compartment's true boundary; infinity when
    /// unassigned, mirroring how the buffered policy compares candidates.
    pub fn distance(&self) -> f64 {
        match self {
            Assignment::Assigned { distance, .. } => *distance,
            Assignment::Unassigned => f64::INFINITY,
        }
    }

    /// `crypt_id` column value for flat-file output.
    pub fn id_field(&self) -> &str {
        match self {
            Assignment::Assigned { id, .. } => id,
            Assignment::Unassigned => "",
        }
    }

    /// `crypt_name` column value for flat-file output.
    pub fn name_field(&self) -> &str {
        match self {
            Assignment::Assigned { name, .. } => name,
            Assignment::Unassigned => "",
        }
    }

    /// `crypt_index` column value for flat-file output.
    pub fn index_field(&self) -> i64 {
        match self {
            Assignment::Assigned { index, .. } => *index as i64,
            Assignment::Unassigned => UNASSIGNED_INDEX,
        }
    }
}
