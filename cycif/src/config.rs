//! TOML run configuration shared by the pipeline subcommands.

use anyhow::{Context, Result};
use pipeline_types::AnalysisError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Analysis distance conversion: microns per pixel of the CyCIF mosaic.
pub const DEFAULT_PIXEL_SIZE_UM: f64 = 0.325;

/// Default crypt buffer, chosen as ~10 um at the default pixel size.
pub const DEFAULT_BUFFER_DISTANCE_PX: f64 = 31.0;

fn default_pixel_size() -> f64 {
    DEFAULT_PIXEL_SIZE_UM
}

fn default_buffer_distance() -> f64 {
    DEFAULT_BUFFER_DISTANCE_PX
}

fn default_x_column() -> String {
    cell_table::DEFAULT_X_COLUMN.to_string()
}

fn default_y_column() -> String {
    cell_table::DEFAULT_Y_COLUMN.to_string()
}

fn default_cells_pattern() -> String {
    "{sample}/cells.csv".to_string()
}

fn default_crypts_pattern() -> String {
    "{sample}/crypts.geojson".to_string()
}

fn default_subsets() -> Vec<String> {
    [
        "Treg",
        "CD4_T",
        "CD8_T",
        "T_Cells",
        "B_Cells",
        "NK_Cells",
        "Macrophages",
        "DN_T",
        "DP_T",
        "Tissue_Resident_T",
    ]
    .map(str::to_string)
    .to_vec()
}

fn default_normalizations() -> Vec<String> {
    ["per_CD45", "per_Total", "per_100_Epi", "per_mm2"]
        .map(str::to_string)
        .to_vec()
}

fn default_key_metrics() -> Vec<String> {
    [
        "Treg_per_CD45",
        "CD4_T_per_CD45",
        "CD8_T_per_CD45",
        "T_Cells_per_CD45",
        "CD45_per_mm2",
        "Treg_per_CD4",
    ]
    .map(str::to_string)
    .to_vec()
}

/// One tissue compartment whose per-sample metrics table feeds the
/// statistics subcommands.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TissueConfig {
    /// Compartment name used in output file names and plot titles.
    pub name: String,
    /// Path to the metrics CSV (`sample`, `group`, metric columns).
    pub metrics_csv: PathBuf,
}

/// Configuration for the two-group comparison.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TwoGroupConfig {
    /// First group label, drawn on the left.
    pub group_a: String,
    /// Second group label, drawn on the right.
    pub group_b: String,
    /// Cell subsets to compare.
    #[serde(default = "default_subsets")]
    pub subsets: Vec<String>,
    /// Normalization suffixes; each subset/normalization pair names a
    /// metric column `{subset}_{normalization}`.
    #[serde(default = "default_normalizations")]
    pub normalizations: Vec<String>,
}

/// Configuration for the multi-group comparison.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MultiGroupConfig {
    /// Group labels in display order.
    pub groups: Vec<String>,
    /// Metric columns to test and plot.
    #[serde(default = "default_key_metrics")]
    pub key_metrics: Vec<String>,
    /// Optional `#rrggbb` color per group; unlisted groups fall back to a
    /// fixed palette.
    #[serde(default)]
    pub colors: BTreeMap<String, String>,
}

/// Top-level run configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Directory holding per-sample inputs.
    pub base_dir: PathBuf,
    /// Directory all outputs are written under.
    pub output_dir: PathBuf,
    /// Path to the `sample,group` assignment CSV.
    pub groups_file: PathBuf,
    /// Microns per pixel, for crypt area conversion.
    #[serde(default = "default_pixel_size")]
    pub pixel_size_um: f64,
    /// Buffer distance in pixels for the buffered assignment policy.
    #[serde(default = "default_buffer_distance")]
    pub buffer_distance_px: f64,
    /// Column holding cell centroid x coordinates.
    #[serde(default = "default_x_column")]
    pub x_column: String,
    /// Column holding cell centroid y coordinates.
    #[serde(default = "default_y_column")]
    pub y_column: String,
    /// Samples dropped from every part of the analysis.
    #[serde(default)]
    pub excluded_samples: Vec<String>,
    /// Per-sample cell table path under `base_dir`; `{sample}` is replaced
    /// with the sample name.
    #[serde(default = "default_cells_pattern")]
    pub cells_pattern: String,
    /// Per-sample crypt GeoJSON path under `base_dir`.
    #[serde(default = "default_crypts_pattern")]
    pub crypts_pattern: String,
    /// Metrics tables for the statistics subcommands.
    #[serde(default)]
    pub tissues: Vec<TissueConfig>,
    /// Two-group comparison settings, required by `two-group`.
    #[serde(default)]
    pub two_group: Option<TwoGroupConfig>,
    /// Multi-group comparison settings, required by `multi-group`.
    #[serde(default)]
    pub multi_group: Option<MultiGroupConfig>,
}

impl AnalysisConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: AnalysisConfig = toml::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(self.pixel_size_um.is_finite() && self.pixel_size_um > 0.0) {
            return Err(AnalysisError::Configuration(format!(
                "pixel_size_um must be positive, got {}",
                self.pixel_size_um
            ))
            .into());
        }
        if !(self.buffer_distance_px.is_finite() && self.buffer_distance_px > 0.0) {
            return Err(AnalysisError::Configuration(format!(
                "buffer_distance_px must be positive, got {}",
                self.buffer_distance_px
            ))
            .into());
        }
        for pattern in [&self.cells_pattern, &self.crypts_pattern] {
            if !pattern.contains("{sample}") {
                return Err(AnalysisError::Configuration(format!(
                    "file pattern {pattern:?} lacks a {{sample}} placeholder"
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Cell table path for one sample.
    pub fn cells_path(&self, sample: &str) -> PathBuf {
        self.base_dir.join(self.cells_pattern.replace("{sample}", sample))
    }

    /// Crypt GeoJSON path for one sample.
    pub fn crypts_path(&self, sample: &str) -> PathBuf {
        self.base_dir.join(self.crypts_pattern.replace("{sample}", sample))
    }

    /// Whether a sample is excluded from the analysis.
    pub fn is_excluded(&self, sample: &str) -> bool {
        self.excluded_samples.iter().any(|s| s == sample)
    }
}
