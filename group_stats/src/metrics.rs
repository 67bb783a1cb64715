//! Per-sample metrics tables consumed by the statistics parts: one row per
//! sample with its group label and an open-ended set of numeric metric
//! columns.

use csv::StringRecord;
use pipeline_types::AnalysisError;
use std::path::Path;

/// A loaded metrics table. Requires `sample` and `group` columns; metric
/// columns are looked up by name on demand so that configured metrics absent
/// from a study's panel are skipped rather than failing the run.
#[derive(Debug, Clone)]
pub struct MetricsTable {
    headers: StringRecord,
    sample_idx: usize,
    group_idx: usize,
    records: Vec<StringRecord>,
}

impl MetricsTable {
    /// Read a metrics CSV. A missing file is a configuration error; missing
    /// `sample`/`group` columns are a data format error.
    pub fn read(path: &Path) -> Result<Self, AnalysisError> {
        let mut reader = csv::ReaderBuilder::new().from_path(path).map_err(|e| {
            AnalysisError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let headers = reader
            .headers()
            .map_err(|e| AnalysisError::DataFormat(format!("bad header row: {e}")))?
            .clone();
        let required = |name: &str| {
            headers.iter().position(|h| h == name).ok_or_else(|| {
                AnalysisError::DataFormat(format!(
                    "{}: missing required column {name:?}",
                    path.display()
                ))
            })
        };
        let sample_idx = required("sample")?;
        let group_idx = required("group")?;
        let records = reader
            .records()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AnalysisError::DataFormat(format!("{}: {e}", path.display())))?;
        Ok(MetricsTable {
            headers,
            sample_idx,
            group_idx,
            records,
        })
    }

    /// Whether the table carries this metric column.
    pub fn has_metric(&self, metric: &str) -> bool {
        self.headers.iter().any(|h| h == metric)
    }

    /// The metric's values for one group, excluded samples and blank or
    /// non-numeric entries dropped. `None` when the column does not exist.
    pub fn group_values(&self, metric: &str, group: &str, excluded: &[String]) -> Option<Vec<f64>> {
        let col = self.headers.iter().position(|h| h == metric)?;
        Some(
            self.records
                .iter()
                .filter(|r| r.get(self.group_idx) == Some(group))
                .filter(|r| {
                    r.get(self.sample_idx)
                        .is_some_and(|s| !excluded.iter().any(|e| e == s))
                })
                .filter_map(|r| r.get(col).and_then(|f| f.trim().parse::<f64>().ok()))
                .filter(|v| v.is_finite())
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("metrics.csv");
        fs::write(
            &path,
            "sample,group,Treg_per_CD45,CD45_per_mm2\n\
             S1,GROUP_A,0.10,120.5\n\
             S2,GROUP_A,0.20,\n\
             S3,GROUP_B,0.30,95.0\n\
             S4,GROUP_B,not_a_number,80.0\n",
        )
        .unwrap();
        path
    }

    #[test]
    fn group_values_drop_blanks_and_non_numeric() {
        let dir = tempfile::tempdir().unwrap();
        let table = MetricsTable::read(&fixture(dir.path())).unwrap();
        assert!(table.has_metric("Treg_per_CD45"));
        assert!(!table.has_metric("Treg_per_CD4"));
        assert_eq!(
            table.group_values("Treg_per_CD45", "GROUP_A", &[]).unwrap(),
            vec![0.10, 0.20]
        );
        assert_eq!(
            table.group_values("Treg_per_CD45", "GROUP_B", &[]).unwrap(),
            vec![0.30]
        );
        assert_eq!(
            table.group_values("CD45_per_mm2", "GROUP_A", &[]).unwrap(),
            vec![120.5]
        );
        assert_eq!(table.group_values("missing", "GROUP_A", &[]), None);
    }

    #[test]
    fn excluded_samples_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let table = MetricsTable::read(&fixture(dir.path())).unwrap();
        let values = table
            .group_values("Treg_per_CD45", "GROUP_A", &["S1".to_string()])
            .unwrap();
        assert_eq!(values, vec![0.20]);
    }

    #[test]
    fn missing_group_column_is_data_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        fs::write(&path, "sample,Treg_per_CD45\nS1,0.1\n").unwrap();
        assert!(matches!(
            MetricsTable::read(&path),
            Err(AnalysisError::DataFormat(_))
        ));
    }
}
