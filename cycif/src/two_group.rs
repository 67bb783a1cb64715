//! Part 7a driver: two-group rank-sum comparisons per tissue metric, with
//! bar plots and a consolidated results table.

use crate::config::AnalysisConfig;
use anyhow::{Context, Result};
use group_stats::metrics::MetricsTable;
use group_stats::{describe, rank_sum_test, significance_stars};
use log::{info, warn};
use pipeline_types::AnalysisError;
use serde::Serialize;
use std::fs;

#[derive(Debug, Serialize)]
struct ResultRow {
    tissue: String,
    metric: String,
    u_statistic: f64,
    p_value: f64,
    significance: &'static str,
    group_a: String,
    n_a: usize,
    mean_a: f64,
    sem_a: Option<f64>,
    group_b: String,
    n_b: usize,
    mean_b: f64,
    sem_b: Option<f64>,
}

pub fn run(config: &AnalysisConfig) -> Result<()> {
    let two = config.two_group.as_ref().ok_or_else(|| {
        AnalysisError::Configuration(
            "two-group comparison requires a [two_group] config section".to_string(),
        )
    })?;

    let out_dir = config.output_dir.join("statistics_2groups");
    let csv_dir = out_dir.join("CSV");
    let png_dir = out_dir.join("PNG");
    let svg_dir = out_dir.join("SVG");
    for dir in [&csv_dir, &png_dir, &svg_dir] {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let mut rows = Vec::new();
    for tissue in &config.tissues {
        let table = MetricsTable::read(&tissue.metrics_csv)
            .with_context(|| format!("tissue {}", tissue.name))?;
        for subset in &two.subsets {
            for normalization in &two.normalizations {
                let metric = format!("{subset}_{normalization}");
                if !table.has_metric(&metric) {
                    continue;
                }
                let a = table
                    .group_values(&metric, &two.group_a, &config.excluded_samples)
                    .unwrap_or_default();
                let b = table
                    .group_values(&metric, &two.group_b, &config.excluded_samples)
                    .unwrap_or_default();
                if a.is_empty() || b.is_empty() {
                    warn!("{}: {metric}: a group has no data, skipped", tissue.name);
                    continue;
                }
                let test = match rank_sum_test(&a, &b) {
                    Ok(test) => test,
                    Err(e) => {
                        warn!("{}: {metric}: {e}", tissue.name);
                        continue;
                    }
                };

                let stem = format!("{}_{metric}", tissue.name);
                stat_plots::two_group_bar(
                    &png_dir.join(format!("{stem}.png")),
                    &svg_dir.join(format!("{stem}.svg")),
                    &tissue.name,
                    &metric,
                    (&two.group_a, &a),
                    (&two.group_b, &b),
                    test.p_value,
                )
                .with_context(|| format!("plotting {stem}"))?;

                let desc_a = describe(&a).context("first group descriptives")?;
                let desc_b = describe(&b).context("second group descriptives")?;
                rows.push(ResultRow {
                    tissue: tissue.name.clone(),
                    metric,
                    u_statistic: test.u_statistic,
                    p_value: test.p_value,
                    significance: significance_stars(test.p_value),
                    group_a: two.group_a.clone(),
                    n_a: desc_a.n,
                    mean_a: desc_a.mean,
                    sem_a: desc_a.sem,
                    group_b: two.group_b.clone(),
                    n_b: desc_b.n,
                    mean_b: desc_b.mean,
                    sem_b: desc_b.sem,
                });
            }
        }
    }

    if rows.is_empty() {
        warn!("no metric produced a two-group comparison");
    }
    let results_path = csv_dir.join("statistical_results.csv");
    // Header written explicitly so the results file carries its columns even
    // when no comparison ran.
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(&results_path)
        .with_context(|| format!("cannot write {}", results_path.display()))?;
    writer.write_record([
        "tissue",
        "metric",
        "u_statistic",
        "p_value",
        "significance",
        "group_a",
        "n_a",
        "mean_a",
        "sem_a",
        "group_b",
        "n_b",
        "mean_b",
        "sem_b",
    ])?;
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!(
        "two-group comparison: {} results written to {}",
        rows.len(),
        results_path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TissueConfig, TwoGroupConfig};
    use std::path::Path;

    fn test_config(base: &Path) -> AnalysisConfig {
        AnalysisConfig {
            base_dir: base.to_path_buf(),
            output_dir: base.join("analysis"),
            groups_file: base.join("group_assignments.csv"),
            pixel_size_um: 0.325,
            buffer_distance_px: 31.0,
            x_column: "X_centroid".to_string(),
            y_column: "Y_centroid".to_string(),
            excluded_samples: vec![],
            cells_pattern: "{sample}/cells.csv".to_string(),
            crypts_pattern: "{sample}/crypts.geojson".to_string(),
            tissues: vec![TissueConfig {
                name: "Crypt_IEL".to_string(),
                metrics_csv: base.join("metrics.csv"),
            }],
            two_group: Some(TwoGroupConfig {
                group_a: "GROUP_A".to_string(),
                group_b: "GROUP_B".to_string(),
                subsets: vec!["Treg".to_string(), "CD8_T".to_string()],
                normalizations: vec!["per_CD45".to_string()],
            }),
            multi_group: None,
        }
    }

    #[test]
    fn compares_present_metrics_and_writes_results() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        // CD8_T_per_CD45 is configured but absent from the table; only the
        // Treg metric should be compared.
        fs::write(
            base.join("metrics.csv"),
            "sample,group,Treg_per_CD45\n\
             S1,GROUP_A,1.0\nS2,GROUP_A,2.0\nS3,GROUP_A,3.0\n\
             S4,GROUP_B,4.0\nS5,GROUP_B,5.0\nS6,GROUP_B,6.0\n",
        )
        .unwrap();

        let config = test_config(base);
        run(&config).unwrap();

        let out = config.output_dir.join("statistics_2groups");
        let results = fs::read_to_string(out.join("CSV/statistical_results.csv")).unwrap();
        let mut lines = results.lines();
        assert_eq!(
            lines.next().unwrap(),
            "tissue,metric,u_statistic,p_value,significance,\
             group_a,n_a,mean_a,sem_a,group_b,n_b,mean_b,sem_b"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("Crypt_IEL,Treg_per_CD45,0.0,"));
        assert!(row.contains(",ns,GROUP_A,3,2.0,"));
        assert!(lines.next().is_none());
        assert!(out.join("PNG/Crypt_IEL_Treg_per_CD45.png").exists());
        assert!(out.join("SVG/Crypt_IEL_Treg_per_CD45.svg").exists());
    }

    #[test]
    fn results_file_keeps_header_when_no_metric_is_present() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        // None of the configured subset metrics exist in the table.
        fs::write(
            base.join("metrics.csv"),
            "sample,group,CD45_per_mm2\nS1,GROUP_A,100.0\nS2,GROUP_B,200.0\n",
        )
        .unwrap();

        let config = test_config(base);
        run(&config).unwrap();

        let results = fs::read_to_string(
            config
                .output_dir
                .join("statistics_2groups/CSV/statistical_results.csv"),
        )
        .unwrap();
        let mut lines = results.lines();
        assert_eq!(
            lines.next().unwrap(),
            "tissue,metric,u_statistic,p_value,significance,\
             group_a,n_a,mean_a,sem_a,group_b,n_b,mean_b,sem_b"
        );
        assert!(lines.next().is_none());
    }

    #[test]
    fn missing_two_group_section_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.two_group = None;
        assert!(run(&config).is_err());
    }
}
