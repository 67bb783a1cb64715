//! Part 7b driver: Kruskal-Wallis comparisons across all groups per key
//! metric, with boxplots and a per-group summary table.

use crate::config::AnalysisConfig;
use anyhow::{Context, Result};
use group_stats::metrics::MetricsTable;
use group_stats::{describe, kruskal_wallis, significance_stars, Descriptives};
use log::{info, warn};
use pipeline_types::AnalysisError;
use stat_plots::{multi_group_box, parse_hex_color, RGBColor};
use std::fs;

/// Palette for groups without a configured color (green, red, blue).
const FALLBACK_COLORS: [RGBColor; 3] = [
    RGBColor(46, 204, 113),
    RGBColor(231, 76, 60),
    RGBColor(52, 152, 219),
];

fn optional_field(value: Option<f64>) -> String {
    value.map_or_else(String::new, |v| v.to_string())
}

pub fn run(config: &AnalysisConfig) -> Result<()> {
    let multi = config.multi_group.as_ref().ok_or_else(|| {
        AnalysisError::Configuration(
            "multi-group comparison requires a [multi_group] config section".to_string(),
        )
    })?;

    let out_dir = config.output_dir.join("statistics_multigroup");
    fs::create_dir_all(&out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    let summary_path = out_dir.join("statistics_summary.csv");
    let mut writer = csv::Writer::from_path(&summary_path)
        .with_context(|| format!("cannot write {}", summary_path.display()))?;
    let mut header = vec![
        "tissue".to_string(),
        "metric".to_string(),
        "h_statistic".to_string(),
        "p_value".to_string(),
        "significance".to_string(),
    ];
    for group in &multi.groups {
        header.extend([
            format!("{group}_n"),
            format!("{group}_mean"),
            format!("{group}_std"),
        ]);
    }
    writer.write_record(&header)?;

    let mut n_rows = 0usize;
    for tissue in &config.tissues {
        let table = MetricsTable::read(&tissue.metrics_csv)
            .with_context(|| format!("tissue {}", tissue.name))?;
        for metric in &multi.key_metrics {
            if !table.has_metric(metric) {
                continue;
            }

            // Groups with fewer than two observations are dropped from the
            // test and the plot; their summary columns stay empty.
            let mut group_data: Vec<(String, RGBColor, Vec<f64>)> = Vec::new();
            let mut stats: Vec<Option<Descriptives>> = Vec::new();
            for (i, group) in multi.groups.iter().enumerate() {
                let values = table
                    .group_values(metric, group, &config.excluded_samples)
                    .unwrap_or_default();
                if values.len() < 2 {
                    if !values.is_empty() {
                        warn!(
                            "{}: {metric}: group {group} has {} observation(s), dropped",
                            tissue.name,
                            values.len()
                        );
                    }
                    stats.push(None);
                    continue;
                }
                let fallback = FALLBACK_COLORS[i % FALLBACK_COLORS.len()];
                let color = multi
                    .colors
                    .get(group)
                    .map(|hex| parse_hex_color(hex))
                    .transpose()
                    .with_context(|| format!("color for group {group}"))?
                    .unwrap_or(fallback);
                stats.push(describe(&values));
                group_data.push((group.clone(), color, values));
            }
            if group_data.len() < 2 {
                warn!("{}: {metric}: fewer than two testable groups, skipped", tissue.name);
                continue;
            }

            let samples: Vec<&[f64]> = group_data.iter().map(|(_, _, v)| v.as_slice()).collect();
            let test = match kruskal_wallis(&samples) {
                Ok(test) => test,
                Err(e) => {
                    warn!("{}: {metric}: {e}", tissue.name);
                    continue;
                }
            };

            let png_path = out_dir.join(format!("{}_{metric}.png", tissue.name));
            multi_group_box(&png_path, &tissue.name, metric, &group_data, test.p_value)
                .with_context(|| format!("plotting {}", png_path.display()))?;

            let mut row = vec![
                tissue.name.clone(),
                metric.clone(),
                test.h_statistic.to_string(),
                test.p_value.to_string(),
                significance_stars(test.p_value).to_string(),
            ];
            for summary in &stats {
                match summary {
                    Some(d) => row.extend([
                        d.n.to_string(),
                        d.mean.to_string(),
                        optional_field(d.std_dev),
                    ]),
                    None => row.extend([String::new(), String::new(), String::new()]),
                }
            }
            writer.write_record(&row)?;
            n_rows += 1;
        }
    }
    writer.flush()?;

    if n_rows == 0 {
        warn!("no metric produced a multi-group comparison");
    }
    info!(
        "multi-group comparison: {n_rows} results written to {}",
        summary_path.display()
    );
    Ok(())
}
