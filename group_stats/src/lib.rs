//! Non-parametric group comparison for per-sample metrics.
//!
//! Two fixed tests, matching the pipeline's statistics parts: the two-sided
//! Wilcoxon rank-sum / Mann-Whitney U test (normal approximation with
//! average ranks, tie-corrected variance and continuity correction) for two
//! groups, and the tie-corrected Kruskal-Wallis test for more. No model
//! selection beyond these.
#![deny(missing_docs)]

pub mod metrics;

use pipeline_types::AnalysisError;
use serde::Deserialize;
use statrs::function::erf::erfc;
use statrs::function::gamma::gamma_ur;
use statrs::statistics::{Data, Distribution};
use std::f64::consts::SQRT_2;
use std::path::Path;

/// One row of the group assignment table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SampleGroup {
    /// Sample identifier.
    pub sample: String,
    /// Experimental group the sample belongs to.
    pub group: String,
}

/// Read the `sample,group` assignment table. A missing file is a
/// configuration error; missing columns are a data format error.
pub fn read_group_assignments(path: &Path) -> Result<Vec<SampleGroup>, AnalysisError> {
    let mut reader = csv::ReaderBuilder::new().from_path(path).map_err(|e| {
        AnalysisError::Configuration(format!("cannot read {}: {e}", path.display()))
    })?;
    reader
        .deserialize()
        .collect::<Result<Vec<SampleGroup>, _>>()
        .map_err(|e| AnalysisError::DataFormat(format!("{}: {e}", path.display())))
}

/// 1-based ranks with ties replaced by their average rank.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&i, &j| values[i].total_cmp(&values[j]));
    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // Tied run occupies ranks i+1..=j+1; all members get the midpoint.
        let rank = (i + j + 2) as f64 / 2.0;
        for &k in &order[i..=j] {
            ranks[k] = rank;
        }
        i = j + 1;
    }
    ranks
}

/// Sum of `t^3 - t` over tied runs, the shared tie-correction term.
fn tie_term(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mut term = 0.0;
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i;
        while j + 1 < sorted.len() && sorted[j + 1] == sorted[i] {
            j += 1;
        }
        let t = (j - i + 1) as f64;
        term += t.powi(3) - t;
        i = j + 1;
    }
    term
}

/// Result of the two-sided rank-sum test.
#[derive(Debug, Clone, PartialEq)]
pub struct RankSumTest {
    /// Mann-Whitney U statistic of the first sample.
    pub u_statistic: f64,
    /// Continuity-corrected standard normal deviate.
    pub z: f64,
    /// Two-sided p-value.
    pub p_value: f64,
}

/// Two-sided Mann-Whitney U / Wilcoxon rank-sum test between two samples,
/// using the normal approximation with tie-corrected variance and a 0.5
/// continuity correction.
pub fn rank_sum_test(a: &[f64], b: &[f64]) -> Result<RankSumTest, AnalysisError> {
    if a.is_empty() || b.is_empty() {
        return Err(AnalysisError::EmptyResult(
            "rank-sum test needs observations in both groups".to_string(),
        ));
    }
    let n1 = a.len() as f64;
    let n2 = b.len() as f64;
    let n = n1 + n2;

    let mut combined = Vec::with_capacity(a.len() + b.len());
    combined.extend_from_slice(a);
    combined.extend_from_slice(b);
    let ranks = average_ranks(&combined);
    let r1: f64 = ranks[..a.len()].iter().sum();

    let u_statistic = r1 - n1 * (n1 + 1.0) / 2.0;
    let mean_u = n1 * n2 / 2.0;
    let variance = n1 * n2 / 12.0 * ((n + 1.0) - tie_term(&combined) / (n * (n - 1.0)));
    if variance <= 0.0 {
        return Err(AnalysisError::EmptyResult(
            "all observations identical, rank-sum test undefined".to_string(),
        ));
    }

    let numerator = u_statistic - mean_u;
    let z_abs = (numerator.abs() - 0.5).max(0.0) / variance.sqrt();
    let z = if numerator < 0.0 { -z_abs } else { z_abs };
    let p_value = erfc(z_abs / SQRT_2).min(1.0);
    Ok(RankSumTest {
        u_statistic,
        z,
        p_value,
    })
}

/// Result of the Kruskal-Wallis test.
#[derive(Debug, Clone, PartialEq)]
pub struct KruskalWallisTest {
    /// Tie-corrected H statistic.
    pub h_statistic: f64,
    /// p-value from the chi-squared approximation with k-1 df.
    pub p_value: f64,
}

/// Kruskal-Wallis H test across two or more groups, tie-corrected, with the
/// chi-squared approximation for the p-value.
pub fn kruskal_wallis(groups: &[&[f64]]) -> Result<KruskalWallisTest, AnalysisError> {
    let groups: Vec<&[f64]> = groups.iter().copied().filter(|g| !g.is_empty()).collect();
    if groups.len() < 2 {
        return Err(AnalysisError::EmptyResult(
            "Kruskal-Wallis test needs at least two non-empty groups".to_string(),
        ));
    }
    let combined: Vec<f64> = groups.iter().flat_map(|g| g.iter().copied()).collect();
    let n = combined.len() as f64;
    let ranks = average_ranks(&combined);

    let mut h = 0.0;
    let mut offset = 0;
    for group in &groups {
        let r: f64 = ranks[offset..offset + group.len()].iter().sum();
        h += r * r / group.len() as f64;
        offset += group.len();
    }
    h = 12.0 / (n * (n + 1.0)) * h - 3.0 * (n + 1.0);

    let correction = 1.0 - tie_term(&combined) / (n.powi(3) - n);
    if correction <= 0.0 {
        return Err(AnalysisError::EmptyResult(
            "all observations identical, Kruskal-Wallis test undefined".to_string(),
        ));
    }
    let h_statistic = h / correction;
    let df = (groups.len() - 1) as f64;
    let p_value = gamma_ur(df / 2.0, h_statistic.max(0.0) / 2.0);
    Ok(KruskalWallisTest {
        h_statistic,
        p_value,
    })
}

/// Star annotation for a p-value: `***` < 0.001, `**` < 0.01, `*` < 0.05,
/// otherwise `ns`.
pub fn significance_stars(p_value: f64) -> &'static str {
    if p_value < 0.001 {
        "***"
    } else if p_value < 0.01 {
        "**"
    } else if p_value < 0.05 {
        "*"
    } else {
        "ns"
    }
}

/// Descriptive statistics of one group's metric values.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptives {
    /// Number of observations.
    pub n: usize,
    /// Arithmetic mean.
    pub mean: f64,
    /// Sample standard deviation, absent for fewer than two observations.
    pub std_dev: Option<f64>,
    /// Standard error of the mean, absent for fewer than two observations.
    pub sem: Option<f64>,
}

/// Summarize one group's values; `None` for an empty group.
pub fn describe(values: &[f64]) -> Option<Descriptives> {
    if values.is_empty() {
        return None;
    }
    let n = values.len();
    let data = Data::new(values.to_vec());
    let mean = data.mean()?;
    let std_dev = if n >= 2 { data.std_dev() } else { None };
    let sem = std_dev.map(|s| s / (n as f64).sqrt());
    Some(Descriptives {
        n,
        mean,
        std_dev,
        sem,
    })
}
