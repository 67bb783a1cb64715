//! Part 6 driver: per-sample cell-to-crypt assignment under both policies.

use crate::config::AnalysisConfig;
use anyhow::{Context, Result};
use cell_table::CellTable;
use compartment::{assign_no_buffer, assign_with_buffer};
use crypt_roi::{load_crypts_file, Crypt};
use itertools::Itertools;
use log::{info, warn};
use std::fs;
use std::path::Path;

/// Output subdirectory for the buffered policy (crypt epithelium plus
/// intraepithelial zone).
const BUFFERED_DIR: &str = "Crypt_IEL";
/// Output subdirectory for the strict policy (lamina propria analysis).
const STRICT_DIR: &str = "LP";

pub fn run(config: &AnalysisConfig) -> Result<()> {
    let groups = group_stats::read_group_assignments(&config.groups_file)?;
    let samples: Vec<String> = groups
        .iter()
        .map(|g| g.sample.clone())
        .unique()
        .filter(|s| !config.is_excluded(s))
        .collect();
    if samples.is_empty() {
        warn!("no samples left after exclusions, nothing to assign");
        return Ok(());
    }

    let buffered_dir = config.output_dir.join(BUFFERED_DIR);
    let strict_dir = config.output_dir.join(STRICT_DIR);
    for dir in [&buffered_dir, &strict_dir] {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    for sample in &samples {
        process_sample(config, sample, &buffered_dir, &strict_dir)
            .with_context(|| format!("sample {sample}"))?;
    }
    info!("assignment complete for {} samples", samples.len());
    Ok(())
}

fn process_sample(
    config: &AnalysisConfig,
    sample: &str,
    buffered_dir: &Path,
    strict_dir: &Path,
) -> Result<()> {
    let cells = CellTable::read(&config.cells_path(sample), &config.x_column, &config.y_column)?;
    let crypts = load_crypts_file(&config.crypts_path(sample))?;
    info!("{sample}: {} cells, {} crypts", cells.len(), crypts.len());

    let strict = assign_no_buffer(cells.points(), &crypts);
    cells.write_with_assignments(
        &strict_dir.join(format!("{sample}_cells_crypt_nobuffer.csv")),
        &strict,
    )?;

    let buffered = assign_with_buffer(cells.points(), &crypts, config.buffer_distance_px)?;
    cells.write_with_assignments(
        &buffered_dir.join(format!("{sample}_cells_crypt_buffer.csv")),
        &buffered,
    )?;

    write_crypt_areas(
        &buffered_dir.join(format!("{sample}_crypt_areas.csv")),
        &crypts,
        config.pixel_size_um,
    )
}

fn write_crypt_areas(path: &Path, crypts: &[Crypt], pixel_size_um: f64) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("cannot write {}", path.display()))?;
    writer.write_record(["crypt_id", "crypt_name", "area_px2", "area_mm2"])?;
    for crypt in crypts {
        let (area_px2, area_mm2) = crypt.area(pixel_size_um);
        writer.write_record([
            crypt.id.as_str(),
            crypt.name.as_str(),
            &area_px2.to_string(),
            &area_mm2.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CRYPTS_GEOJSON: &str = r#"{
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "id": "f1",
            "properties": {
                "name": "Crypt_1",
                "classification": {"name": "crypt"}
            },
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[0.0,0.0],[100.0,0.0],[100.0,100.0],[0.0,100.0],[0.0,0.0]]]
            }
        }]
    }"#;

    fn test_config(base: &Path) -> AnalysisConfig {
        AnalysisConfig {
            base_dir: base.to_path_buf(),
            output_dir: base.join("analysis"),
            groups_file: base.join("group_assignments.csv"),
            pixel_size_um: 0.325,
            buffer_distance_px: 31.0,
            x_column: "X_centroid".to_string(),
            y_column: "Y_centroid".to_string(),
            excluded_samples: vec!["S2".to_string()],
            cells_pattern: "{sample}/cells.csv".to_string(),
            crypts_pattern: "{sample}/crypts.geojson".to_string(),
            tissues: vec![],
            two_group: None,
            multi_group: None,
        }
    }

    #[test]
    fn assigns_synthetic_sample_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        fs::write(
            base.join("group_assignments.csv"),
            "sample,group\nS1,GROUP_A\nS2,GROUP_B\n",
        )
        .unwrap();
        fs::create_dir(base.join("S1")).unwrap();
        fs::write(base.join("S1/crypts.geojson"), CRYPTS_GEOJSON).unwrap();
        // Cell 1 inside the crypt, cell 2 within the 31 px buffer, cell 3 far
        // outside both.
        fs::write(
            base.join("S1/cells.csv"),
            "CellID,X_centroid,Y_centroid\n1,50.0,50.0\n2,120.0,50.0\n3,500.0,500.0\n",
        )
        .unwrap();

        let config = test_config(base);
        run(&config).unwrap();

        let strict =
            fs::read_to_string(config.output_dir.join("LP/S1_cells_crypt_nobuffer.csv")).unwrap();
        assert_eq!(
            strict,
            "CellID,X_centroid,Y_centroid,crypt_id,crypt_name,crypt_index\n\
             1,50.0,50.0,f1,Crypt_1,0\n\
             2,120.0,50.0,,,-1\n\
             3,500.0,500.0,,,-1\n"
        );

        let buffered = fs::read_to_string(
            config
                .output_dir
                .join("Crypt_IEL/S1_cells_crypt_buffer.csv"),
        )
        .unwrap();
        assert_eq!(
            buffered,
            "CellID,X_centroid,Y_centroid,crypt_id,crypt_name,crypt_index\n\
             1,50.0,50.0,f1,Crypt_1,0\n\
             2,120.0,50.0,f1,Crypt_1,0\n\
             3,500.0,500.0,,,-1\n"
        );

        let areas =
            fs::read_to_string(config.output_dir.join("Crypt_IEL/S1_crypt_areas.csv")).unwrap();
        assert_eq!(
            areas,
            "crypt_id,crypt_name,area_px2,area_mm2\nf1,Crypt_1,10000,0.00105625\n"
        );

        // S2 is excluded, so its missing input files never fail the run.
        assert!(!config
            .output_dir
            .join("LP/S2_cells_crypt_nobuffer.csv")
            .exists());
    }

    #[test]
    fn missing_cells_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        fs::write(base.join("group_assignments.csv"), "sample,group\nS1,GROUP_A\n").unwrap();
        let config = test_config(base);
        let err = run(&config).unwrap_err();
        assert!(err.to_string().contains("S1"));
    }
}
