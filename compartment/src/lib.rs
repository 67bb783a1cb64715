//! Assignment of segmented cells to crypt compartments.
//!
//! Two policies over the same inputs (cell centroids in pixel coordinates,
//! crypt polygons in file order):
//!
//! * [`assign_no_buffer`]: strict containment, first match wins by crypt
//!   enumeration order; overlapping later crypts never override.
//! * [`assign_with_buffer`]: containment in an outward capture zone of
//!   fixed width, nearest true (unbuffered) boundary wins, ties keep the
//!   earlier crypt.
//!
//! Both are pure transformations: one assignment per input cell, in input
//! order, with no state carried across calls.
#![deny(missing_docs)]

use crypt_roi::Crypt;
use geo::{EuclideanDistance, Intersects};
use geo_types::Point;
use log::{info, warn};
use pipeline_types::{AnalysisError, Assignment};

fn assigned(crypt: &Crypt, distance: f64) -> Assignment {
    Assignment::Assigned {
        id: crypt.id.clone(),
        name: crypt.name.clone(),
        index: crypt.index,
        distance,
    }
}

fn warn_if_degenerate(points: &[Point<f64>], crypts: &[Crypt]) {
    if crypts.is_empty() {
        warn!("no crypts loaded, reporting zero assignments");
    }
    if points.is_empty() {
        warn!("no cells present, reporting zero assignments");
    }
}

fn report(policy: &str, assignments: &[Assignment]) {
    let n_assigned = assignments.iter().filter(|a| a.is_assigned()).count();
    info!("{policy}: {n_assigned}/{} cells assigned", assignments.len());
}

/// Assign each cell to the first crypt, in enumeration order, whose polygon
/// contains it (on-boundary counts as contained). Cells inside no crypt stay
/// [`Assignment::Unassigned`]; a cell claimed by an earlier crypt is never
/// reassigned, even where crypts overlap.
pub fn assign_no_buffer(points: &[Point<f64>], crypts: &[Crypt]) -> Vec<Assignment> {
    warn_if_degenerate(points, crypts);
    let mut assignments = vec![Assignment::Unassigned; points.len()];
    for crypt in crypts {
        for (point, slot) in points.iter().zip(assignments.iter_mut()) {
            if !slot.is_assigned() && crypt.polygon.intersects(point) {
                *slot = assigned(crypt, 0.0);
            }
        }
    }
    report("no buffer", &assignments);
    assignments
}

/// Assign each cell to the crypt whose true boundary is nearest, among all
/// crypts whose buffered region (the polygon grown outward by `buffer_px`)
/// contains it.
///
/// A cell sits in the buffered region iff its euclidean distance to the true
/// polygon is at most `buffer_px`; that distance (0 inside the polygon) is
/// what the policy records and compares. A later crypt overrides an earlier
/// assignment only when strictly closer, so equal distances keep the earlier
/// crypt and a cell in some crypt's interior always beats another crypt's
/// capture zone.
///
/// Distances are only computed for cells passing a bounding-box-plus-buffer
/// prescreen of each crypt, keeping the per-crypt cost proportional to its
/// candidate cells.
pub fn assign_with_buffer(
    points: &[Point<f64>],
    crypts: &[Crypt],
    buffer_px: f64,
) -> Result<Vec<Assignment>, AnalysisError> {
    if !buffer_px.is_finite() || buffer_px <= 0.0 {
        return Err(AnalysisError::Configuration(format!(
            "buffer distance must be a positive number of pixels, got {buffer_px}"
        )));
    }
    warn_if_degenerate(points, crypts);
    let mut assignments = vec![Assignment::Unassigned; points.len()];
    for crypt in crypts {
        let Some(bbox) = crypt.bounding_box() else {
            warn!("crypt {:?} has no extent, skipping", crypt.id);
            continue;
        };
        let x_min = bbox.min().x - buffer_px;
        let y_min = bbox.min().y - buffer_px;
        let x_max = bbox.max().x + buffer_px;
        let y_max = bbox.max().y + buffer_px;
        for (point, slot) in points.iter().zip(assignments.iter_mut()) {
            if point.x() < x_min || point.x() > x_max || point.y() < y_min || point.y() > y_max {
                continue;
            }
            let distance = point.euclidean_distance(&crypt.polygon);
            if distance <= buffer_px && distance < slot.distance() {
                *slot = assigned(crypt, distance);
            }
        }
    }
    report("with buffer", &assignments);
    Ok(assignments)
}
