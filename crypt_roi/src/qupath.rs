//! Loading of crypt annotations from QuPath GeoJSON exports.
//!
//! A feature counts as a crypt iff its `classification.name` property equals
//! `"crypt"` (case-insensitive), or its `name` property contains `"crypt"`
//! while not containing `"non"` (guards against "non-crypt" style labels).
//! Known limitation of that substring heuristic, kept to match the
//! annotation workflow's labeling convention: a feature literally named
//! "Crypt-Nonstandard" is wrongly excluded.

use geo::{Area, BoundingRect};
use geo_types::{Polygon, Rect};
use geojson::feature::Id;
use geojson::{Feature, GeoJson};
use log::warn;
use pipeline_types::AnalysisError;
use serde_json::Value;
use std::fs::read_to_string;
use std::path::Path;

/// A traced crypt region: a closed planar polygon in pixel coordinates plus
/// its identity within the annotation file.
#[derive(Debug, Clone, PartialEq)]
pub struct Crypt {
    /// External feature id, or `unknown_<index>` when the file carries none.
    pub id: String,
    /// `properties.name`, or `Crypt_<index>` when absent.
    pub name: String,
    /// Position in the selected, successfully parsed sequence (file order).
    pub index: usize,
    /// The true (unbuffered) region boundary.
    pub polygon: Polygon<f64>,
}

impl Crypt {
    /// Polygon area in source units (square pixels).
    pub fn area_px2(&self) -> f64 {
        self.polygon.unsigned_area()
    }

    /// Polygon area as `(square pixels, square millimeters)` for the given
    /// pixel size in microns. Zero area is a reportable value, not an error.
    pub fn area(&self, pixel_size_um: f64) -> (f64, f64) {
        let area_px2 = self.area_px2();
        (area_px2, area_px2 * pixel_size_um.powi(2) * 1e-6)
    }

    /// Axis-aligned bounding box, `None` for a coordinate-less polygon.
    pub fn bounding_box(&self) -> Option<Rect<f64>> {
        self.polygon.bounding_rect()
    }
}

fn string_property<'a>(feature: &'a Feature, key: &str) -> Option<&'a str> {
    feature
        .properties
        .as_ref()
        .and_then(|props| props.get(key))
        .and_then(Value::as_str)
}

fn classification_name(feature: &Feature) -> Option<&str> {
    feature
        .properties
        .as_ref()
        .and_then(|props| props.get("classification"))
        .and_then(|classification| classification.get("name"))
        .and_then(Value::as_str)
}

/// The crypt selection heuristic from the annotation workflow.
fn is_crypt_feature(classification: Option<&str>, name: Option<&str>) -> bool {
    if classification.is_some_and(|c| c.eq_ignore_ascii_case("crypt")) {
        return true;
    }
    name.map(str::to_lowercase)
        .is_some_and(|n| n.contains("crypt") && !n.contains("non"))
}

fn feature_id(feature: &Feature) -> Option<String> {
    match feature.id.as_ref()? {
        Id::String(s) => Some(s.clone()),
        Id::Number(n) => Some(n.to_string()),
    }
}

/// Convert a feature's geometry to a planar polygon. A MultiPolygon
/// (usually a manual tracing slip in QuPath) contributes its largest member.
fn to_polygon(feature: Feature) -> Result<Polygon<f64>, AnalysisError> {
    let geometry = feature
        .geometry
        .ok_or_else(|| AnalysisError::DataFormat("feature has no geometry".to_string()))?;
    let geometry = geo_types::Geometry::<f64>::try_from(geometry)
        .map_err(|e| AnalysisError::DataFormat(format!("unparseable geometry: {e}")))?;
    match geometry {
        geo_types::Geometry::Polygon(p) => Ok(p),
        geo_types::Geometry::MultiPolygon(mp) => mp
            .into_iter()
            .max_by(|a, b| a.unsigned_area().total_cmp(&b.unsigned_area()))
            .ok_or_else(|| AnalysisError::DataFormat("empty multipolygon".to_string())),
        other => Err(AnalysisError::DataFormat(format!(
            "expected polygon geometry, got {other:?}"
        ))),
    }
}

/// Extract the crypt features of a GeoJSON feature collection, preserving
/// file order. Features whose geometry cannot be converted are reported and
/// skipped rather than aborting the run; annotation sets commonly include a
/// few malformed manual tracings.
pub fn load_crypts(geojson_content: &str) -> Result<Vec<Crypt>, AnalysisError> {
    let geojson: GeoJson = geojson_content
        .parse()
        .map_err(|e| AnalysisError::DataFormat(format!("invalid geojson: {e}")))?;
    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(AnalysisError::DataFormat(
            "geojson document is not a feature collection".to_string(),
        ));
    };

    let mut crypts = Vec::new();
    for feature in collection.features {
        if !is_crypt_feature(classification_name(&feature), string_property(&feature, "name")) {
            continue;
        }
        let index = crypts.len();
        let id = feature_id(&feature).unwrap_or_else(|| format!("unknown_{index}"));
        let name = string_property(&feature, "name")
            .map_or_else(|| format!("Crypt_{index}"), str::to_string);
        match to_polygon(feature) {
            Ok(polygon) => crypts.push(Crypt {
                id,
                name,
                index,
                polygon,
            }),
            Err(e) => warn!("skipping crypt feature {id:?} ({name:?}): {e}"),
        }
    }
    Ok(crypts)
}

/// Load crypts from a GeoJSON file path. A missing or unreadable file is a
/// configuration error, reported immediately.
pub fn load_crypts_file(path: &Path) -> Result<Vec<Crypt>, AnalysisError> {
    let content = read_to_string(path).map_err(|e| {
        AnalysisError::Configuration(format!("cannot read {}: {e}", path.display()))
    })?;
    load_crypts(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn square_coords() -> &'static str {
        "[[[0.0,0.0],[10.0,0.0],[10.0,10.0],[0.0,10.0],[0.0,0.0]]]"
    }

    fn feature(id: Option<&str>, properties: &str, geometry: &str) -> String {
        let id = id.map_or_else(String::new, |i| format!("\"id\": \"{i}\","));
        format!("{{\"type\": \"Feature\", {id} \"properties\": {properties}, \"geometry\": {geometry}}}")
    }

    fn collection(features: &[String]) -> String {
        format!(
            "{{\"type\": \"FeatureCollection\", \"features\": [{}]}}",
            features.join(",")
        )
    }

    fn polygon_geometry() -> String {
        format!("{{\"type\": \"Polygon\", \"coordinates\": {}}}", square_coords())
    }

    #[test]
    fn selects_by_classification() {
        let doc = collection(&[feature(
            Some("f-1"),
            "{\"classification\": {\"name\": \"Crypt\"}}",
            &polygon_geometry(),
        )]);
        let crypts = load_crypts(&doc).unwrap();
        assert_eq!(crypts.len(), 1);
        assert_eq!(crypts[0].id, "f-1");
        assert_eq!(crypts[0].name, "Crypt_0");
        assert_eq!(crypts[0].index, 0);
    }

    #[test]
    fn selects_by_name_substring() {
        let doc = collection(&[
            feature(None, "{\"name\": \"crypt region 7\"}", &polygon_geometry()),
            feature(None, "{\"name\": \"stroma\"}", &polygon_geometry()),
            feature(None, "{\"name\": \"non-crypt epithelium\"}", &polygon_geometry()),
        ]);
        let crypts = load_crypts(&doc).unwrap();
        assert_eq!(crypts.len(), 1);
        assert_eq!(crypts[0].name, "crypt region 7");
        assert_eq!(crypts[0].id, "unknown_0");
    }

    // Pins the documented limitation of the "non" substring guard rather
    // than silently fixing it.
    #[test]
    fn nonstandard_crypt_name_is_excluded() {
        let doc = collection(&[feature(
            None,
            "{\"name\": \"Crypt-Nonstandard\"}",
            &polygon_geometry(),
        )]);
        assert!(load_crypts(&doc).unwrap().is_empty());
    }

    #[test]
    fn indices_number_selected_features_only() {
        let doc = collection(&[
            feature(None, "{\"name\": \"crypt a\"}", &polygon_geometry()),
            feature(None, "{\"name\": \"vessel\"}", &polygon_geometry()),
            feature(None, "{\"name\": \"crypt b\"}", &polygon_geometry()),
        ]);
        let crypts = load_crypts(&doc).unwrap();
        assert_eq!(crypts.len(), 2);
        assert_eq!(crypts[0].index, 0);
        assert_eq!(crypts[1].index, 1);
        assert_eq!(crypts[1].id, "unknown_1");
    }

    #[test]
    fn malformed_geometry_is_skipped_not_fatal() {
        let doc = collection(&[
            feature(
                None,
                "{\"name\": \"crypt point\"}",
                "{\"type\": \"Point\", \"coordinates\": [1.0, 2.0]}",
            ),
            feature(None, "{\"name\": \"crypt ok\"}", &polygon_geometry()),
        ]);
        let crypts = load_crypts(&doc).unwrap();
        assert_eq!(crypts.len(), 1);
        assert_eq!(crypts[0].name, "crypt ok");
    }

    #[test]
    fn multipolygon_takes_largest_member() {
        let geometry = "{\"type\": \"MultiPolygon\", \"coordinates\": [\
            [[[0.0,0.0],[1.0,0.0],[1.0,1.0],[0.0,1.0],[0.0,0.0]]],\
            [[[0.0,0.0],[10.0,0.0],[10.0,10.0],[0.0,10.0],[0.0,0.0]]]]}";
        let doc = collection(&[feature(None, "{\"name\": \"crypt merged\"}", geometry)]);
        let crypts = load_crypts(&doc).unwrap();
        assert_eq!(crypts.len(), 1);
        assert!((crypts[0].area_px2() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn non_collection_document_is_a_data_format_error() {
        let err = load_crypts(&polygon_geometry()).unwrap_err();
        assert!(matches!(err, AnalysisError::DataFormat(_)));
    }

    #[test]
    fn area_conversion_to_mm2() {
        let geometry = "{\"type\": \"Polygon\", \"coordinates\": \
            [[[0.0,0.0],[100.0,0.0],[100.0,100.0],[0.0,100.0],[0.0,0.0]]]}";
        let doc = collection(&[feature(None, "{\"name\": \"crypt big\"}", geometry)]);
        let crypts = load_crypts(&doc).unwrap();
        let (area_px2, area_mm2) = crypts[0].area(0.325);
        assert!((area_px2 - 10000.0).abs() < 1e-9);
        assert!((area_mm2 - 0.00105625).abs() < 1e-12);
    }

    #[test]
    fn missing_file_is_a_configuration_error() {
        let err = load_crypts_file(Path::new("/nonexistent/crypts.geojson")).unwrap_err();
        assert!(matches!(err, AnalysisError::Configuration(_)));
    }

    #[test]
    fn load_from_file() {
        let doc = collection(&[feature(
            Some("f-9"),
            "{\"classification\": {\"name\": \"crypt\"}}",
            &polygon_geometry(),
        )]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crypts.geojson");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(doc.as_bytes()).unwrap();
        let crypts = load_crypts_file(&path).unwrap();
        assert_eq!(crypts.len(), 1);
        assert_eq!(crypts[0].id, "f-9");
    }
}
