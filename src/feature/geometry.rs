use geo::Centroid;
use geojson::{JsonObject, JsonValue};

use super::normalize::NormalizeIssue;

/// Where a record's geometry came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeometrySource {
    Structured,
    Serialized,
    Coordinates,
}

/// Resolves the geometry of a raw record.
///
/// Precedence: a structured `geometry` object, then a serialized `geometryJson` string, then
/// `longitude`/`latitude` scalars (or a `geopoint` object). Failures of the first two steps are
/// returned as warnings alongside whatever the later steps produce.
pub fn resolve_geometry(
    fields: &JsonObject,
) -> (Option<(geojson::Geometry, GeometrySource)>, Vec<NormalizeIssue>) {
    let mut warnings = Vec::new();

    if let Some(JsonValue::Object(object)) = fields.get("geometry") {
        match structured_geometry(object) {
            Ok(geometry) => return (Some((geometry, GeometrySource::Structured)), warnings),
            Err(reason) => warnings.push(NormalizeIssue::GeometryFallback { reason }),
        }
    }

    if let Some(JsonValue::String(serialized)) = fields.get("geometryJson") {
        match serde_json::from_str::<JsonValue>(serialized)
            .map_err(|err| err.to_string())
            .and_then(|value| geojson::Geometry::try_from(value).map_err(|err| err.to_string()))
        {
            Ok(geometry) => return (Some((geometry, GeometrySource::Serialized)), warnings),
            Err(reason) => warnings.push(NormalizeIssue::GeometryFallback { reason }),
        }
    }

    let scalars = scalar_position(fields).or_else(|| match fields.get("geopoint") {
        Some(JsonValue::Object(geopoint)) => scalar_position(geopoint),
        _ => None,
    });
    let geometry = scalars.map(|(lon, lat)| {
        (
            geojson::Geometry::new(geojson::Value::Point(vec![lon, lat])),
            GeometrySource::Coordinates,
        )
    });
    (geometry, warnings)
}

fn structured_geometry(object: &JsonObject) -> Result<geojson::Geometry, String> {
    match object.get("coordinates") {
        Some(JsonValue::Array(_)) => {}
        _ => return Err("structured geometry has no coordinate array".to_string()),
    }
    let mut object = object.clone();
    if !object.contains_key("type") {
        object.insert("type".to_string(), JsonValue::from("Point"));
    }
    geojson::Geometry::try_from(object).map_err(|err| err.to_string())
}

fn scalar_position(fields: &JsonObject) -> Option<(f64, f64)> {
    let lon = number_field(fields, &["longitude", "_longitude"])?;
    let lat = number_field(fields, &["latitude", "_latitude"])?;
    Some((lon, lat))
}

fn number_field(fields: &JsonObject, names: &[&str]) -> Option<f64> {
    names.iter().find_map(|name| match fields.get(*name) {
        Some(JsonValue::Number(number)) => number.as_f64(),
        Some(JsonValue::String(text)) => text.trim().parse().ok(),
        _ => None,
    })
}

/// Checks that a geometry has at least one position and that every position is a
/// finite longitude/latitude pair within range.
pub fn check_coordinates(geometry: &geojson::Geometry) -> Result<(), String> {
    let mut positions = Vec::new();
    collect_positions(&geometry.value, &mut positions);
    if positions.is_empty() {
        return Err("geometry has no coordinates".to_string());
    }
    for position in positions {
        if position.len() < 2 || position.iter().any(|value| !value.is_finite()) {
            return Err(format!("malformed position {:?}", position));
        }
        let (lon, lat) = (position[0], position[1]);
        if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
            return Err(format!("position ({}, {}) out of range", lon, lat));
        }
    }
    Ok(())
}

fn collect_positions<'a>(value: &'a geojson::Value, positions: &mut Vec<&'a Vec<f64>>) {
    use geojson::Value::*;
    match value {
        Point(position) => positions.push(position),
        MultiPoint(line) | LineString(line) => positions.extend(line.iter()),
        MultiLineString(lines) | Polygon(lines) => {
            positions.extend(lines.iter().flat_map(|line| line.iter()))
        }
        MultiPolygon(polygons) => positions.extend(
            polygons
                .iter()
                .flat_map(|polygon| polygon.iter())
                .flat_map(|line| line.iter()),
        ),
        GeometryCollection(geometries) => {
            for geometry in geometries {
                collect_positions(&geometry.value, positions);
            }
        }
    }
}

/// Point the camera and popups anchor on: the point itself, or the centroid otherwise.
pub fn anchor_point(geometry: &geojson::Geometry) -> Option<geo::Point> {
    if let geojson::Value::Point(position) = &geometry.value {
        return match position.as_slice() {
            [lon, lat, ..] => Some(geo::Point::new(*lon, *lat)),
            _ => None,
        };
    }
    let geometry = geo::Geometry::<f64>::try_from(geometry.value.clone()).ok()?;
    geometry.centroid()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn object(value: JsonValue) -> JsonObject {
        match value {
            JsonValue::Object(object) => object,
            _ => panic!("expected object"),
        }
    }

    #[rstest]
    fn test_structured_geometry_wins() {
        let fields = object(json!({
            "geometry": {"type": "Point", "coordinates": [-122.5, 45.6]},
            "longitude": 1.0,
            "latitude": 2.0,
        }));
        let (geometry, warnings) = resolve_geometry(&fields);
        let (geometry, source) = geometry.unwrap();
        assert_eq!(source, GeometrySource::Structured);
        assert_eq!(geometry.value, geojson::Value::Point(vec![-122.5, 45.6]));
        assert!(warnings.is_empty());
    }

    #[rstest]
    fn test_structured_geometry_defaults_to_point() {
        let fields = object(json!({"geometry": {"coordinates": [-122.5, 45.6]}}));
        let (geometry, _) = resolve_geometry(&fields);
        assert_eq!(
            geometry.unwrap().0.value,
            geojson::Value::Point(vec![-122.5, 45.6])
        );
    }

    #[rstest]
    fn test_serialized_geometry() {
        let fields = object(json!({
            "geometryJson": "{\"type\":\"LineString\",\"coordinates\":[[-122.5,45.6],[-122.4,45.7]]}",
        }));
        let (geometry, warnings) = resolve_geometry(&fields);
        assert_eq!(geometry.unwrap().1, GeometrySource::Serialized);
        assert!(warnings.is_empty());
    }

    #[rstest]
    fn test_bad_serialized_geometry_falls_back_to_scalars() {
        let fields = object(json!({
            "geometryJson": "{not json",
            "longitude": -122.5,
            "latitude": 45.6,
        }));
        let (geometry, warnings) = resolve_geometry(&fields);
        let (geometry, source) = geometry.unwrap();
        assert_eq!(source, GeometrySource::Coordinates);
        assert_eq!(geometry.value, geojson::Value::Point(vec![-122.5, 45.6]));
        assert_eq!(warnings.len(), 1);
    }

    #[rstest]
    fn test_geopoint_object() {
        let fields = object(json!({"geopoint": {"latitude": 45.6, "longitude": -122.5}}));
        let (geometry, _) = resolve_geometry(&fields);
        assert_eq!(geometry.unwrap().1, GeometrySource::Coordinates);
    }

    #[rstest]
    fn test_nothing_resolves() {
        let fields = object(json!({"geometryJson": "oops", "name_en": "Nowhere"}));
        let (geometry, warnings) = resolve_geometry(&fields);
        assert!(geometry.is_none());
        assert_eq!(warnings.len(), 1);
    }

    #[rstest]
    #[case(geojson::Value::Point(vec![-122.5, 45.6]), true)]
    #[case(geojson::Value::Point(vec![200.0, 45.6]), false)]
    #[case(geojson::Value::Point(vec![-122.5]), false)]
    #[case(geojson::Value::LineString(vec![]), false)]
    #[case(geojson::Value::Polygon(vec![vec![vec![0.0, 0.0], vec![1.0, 95.0]]]), false)]
    fn test_check_coordinates(#[case] value: geojson::Value, #[case] valid: bool) {
        assert_eq!(
            check_coordinates(&geojson::Geometry::new(value)).is_ok(),
            valid
        );
    }

    #[rstest]
    fn test_anchor_point_of_line_is_centroid() {
        let geometry = geojson::Geometry::new(geojson::Value::LineString(vec![
            vec![0.0, 0.0],
            vec![2.0, 0.0],
        ]));
        let anchor = anchor_point(&geometry).unwrap();
        assert_relative_eq!(anchor.x(), 1.0);
        assert_relative_eq!(anchor.y(), 0.0);
    }
}
