use std::path::PathBuf;

use geojson::{GeoJson, JsonValue};

use super::{DataSource, SourceError};
use crate::feature::RawRecord;

/// Static GeoJSON files named `{collection}.geojson`, either in a local directory or under
/// an http(s) base URL.
pub enum BundleSource {
    Directory(PathBuf),
    Remote {
        base_url: String,
        client: reqwest::blocking::Client,
    },
}

impl BundleSource {
    /// Picks a remote bundle for `http://` / `https://` locations, a directory otherwise.
    pub fn new(location: &str) -> Result<Self, SourceError> {
        if location.starts_with("http://") || location.starts_with("https://") {
            let client = reqwest::blocking::Client::builder()
                .user_agent("interpretive-map")
                .build()?;
            Ok(BundleSource::Remote {
                base_url: location.trim_end_matches('/').to_string(),
                client,
            })
        } else {
            Ok(BundleSource::Directory(PathBuf::from(location)))
        }
    }

    fn read(&self, collection: &str) -> Result<String, SourceError> {
        let filename = format!("{}.geojson", collection);
        match self {
            BundleSource::Directory(dir) => {
                let filepath = dir.join(filename);
                if !filepath.exists() {
                    return Err(SourceError::NotFound(filepath.display().to_string()));
                }
                Ok(std::fs::read_to_string(filepath)?)
            }
            BundleSource::Remote { base_url, client } => {
                let url = format!("{}/{}", base_url, filename);
                log::debug!("Fetching {}", url);
                let response = client.get(&url).send()?;
                if response.status() == reqwest::StatusCode::NOT_FOUND {
                    return Err(SourceError::NotFound(url));
                }
                Ok(response.error_for_status()?.text()?)
            }
        }
    }
}

impl DataSource for BundleSource {
    fn fetch_collection(&self, collection: &str) -> Result<Vec<RawRecord>, SourceError> {
        let contents = self.read(collection)?;
        let geojson: GeoJson = contents.parse()?;
        let features = match geojson {
            GeoJson::FeatureCollection(collection) => collection.features,
            GeoJson::Feature(feature) => vec![feature],
            GeoJson::Geometry(_) => {
                return Err(SourceError::Malformed(format!(
                    "{} holds a bare geometry, expected features",
                    collection
                )))
            }
        };
        Ok(features
            .into_iter()
            .enumerate()
            .map(|(index, feature)| feature_to_record(index, feature))
            .collect())
    }
}

/// Static features carry their geometry directly; it is handed to the normalizer as the
/// structured `geometry` field so both sources go through the same resolution.
fn feature_to_record(index: usize, feature: geojson::Feature) -> RawRecord {
    let key = match &feature.id {
        Some(geojson::feature::Id::String(id)) => id.clone(),
        Some(geojson::feature::Id::Number(id)) => id.to_string(),
        None => feature
            .properties
            .as_ref()
            .and_then(|properties| properties.get("id"))
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| index.to_string()),
    };
    let mut fields = feature.properties.unwrap_or_default();
    if let Some(geometry) = feature.geometry {
        match serde_json::to_value(&geometry) {
            Ok(value) => {
                fields.insert("geometry".to_string(), value);
            }
            Err(err) => log::warn!("Could not serialize geometry of {}: {}", key, err),
        }
    }
    RawRecord::new(key, fields)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use testdir::testdir;

    use super::*;
    use crate::feature::{normalize, Role};

    const POI: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "id": "poi_12",
             "geometry": {"type": "Point", "coordinates": [-122.6, 45.6]},
             "properties": {"name_en": "Heron Pond", "tags": "restroom,parking"}},
            {"type": "Feature",
             "geometry": null,
             "properties": {"id": "poi_13", "name_en": "Lost"}},
            {"type": "Feature",
             "geometry": {"type": "Point", "coordinates": [-122.5, 45.6]},
             "properties": {"name_en": "Unnamed"}}
        ]
    }"#;

    #[rstest]
    fn test_directory_bundle() {
        let dir = testdir!();
        std::fs::write(dir.join("poi.geojson"), POI).unwrap();
        let source = BundleSource::new(dir.to_str().unwrap()).unwrap();
        let records = source.fetch_collection("poi").unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].key, "poi_12");
        assert_eq!(records[1].key, "poi_13");
        assert_eq!(records[2].key, "2");

        let normalized = normalize(Role::PointsOfInterest, records);
        assert_eq!(normalized.collection.len(), 2);
        assert_eq!(normalized.skipped_count(), 1);
        assert_eq!(normalized.collection.features[0].tag_list(), vec!["restroom", "parking"]);
    }

    #[rstest]
    fn test_missing_file() {
        let dir = testdir!();
        let source = BundleSource::new(dir.to_str().unwrap()).unwrap();
        assert!(matches!(
            source.fetch_collection("lines"),
            Err(SourceError::NotFound(_))
        ));
    }

    #[rstest]
    fn test_malformed_file() {
        let dir = testdir!();
        std::fs::write(dir.join("lines.geojson"), "{\"type\": \"Nope\"}").unwrap();
        let source = BundleSource::new(dir.to_str().unwrap()).unwrap();
        assert!(matches!(
            source.fetch_collection("lines"),
            Err(SourceError::GeoJson(_))
        ));
    }

    #[rstest]
    fn test_remote_location() {
        let source = BundleSource::new("https://example.org/resources/").unwrap();
        match source {
            BundleSource::Remote { base_url, .. } => {
                assert_eq!(base_url, "https://example.org/resources")
            }
            BundleSource::Directory(_) => panic!("expected remote bundle"),
        }
    }
}
