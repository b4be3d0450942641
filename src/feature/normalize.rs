use std::collections::{BTreeMap, HashSet};

use geojson::{JsonObject, JsonValue};

use super::geometry::{check_coordinates, resolve_geometry};
use super::model::{Feature, FeatureCollection, Language, LocalizedText, Role, LOCALIZED_FIELDS};

/// A record as delivered by a data source: a key plus arbitrary fields.
#[derive(Clone, Debug, PartialEq)]
pub struct RawRecord {
    pub key: String,
    pub fields: JsonObject,
}

impl RawRecord {
    pub fn new(key: impl Into<String>, fields: JsonObject) -> Self {
        Self {
            key: key.into(),
            fields,
        }
    }
}

/// Problems met while normalizing. `GeometryFallback` is a warning, every other variant
/// means the record was dropped.
#[derive(thiserror::Error, Clone, Debug, PartialEq)]
pub enum NormalizeIssue {
    #[error("geometry fell back to a lower-precedence encoding: {reason}")]
    GeometryFallback { reason: String },
    #[error("no resolvable geometry")]
    NoGeometry,
    #[error("invalid coordinates: {0}")]
    InvalidCoordinates(String),
    #[error("record has no identifier")]
    MissingId,
    #[error("duplicate identifier {0}")]
    DuplicateId(String),
}

impl NormalizeIssue {
    pub fn is_skip(&self) -> bool {
        !matches!(self, NormalizeIssue::GeometryFallback { .. })
    }
}

/// Diagnostic tied to the record it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordIssue {
    pub key: String,
    pub issue: NormalizeIssue,
}

/// Result of normalizing one collection. Partial success is the normal case.
#[derive(Clone, Debug, PartialEq)]
pub struct Normalized {
    pub collection: FeatureCollection,
    pub issues: Vec<RecordIssue>,
}

impl Normalized {
    pub fn skipped_count(&self) -> usize {
        self.issues.iter().filter(|issue| issue.issue.is_skip()).count()
    }
}

/// Properties lifted into typed fields or consumed by geometry resolution.
const CONSUMED_FIELDS: [&str; 14] = [
    "id",
    "labelId",
    "tags",
    "images",
    "zoom",
    "feature",
    "icon_type",
    "type",
    "links",
    "geometry",
    "geometryJson",
    "longitude",
    "latitude",
    "geopoint",
];

/// Converts raw records into a feature collection of the given role.
///
/// Records without resolvable geometry or identifier are skipped and reported; they never
/// abort the collection.
pub fn normalize(role: Role, records: impl IntoIterator<Item = RawRecord>) -> Normalized {
    let mut features = Vec::new();
    let mut issues = Vec::new();
    let mut seen_ids = HashSet::new();

    for record in records {
        let (feature, record_issues) = normalize_record(&record);
        issues.extend(record_issues.into_iter().map(|issue| RecordIssue {
            key: record.key.clone(),
            issue,
        }));
        let Some(feature) = feature else { continue };
        if !seen_ids.insert(feature.id.clone()) {
            issues.push(RecordIssue {
                key: record.key.clone(),
                issue: NormalizeIssue::DuplicateId(feature.id),
            });
            continue;
        }
        features.push(feature);
    }

    for issue in &issues {
        if issue.issue.is_skip() {
            log::warn!(
                "Skipping record {} in {}: {}",
                issue.key,
                role.collection_name(),
                issue.issue
            );
        } else {
            log::warn!(
                "Record {} in {}: {}",
                issue.key,
                role.collection_name(),
                issue.issue
            );
        }
    }

    Normalized {
        collection: FeatureCollection { role, features },
        issues,
    }
}

fn normalize_record(record: &RawRecord) -> (Option<Feature>, Vec<NormalizeIssue>) {
    let fields = &record.fields;
    let (geometry, mut issues) = resolve_geometry(fields);
    let Some((geometry, _)) = geometry else {
        issues.push(NormalizeIssue::NoGeometry);
        return (None, issues);
    };
    if let Err(reason) = check_coordinates(&geometry) {
        issues.push(NormalizeIssue::InvalidCoordinates(reason));
        return (None, issues);
    }

    let id = scalar_string(fields.get("id"))
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| record.key.clone());
    if id.is_empty() {
        issues.push(NormalizeIssue::MissingId);
        return (None, issues);
    }

    let mut text = BTreeMap::new();
    for language in Language::ALL {
        text.insert(language, localized_text(fields, language));
    }

    let properties: JsonObject = fields
        .iter()
        .filter(|(key, _)| !CONSUMED_FIELDS.contains(&key.as_str()) && !is_localized(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    let feature = Feature {
        label_id: label_id(&id),
        id,
        geometry,
        text,
        tags: join_list(fields.get("tags")),
        images: join_list(fields.get("images")),
        zoom: zoom_hint(fields.get("zoom")),
        association: scalar_string(fields.get("feature")).filter(|key| !key.is_empty()),
        icon: scalar_string(fields.get("icon_type"))
            .or_else(|| scalar_string(fields.get("type")))
            .filter(|icon| !icon.is_empty()),
        links: scalar_string(fields.get("links")).unwrap_or_default(),
        properties,
    };
    (Some(feature), issues)
}

fn localized_text(fields: &JsonObject, language: Language) -> LocalizedText {
    let get = |field: &str| {
        scalar_string(fields.get(&format!("{}_{}", field, language.code()))).unwrap_or_default()
    };
    let contents = get("contents");
    LocalizedText {
        name: get("name"),
        title: get("title"),
        location: get("location"),
        directions: get("directions"),
        content: if contents.is_empty() {
            get("content")
        } else {
            contents
        },
    }
}

fn is_localized(key: &str) -> bool {
    Language::ALL.iter().any(|language| {
        LOCALIZED_FIELDS
            .iter()
            .any(|field| key == format!("{}_{}", field, language.code()))
    })
}

fn scalar_string(value: Option<&JsonValue>) -> Option<String> {
    match value? {
        JsonValue::String(text) => Some(text.clone()),
        JsonValue::Number(number) => Some(number.to_string()),
        JsonValue::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn zoom_hint(value: Option<&JsonValue>) -> Option<f64> {
    let zoom: Option<f64> = match value? {
        JsonValue::Number(number) => number.as_f64(),
        JsonValue::String(text) => text.trim().parse().ok(),
        _ => None,
    };
    zoom.filter(|zoom| zoom.is_finite())
}

/// Stores a list field as a comma-joined string whether it arrived as a list or a string.
fn join_list(value: Option<&JsonValue>) -> String {
    match value {
        Some(JsonValue::Array(items)) => items
            .iter()
            .filter_map(|item| scalar_string(Some(item)))
            .collect::<Vec<_>>()
            .join(","),
        Some(value) => scalar_string(Some(value)).unwrap_or_default(),
        None => String::new(),
    }
}

/// Decodes a comma-joined list: entries trimmed, empty entries dropped, order kept.
pub fn parse_list(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// Short label shown on the map marker: the second `_`-separated segment of the id.
pub fn label_id(id: &str) -> String {
    match id.split('_').nth(1) {
        Some(segment) if !segment.is_empty() => segment.to_string(),
        _ => id.to_string(),
    }
}
