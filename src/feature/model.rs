use std::collections::BTreeMap;

use geojson::{JsonObject, JsonValue};
use serde::{Deserialize, Serialize};

use super::normalize::parse_list;

/// Languages the guide text is authored in.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Es,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::En, Language::Es];

    /// Suffix used by the `{field}_{code}` property naming convention.
    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Es => "es",
        }
    }
}

/// Per-language text of a feature. Fields missing in the source are empty strings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocalizedText {
    pub name: String,
    pub title: String,
    pub location: String,
    pub directions: String,
    pub content: String,
}

/// Property names carried per language, in the order they are written back out.
pub const LOCALIZED_FIELDS: [&str; 6] = [
    "name",
    "title",
    "location",
    "directions",
    "contents",
    "content",
];

impl LocalizedText {
    fn field(&self, name: &str) -> &str {
        match name {
            "name" => &self.name,
            "title" => &self.title,
            "location" => &self.location,
            "directions" => &self.directions,
            "contents" | "content" => &self.content,
            _ => "",
        }
    }
}

/// The part a collection plays in the guide.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub enum Role {
    Points,
    Lines,
    Polygons,
    PointsOfInterest,
    Subpoints,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Points,
        Role::Lines,
        Role::Polygons,
        Role::PointsOfInterest,
        Role::Subpoints,
    ];

    /// Subsidiary roles whose visibility follows the focused point of interest.
    pub const SUBSIDIARY: [Role; 3] = [Role::Polygons, Role::Lines, Role::Points];

    /// Name of the backing collection / bundle file.
    pub fn collection_name(&self) -> &'static str {
        match self {
            Role::Points => "points",
            Role::Lines => "lines",
            Role::Polygons => "polygons",
            Role::PointsOfInterest => "poi",
            Role::Subpoints => "subpoints",
        }
    }

    /// Id of the map source holding this collection.
    pub fn source_id(&self) -> &'static str {
        self.collection_name()
    }
}

/// A normalized geographic feature.
#[derive(Clone, Debug, PartialEq)]
pub struct Feature {
    pub id: String,
    pub label_id: String,
    pub geometry: geojson::Geometry,
    pub text: BTreeMap<Language, LocalizedText>,
    /// Comma-joined tag list, see [`parse_list`].
    pub tags: String,
    /// Comma-joined image references, see [`parse_list`].
    pub images: String,
    pub zoom: Option<f64>,
    /// Name key of the point of interest this feature belongs to.
    pub association: Option<String>,
    pub icon: Option<String>,
    pub links: String,
    /// Remaining source properties not lifted into typed fields.
    pub properties: JsonObject,
}

impl Feature {
    pub fn text(&self, language: Language) -> &LocalizedText {
        static EMPTY: LocalizedText = LocalizedText {
            name: String::new(),
            title: String::new(),
            location: String::new(),
            directions: String::new(),
            content: String::new(),
        };
        self.text.get(&language).unwrap_or(&EMPTY)
    }

    /// Language-invariant key subsidiary features refer to.
    pub fn name_key(&self) -> &str {
        &self.text(Language::En).name
    }

    pub fn tag_list(&self) -> Vec<String> {
        parse_list(&self.tags)
    }

    pub fn image_list(&self) -> Vec<String> {
        parse_list(&self.images)
    }

    /// Flattens the feature back into the property layout the map engine styles against.
    pub fn to_geojson(&self) -> geojson::Feature {
        let mut properties = self.properties.clone();
        properties.insert("id".to_string(), JsonValue::from(self.id.clone()));
        properties.insert("labelId".to_string(), JsonValue::from(self.label_id.clone()));
        properties.insert("tags".to_string(), JsonValue::from(self.tags.clone()));
        properties.insert("images".to_string(), JsonValue::from(self.images.clone()));
        properties.insert("links".to_string(), JsonValue::from(self.links.clone()));
        if let Some(zoom) = self.zoom {
            properties.insert("zoom".to_string(), JsonValue::from(zoom));
        }
        if let Some(association) = &self.association {
            properties.insert("feature".to_string(), JsonValue::from(association.clone()));
        }
        if let Some(icon) = &self.icon {
            properties.insert("icon_type".to_string(), JsonValue::from(icon.clone()));
        }
        for language in Language::ALL {
            let text = self.text(language);
            for field in LOCALIZED_FIELDS {
                properties.insert(
                    format!("{}_{}", field, language.code()),
                    JsonValue::from(text.field(field)),
                );
            }
        }
        geojson::Feature {
            bbox: None,
            geometry: Some(self.geometry.clone()),
            id: Some(geojson::feature::Id::String(self.id.clone())),
            properties: Some(properties),
            foreign_members: None,
        }
    }
}

/// Ordered features sharing a role. Order is the source's insertion order.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureCollection {
    pub role: Role,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn empty(role: Role) -> Self {
        Self {
            role,
            features: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Feature> {
        self.features.iter().find(|feature| feature.id == id)
    }

    pub fn to_geojson(&self) -> geojson::FeatureCollection {
        features_to_geojson(self.features.iter())
    }
}

pub fn features_to_geojson<'a>(
    features: impl Iterator<Item = &'a Feature>,
) -> geojson::FeatureCollection {
    geojson::FeatureCollection {
        bbox: None,
        features: features.map(Feature::to_geojson).collect(),
        foreign_members: None,
    }
}

/// All collections the guide displays.
#[derive(Clone, Debug, PartialEq)]
pub struct Collections {
    pub points: FeatureCollection,
    pub lines: FeatureCollection,
    pub polygons: FeatureCollection,
    pub points_of_interest: FeatureCollection,
    pub subpoints: FeatureCollection,
}

impl Default for Collections {
    fn default() -> Self {
        Self {
            points: FeatureCollection::empty(Role::Points),
            lines: FeatureCollection::empty(Role::Lines),
            polygons: FeatureCollection::empty(Role::Polygons),
            points_of_interest: FeatureCollection::empty(Role::PointsOfInterest),
            subpoints: FeatureCollection::empty(Role::Subpoints),
        }
    }
}

impl Collections {
    pub fn get(&self, role: Role) -> &FeatureCollection {
        match role {
            Role::Points => &self.points,
            Role::Lines => &self.lines,
            Role::Polygons => &self.polygons,
            Role::PointsOfInterest => &self.points_of_interest,
            Role::Subpoints => &self.subpoints,
        }
    }

    pub fn set(&mut self, collection: FeatureCollection) {
        match collection.role {
            Role::Points => self.points = collection,
            Role::Lines => self.lines = collection,
            Role::Polygons => self.polygons = collection,
            Role::PointsOfInterest => self.points_of_interest = collection,
            Role::Subpoints => self.subpoints = collection,
        }
    }

    /// Finds a focusable feature: points of interest first, then subpoints.
    pub fn find(&self, id: &str) -> Option<(Role, &Feature)> {
        self.points_of_interest
            .get(id)
            .map(|feature| (Role::PointsOfInterest, feature))
            .or_else(|| {
                self.subpoints
                    .get(id)
                    .map(|feature| (Role::Subpoints, feature))
            })
    }
}
