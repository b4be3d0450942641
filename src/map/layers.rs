//! Catalogue of the guide's engine layers and the teardown/install sequence run on every
//! style load.

use std::collections::BTreeSet;
use std::time::Duration;

use geojson::{JsonObject, JsonValue};
use serde::Deserialize;
use serde_json::json;

use super::engine::{LayerKind, LayerSpec, MapEngine};
use crate::feature::{Collections, FeatureCollection, Role};

pub const POI_CIRCLES: &str = "poi-circles";
pub const POI_LABELS: &str = "poi-labels";
pub const POI_POINT_LABELS: &str = "poi-point-labels";
pub const POLYGONS_LAYER: &str = "polygons-layer";
pub const LINES_LAYER: &str = "lines-layer";
pub const POINTS_LAYER: &str = "points-layer";
pub const SUBPOINTS_LAYER: &str = "subpoints-layer";
pub const SUBPOINTS_LABELS: &str = "subpoints-labels";

/// Layers the tag filter applies to.
pub const POI_LAYERS: [&str; 3] = [POI_CIRCLES, POI_LABELS, POI_POINT_LABELS];

/// Icon drawn for subpoints.
pub const SUBPOINT_ICON: &str = "square";

const SUBSIDIARY_MIN_ZOOM: f64 = 13.0;
const LABEL_FONT: [&str; 3] = ["Roboto Bold", "Open Sans Bold", "Arial Unicode MS Bold"];

/// Layer showing the given subsidiary role.
pub fn subsidiary_layer(role: Role) -> Option<&'static str> {
    match role {
        Role::Polygons => Some(POLYGONS_LAYER),
        Role::Lines => Some(LINES_LAYER),
        Role::Points => Some(POINTS_LAYER),
        Role::PointsOfInterest | Role::Subpoints => None,
    }
}

/// `text-field` expression reading a per-language property.
pub fn text_field(field: &str) -> JsonValue {
    json!(["get", field])
}

fn object(value: JsonValue) -> JsonObject {
    match value {
        JsonValue::Object(object) => object,
        _ => JsonObject::new(),
    }
}

fn hidden() -> JsonObject {
    object(json!({"visibility": "none"}))
}

fn layer(
    id: &str,
    kind: LayerKind,
    role: Role,
    layout: JsonObject,
    paint: JsonValue,
    min_zoom: Option<f64>,
) -> LayerSpec {
    LayerSpec {
        id: id.to_string(),
        kind,
        source: role.source_id().to_string(),
        layout,
        paint: object(paint),
        min_zoom,
    }
}

pub fn polygons_layer() -> LayerSpec {
    layer(
        POLYGONS_LAYER,
        LayerKind::Fill,
        Role::Polygons,
        hidden(),
        json!({"fill-color": "#33ff99", "fill-opacity": 0.3, "fill-outline-color": "#d7f531"}),
        Some(SUBSIDIARY_MIN_ZOOM),
    )
}

pub fn lines_layer() -> LayerSpec {
    layer(
        LINES_LAYER,
        LayerKind::Line,
        Role::Lines,
        hidden(),
        json!({"line-color": "#ff5773", "line-width": 2}),
        Some(SUBSIDIARY_MIN_ZOOM),
    )
}

pub fn points_layer() -> LayerSpec {
    layer(
        POINTS_LAYER,
        LayerKind::Symbol,
        Role::Points,
        object(json!({
            "icon-image": ["get", "icon_type"],
            "icon-size": 0.09,
            "visibility": "none",
        })),
        json!({}),
        Some(SUBSIDIARY_MIN_ZOOM),
    )
}

pub fn poi_layers() -> [LayerSpec; 3] {
    [
        layer(
            POI_CIRCLES,
            LayerKind::Circle,
            Role::PointsOfInterest,
            JsonObject::new(),
            json!({"circle-radius": 9, "circle-color": "#dc9c3c", "circle-opacity": 1}),
            None,
        ),
        layer(
            POI_LABELS,
            LayerKind::Symbol,
            Role::PointsOfInterest,
            object(json!({
                "text-field": ["get", "labelId"],
                "text-size": 10,
                "text-font": LABEL_FONT,
                "text-anchor": "center",
                "text-allow-overlap": true,
                "text-ignore-placement": true,
                "symbol-placement": "point",
            })),
            json!({"text-color": "white", "text-halo-color": "black", "text-halo-width": 0.6}),
            None,
        ),
        layer(
            POI_POINT_LABELS,
            LayerKind::Symbol,
            Role::PointsOfInterest,
            object(json!({
                "text-field": ["get", "name_en"],
                "text-size": 14,
                "text-font": LABEL_FONT,
                "text-anchor": "bottom-left",
                "text-offset": [0.5, -0.5],
                "text-allow-overlap": false,
                "text-ignore-placement": false,
                "symbol-placement": "point",
                "visibility": "none",
            })),
            json!({"text-color": "white", "text-halo-color": "black", "text-halo-width": 2}),
            None,
        ),
    ]
}

pub fn subpoint_layers() -> [LayerSpec; 2] {
    [
        layer(
            SUBPOINTS_LAYER,
            LayerKind::Symbol,
            Role::Subpoints,
            object(json!({"icon-image": SUBPOINT_ICON, "icon-rotate": 45, "icon-size": 0.1})),
            json!({}),
            Some(SUBSIDIARY_MIN_ZOOM),
        ),
        layer(
            SUBPOINTS_LABELS,
            LayerKind::Symbol,
            Role::Subpoints,
            object(json!({
                "text-field": ["get", "title_en"],
                "text-size": 9,
                "text-font": LABEL_FONT,
                "text-anchor": "right",
                "text-offset": [1.5, -1.5],
                "text-allow-overlap": true,
                "text-ignore-placement": true,
                "symbol-placement": "point",
            })),
            json!({"text-color": "black", "text-halo-color": "white", "text-halo-width": 0.6}),
            Some(SUBSIDIARY_MIN_ZOOM),
        ),
    ]
}

/// Removes every guide layer and source that exists. Missing ones are skipped, failures
/// are logged and do not stop the remaining removals.
pub fn teardown_layers(map: &mut dyn MapEngine) {
    let layers = [
        POI_CIRCLES,
        POI_LABELS,
        POI_POINT_LABELS,
        POLYGONS_LAYER,
        LINES_LAYER,
        POINTS_LAYER,
        SUBPOINTS_LAYER,
        SUBPOINTS_LABELS,
    ];
    for id in layers {
        if map.has_layer(id) {
            if let Err(err) = map.remove_layer(id) {
                log::warn!("Could not remove layer {}: {}", id, err);
            }
        }
    }
    for role in Role::ALL {
        let id = role.source_id();
        if map.has_source(id) {
            if let Err(err) = map.remove_source(id) {
                log::warn!("Could not remove source {}: {}", id, err);
            }
        }
    }
}

/// What `install_layers` managed to create.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub installed: Vec<String>,
    pub skipped: Vec<String>,
}

/// Creates sources and layers for all collections against the current style.
///
/// A layer whose icons fail to load is skipped; everything else is still installed. Empty
/// collections still get their (hidden) layers so later data updates have a target.
pub fn install_layers(
    map: &mut dyn MapEngine,
    collections: &Collections,
    icon_dir: &str,
) -> InstallReport {
    let mut report = InstallReport::default();
    let icon_dir = icon_dir.trim_end_matches('/');

    add_collection(map, &collections.polygons, &[polygons_layer()], &mut report);
    add_collection(map, &collections.lines, &[lines_layer()], &mut report);
    add_collection(map, &collections.points_of_interest, &poi_layers(), &mut report);

    if load_icons(map, icon_dir, [SUBPOINT_ICON]) {
        add_collection(map, &collections.subpoints, &subpoint_layers(), &mut report);
    } else {
        report.skipped.push(SUBPOINTS_LAYER.to_string());
        report.skipped.push(SUBPOINTS_LABELS.to_string());
    }

    let point_icons: BTreeSet<&str> = collections
        .points
        .features
        .iter()
        .filter_map(|feature| feature.icon.as_deref())
        .collect();
    if load_icons(map, icon_dir, point_icons) {
        add_collection(map, &collections.points, &[points_layer()], &mut report);
    } else {
        report.skipped.push(POINTS_LAYER.to_string());
    }

    log::info!(
        "Installed {} layers, skipped {}",
        report.installed.len(),
        report.skipped.len()
    );
    report
}

fn add_collection(
    map: &mut dyn MapEngine,
    collection: &FeatureCollection,
    layers: &[LayerSpec],
    report: &mut InstallReport,
) {
    let source = collection.role.source_id();
    if collection.is_empty() {
        log::warn!("No {} features to add", collection.role.collection_name());
    }
    if let Err(err) = map.add_source(source, collection.to_geojson()) {
        log::error!("Could not add source {}: {}", source, err);
        report
            .skipped
            .extend(layers.iter().map(|layer| layer.id.clone()));
        return;
    }
    for layer in layers {
        match map.add_layer(layer.clone()) {
            Ok(()) => report.installed.push(layer.id.clone()),
            Err(err) => {
                log::error!("Could not add layer {}: {}", layer.id, err);
                report.skipped.push(layer.id.clone());
            }
        }
    }
}

/// Loads every icon not yet registered. Returns `false` if any failed.
fn load_icons<'a>(
    map: &mut dyn MapEngine,
    icon_dir: &str,
    names: impl IntoIterator<Item = &'a str>,
) -> bool {
    let mut all_loaded = true;
    for name in names {
        if map.has_image(name) {
            continue;
        }
        let url = format!("{}/{}.png", icon_dir, name);
        if let Err(err) = map.load_image(name, &url) {
            log::error!("Error loading icon {}: {}", name, err);
            all_loaded = false;
        }
    }
    all_loaded
}

/// Bounded poll for the engine's style to finish loading.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StyleWait {
    pub max_attempts: u32,
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
}

impl Default for StyleWait {
    fn default() -> Self {
        Self {
            max_attempts: 50,
            initial_interval_ms: 100,
            max_interval_ms: 1000,
        }
    }
}

/// Outcome of one poll of the engine's style.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StylePollOutcome {
    Ready,
    /// Not loaded yet; poll again after the delay.
    Retry(Duration),
    GaveUp,
}

/// Bounded, non-blocking poll for the engine's style to finish loading. Each call to
/// [`StylePoll::poll`] checks once; the caller schedules the next check after the returned
/// delay. Delays double from `initial_interval_ms` up to `max_interval_ms`, and the poll gives
/// up after `max_attempts` checks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StylePoll {
    attempts: u32,
    max_attempts: u32,
    interval_ms: u64,
    max_interval_ms: u64,
}

impl StylePoll {
    pub fn new(wait: &StyleWait) -> Self {
        Self {
            attempts: 0,
            max_attempts: wait.max_attempts.max(1),
            interval_ms: wait.initial_interval_ms,
            max_interval_ms: wait.max_interval_ms,
        }
    }

    pub fn poll(&mut self, map: &dyn MapEngine) -> StylePollOutcome {
        if map.is_style_loaded() {
            return StylePollOutcome::Ready;
        }
        self.attempts += 1;
        if self.attempts >= self.max_attempts {
            log::warn!(
                "Style did not finish loading after {} attempts",
                self.attempts
            );
            return StylePollOutcome::GaveUp;
        }
        let delay = Duration::from_millis(self.interval_ms);
        log::debug!("Style not loaded, retrying in {} ms", self.interval_ms);
        self.interval_ms = self.interval_ms.saturating_mul(2).min(self.max_interval_ms);
        StylePollOutcome::Retry(delay)
    }
}
