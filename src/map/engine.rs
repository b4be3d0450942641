//! Capabilities consumed from the map rendering engine and the page DOM.

use std::collections::BTreeSet;

use geojson::{JsonObject, JsonValue};

use crate::view::content::{PopupContent, SidebarEntry};
use crate::view::state::Panel;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum MapError {
    #[error("source {0} does not exist")]
    MissingSource(String),
    #[error("layer {0} does not exist")]
    MissingLayer(String),
    #[error("source {0} already exists")]
    DuplicateSource(String),
    #[error("layer {0} already exists")]
    DuplicateLayer(String),
    #[error("source {0} is still used by a layer")]
    SourceInUse(String),
    #[error("style is not loaded")]
    StyleNotLoaded,
    #[error("could not load image {name} from {url}: {reason}")]
    ImageLoad {
        name: String,
        url: String,
        reason: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerKind {
    Fill,
    Line,
    Circle,
    Symbol,
}

/// Description of a layer as handed to the engine.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerSpec {
    pub id: String,
    pub kind: LayerKind,
    pub source: String,
    pub layout: JsonObject,
    pub paint: JsonObject,
    pub min_zoom: Option<f64>,
}

/// `[[west, south], [east, north]]` in degrees.
pub type Bounds = [[f64; 2]; 2];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraTarget {
    pub center: geo::Point,
    pub zoom: f64,
}

/// Map engine operations the guide relies on.
pub trait MapEngine {
    fn set_style(&mut self, style_url: &str);
    fn is_style_loaded(&self) -> bool;

    fn has_source(&self, id: &str) -> bool;
    fn add_source(&mut self, id: &str, data: geojson::FeatureCollection) -> Result<(), MapError>;
    fn set_source_data(
        &mut self,
        id: &str,
        data: geojson::FeatureCollection,
    ) -> Result<(), MapError>;
    fn remove_source(&mut self, id: &str) -> Result<(), MapError>;

    fn has_layer(&self, id: &str) -> bool;
    fn add_layer(&mut self, layer: LayerSpec) -> Result<(), MapError>;
    fn remove_layer(&mut self, id: &str) -> Result<(), MapError>;
    fn set_layout_property(
        &mut self,
        layer: &str,
        name: &str,
        value: JsonValue,
    ) -> Result<(), MapError>;
    fn set_filter(&mut self, layer: &str, filter: Option<JsonValue>) -> Result<(), MapError>;

    fn has_image(&self, name: &str) -> bool;
    /// Fetches an icon and registers it under `name`.
    fn load_image(&mut self, name: &str, url: &str) -> Result<(), MapError>;

    fn fly_to(&mut self, target: CameraTarget);
    fn fit_bounds(&mut self, bounds: Bounds, bearing: f64);
    /// Limits panning to `bounds`.
    fn set_max_bounds(&mut self, bounds: Bounds);

    fn show_popup(&mut self, popup: &PopupContent);
    fn remove_popups(&mut self);
}

/// Page surfaces outside the map.
pub trait DomSurface {
    fn replace_sidebar(&mut self, entries: &[SidebarEntry]);
    fn set_panel_open(&mut self, panel: Panel, open: bool);
    fn set_carousel_image(&mut self, src: Option<&str>);
    /// `None` removes the full-size viewer.
    fn set_viewer_image(&mut self, src: Option<&str>);
    fn set_labels_button(&mut self, active: bool);
    fn set_guide_link(&mut self, href: &str);
    fn set_checked_tags(&mut self, tags: &BTreeSet<String>);
}
