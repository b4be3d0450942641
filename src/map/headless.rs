//! In-memory map engine and DOM surface. They keep the state a real page would show, so the
//! CLI can replay sessions and tests can assert on what is visible.

use std::collections::{BTreeMap, BTreeSet};

use geojson::JsonValue;

use super::engine::{Bounds, CameraTarget, DomSurface, LayerSpec, MapEngine, MapError};
use crate::view::content::{PopupContent, SidebarEntry};
use crate::view::state::Panel;

#[derive(Clone, Debug, PartialEq)]
pub struct LayerState {
    pub spec: LayerSpec,
    pub filter: Option<JsonValue>,
}

/// Engine that records sources, layers, images, camera moves and popups.
///
/// Like a real engine, switching style drops every source and layer, and the new style
/// only reports loaded once [`HeadlessMap::complete_style_load`] is called.
#[derive(Clone, Debug, Default)]
pub struct HeadlessMap {
    style_url: String,
    style_loaded: bool,
    sources: BTreeMap<String, geojson::FeatureCollection>,
    layers: Vec<LayerState>,
    images: BTreeSet<String>,
    failing_images: BTreeSet<String>,
    popups: Vec<PopupContent>,
    camera: Option<CameraTarget>,
    bounds: Option<(Bounds, f64)>,
    max_bounds: Option<Bounds>,
}

impl HeadlessMap {
    pub fn new(style_url: &str) -> Self {
        Self {
            style_url: style_url.to_string(),
            ..Default::default()
        }
    }

    /// A map whose initial style already finished loading.
    pub fn loaded() -> Self {
        Self {
            style_loaded: true,
            ..Default::default()
        }
    }

    pub fn complete_style_load(&mut self) {
        self.style_loaded = true;
    }

    /// Makes every later load of `name` fail.
    pub fn fail_image(&mut self, name: &str) {
        self.failing_images.insert(name.to_string());
    }

    pub fn style_url(&self) -> &str {
        &self.style_url
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn layer(&self, id: &str) -> Option<&LayerState> {
        self.layers.iter().find(|layer| layer.spec.id == id)
    }

    pub fn layer_ids(&self) -> Vec<&str> {
        self.layers.iter().map(|layer| layer.spec.id.as_str()).collect()
    }

    pub fn layout_value(&self, layer: &str, name: &str) -> Option<JsonValue> {
        self.layer(layer)?.spec.layout.get(name).cloned()
    }

    /// Visibility as the engine would render it: layers default to visible.
    pub fn is_visible(&self, layer: &str) -> bool {
        match self.layout_value(layer, "visibility") {
            Some(JsonValue::String(visibility)) => visibility != "none",
            Some(_) | None => self.layer(layer).is_some(),
        }
    }

    pub fn filter(&self, layer: &str) -> Option<&JsonValue> {
        self.layer(layer)?.filter.as_ref()
    }

    pub fn source(&self, id: &str) -> Option<&geojson::FeatureCollection> {
        self.sources.get(id)
    }

    /// Feature ids currently held by a source.
    pub fn source_ids(&self, id: &str) -> Vec<String> {
        self.sources
            .get(id)
            .map(|collection| {
                collection
                    .features
                    .iter()
                    .filter_map(|feature| match &feature.id {
                        Some(geojson::feature::Id::String(id)) => Some(id.clone()),
                        Some(geojson::feature::Id::Number(id)) => Some(id.to_string()),
                        None => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn popups(&self) -> &[PopupContent] {
        &self.popups
    }

    pub fn camera(&self) -> Option<CameraTarget> {
        self.camera
    }

    pub fn fitted_bounds(&self) -> Option<(Bounds, f64)> {
        self.bounds
    }

    pub fn max_bounds(&self) -> Option<Bounds> {
        self.max_bounds
    }

    fn layer_mut(&mut self, id: &str) -> Result<&mut LayerState, MapError> {
        self.layers
            .iter_mut()
            .find(|layer| layer.spec.id == id)
            .ok_or_else(|| MapError::MissingLayer(id.to_string()))
    }
}

impl MapEngine for HeadlessMap {
    fn set_style(&mut self, style_url: &str) {
        self.style_url = style_url.to_string();
        self.style_loaded = false;
        self.sources.clear();
        self.layers.clear();
        self.images.clear();
    }

    fn is_style_loaded(&self) -> bool {
        self.style_loaded
    }

    fn has_source(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    fn add_source(&mut self, id: &str, data: geojson::FeatureCollection) -> Result<(), MapError> {
        if !self.style_loaded {
            return Err(MapError::StyleNotLoaded);
        }
        if self.sources.contains_key(id) {
            return Err(MapError::DuplicateSource(id.to_string()));
        }
        self.sources.insert(id.to_string(), data);
        Ok(())
    }

    fn set_source_data(
        &mut self,
        id: &str,
        data: geojson::FeatureCollection,
    ) -> Result<(), MapError> {
        let source = self
            .sources
            .get_mut(id)
            .ok_or_else(|| MapError::MissingSource(id.to_string()))?;
        *source = data;
        Ok(())
    }

    fn remove_source(&mut self, id: &str) -> Result<(), MapError> {
        if self.layers.iter().any(|layer| layer.spec.source == id) {
            return Err(MapError::SourceInUse(id.to_string()));
        }
        self.sources
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| MapError::MissingSource(id.to_string()))
    }

    fn has_layer(&self, id: &str) -> bool {
        self.layer(id).is_some()
    }

    fn add_layer(&mut self, layer: LayerSpec) -> Result<(), MapError> {
        if !self.style_loaded {
            return Err(MapError::StyleNotLoaded);
        }
        if self.has_layer(&layer.id) {
            return Err(MapError::DuplicateLayer(layer.id));
        }
        if !self.sources.contains_key(&layer.source) {
            return Err(MapError::MissingSource(layer.source));
        }
        self.layers.push(LayerState {
            spec: layer,
            filter: None,
        });
        Ok(())
    }

    fn remove_layer(&mut self, id: &str) -> Result<(), MapError> {
        let index = self
            .layers
            .iter()
            .position(|layer| layer.spec.id == id)
            .ok_or_else(|| MapError::MissingLayer(id.to_string()))?;
        self.layers.remove(index);
        Ok(())
    }

    fn set_layout_property(
        &mut self,
        layer: &str,
        name: &str,
        value: JsonValue,
    ) -> Result<(), MapError> {
        self.layer_mut(layer)?
            .spec
            .layout
            .insert(name.to_string(), value);
        Ok(())
    }

    fn set_filter(&mut self, layer: &str, filter: Option<JsonValue>) -> Result<(), MapError> {
        self.layer_mut(layer)?.filter = filter;
        Ok(())
    }

    fn has_image(&self, name: &str) -> bool {
        self.images.contains(name)
    }

    fn load_image(&mut self, name: &str, url: &str) -> Result<(), MapError> {
        if self.failing_images.contains(name) {
            return Err(MapError::ImageLoad {
                name: name.to_string(),
                url: url.to_string(),
                reason: "not found".to_string(),
            });
        }
        self.images.insert(name.to_string());
        Ok(())
    }

    fn fly_to(&mut self, target: CameraTarget) {
        self.camera = Some(target);
    }

    fn fit_bounds(&mut self, bounds: Bounds, bearing: f64) {
        self.bounds = Some((bounds, bearing));
    }

    fn set_max_bounds(&mut self, bounds: Bounds) {
        self.max_bounds = Some(bounds);
    }

    fn show_popup(&mut self, popup: &PopupContent) {
        self.popups.push(popup.clone());
    }

    fn remove_popups(&mut self) {
        self.popups.clear();
    }
}

/// DOM surface that keeps the last value written to each element.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HeadlessDom {
    pub sidebar: Vec<SidebarEntry>,
    pub sidebar_renders: usize,
    pub open_panels: BTreeSet<Panel>,
    pub carousel_image: Option<String>,
    pub viewer_image: Option<String>,
    pub labels_button_active: bool,
    pub guide_link: String,
    pub checked_tags: BTreeSet<String>,
}

impl DomSurface for HeadlessDom {
    fn replace_sidebar(&mut self, entries: &[SidebarEntry]) {
        self.sidebar = entries.to_vec();
        self.sidebar_renders += 1;
    }

    fn set_panel_open(&mut self, panel: Panel, open: bool) {
        if open {
            self.open_panels.insert(panel);
        } else {
            self.open_panels.remove(&panel);
        }
    }

    fn set_carousel_image(&mut self, src: Option<&str>) {
        self.carousel_image = src.map(str::to_string);
    }

    fn set_viewer_image(&mut self, src: Option<&str>) {
        self.viewer_image = src.map(str::to_string);
    }

    fn set_labels_button(&mut self, active: bool) {
        self.labels_button_active = active;
    }

    fn set_guide_link(&mut self, href: &str) {
        self.guide_link = href.to_string();
    }

    fn set_checked_tags(&mut self, tags: &BTreeSet<String>) {
        self.checked_tags = tags.clone();
    }
}
