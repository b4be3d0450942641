//! The guide controller: routes actions to state transitions and engine commands, then runs
//! one synchronization pass.

use std::time::Duration;

use crate::config::{Config, MapConfig};
use crate::feature::geometry::anchor_point;
use crate::feature::{Collections, Role};
use crate::map::engine::{CameraTarget, DomSurface, MapEngine};
use crate::map::layers::{install_layers, teardown_layers, StylePoll, StylePollOutcome, StyleWait};
use crate::source::LoadError;
use crate::view::carousel::Carousel;
use crate::view::content::ImageResolver;
use crate::view::selection::derive;
use crate::view::state::{Action, Basemap, ViewState};
use crate::view::sync::{apply_effects, RenderEffect, SyncSettings, Synchronizer};

/// Fly-to zoom for points of interest without a zoom hint.
pub const POI_ZOOM: f64 = 14.0;
/// Fly-to zoom for subpoints without a zoom hint.
pub const SUBPOINT_ZOOM: f64 = 15.0;

pub struct Guide<M: MapEngine, D: DomSurface> {
    map_config: MapConfig,
    style_wait: StyleWait,
    style_poll: Option<StylePoll>,
    collections: Collections,
    state: ViewState,
    sync: Synchronizer,
    map: M,
    dom: D,
    layers_ready: bool,
    style_retry_after: Option<Duration>,
}

impl<M: MapEngine, D: DomSurface> Guide<M, D> {
    /// Points the engine at the default basemap and frames the home extent. Layers are
    /// installed once the engine reports [`Action::StyleLoaded`].
    pub fn new(config: &Config, mut map: M, dom: D) -> Self {
        let state = ViewState::new();
        map.set_style(config.map.styles.url(state.basemap()));
        map.set_max_bounds(config.map.bounds);
        map.fit_bounds(config.map.home_bounds, config.map.bearing);
        let sync = Synchronizer::new(SyncSettings {
            images: ImageResolver::new(config.map.image_dir.as_str()),
            icon_dir: config.map.icon_dir.clone(),
            guide_link_template: config.map.guide_link_template.clone(),
        });
        Self {
            map_config: config.map.clone(),
            style_wait: config.style_wait.clone(),
            style_poll: None,
            collections: Collections::default(),
            state,
            sync,
            map,
            dom,
            layers_ready: false,
            style_retry_after: None,
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn collections(&self) -> &Collections {
        &self.collections
    }

    pub fn map(&self) -> &M {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut M {
        &mut self.map
    }

    pub fn dom(&self) -> &D {
        &self.dom
    }

    pub fn layers_ready(&self) -> bool {
        self.layers_ready
    }

    /// Delay after which the host should dispatch [`Action::StyleLoaded`] again, while a style
    /// load is still being waited on.
    pub fn style_retry_after(&self) -> Option<Duration> {
        self.style_retry_after
    }

    /// Takes the outcome of a load. A failed load leaves the guide with empty collections.
    pub fn load_data(&mut self, loaded: Result<Collections, LoadError>) -> Vec<RenderEffect> {
        self.collections = match loaded {
            Ok(collections) => collections,
            Err(err) => {
                log::error!("Error fetching features: {}", err);
                Collections::default()
            }
        };
        if self.layers_ready {
            self.rebuild_layers();
        }
        self.synchronize()
    }

    /// Handles one action and returns the effects that were applied.
    pub fn dispatch(&mut self, action: Action) -> Vec<RenderEffect> {
        log::debug!("Dispatching {:?}", action);
        match action {
            Action::ToggleControlPanel => self.state.toggle_control_panel(),
            Action::CloseControlPanel => self.state.close_control_panel(),
            Action::ToggleSidebar => self.state.toggle_sidebar(),
            Action::CloseSidebar => self.state.close_sidebar(),
            Action::ToggleLabels => self.state.toggle_labels(),
            Action::ResetFilters => self.state.clear_filters(),
            Action::ToggleTag(tag) => self.state.toggle_tag(&tag),
            Action::SelectLanguage(language) => self.state.set_language(language),
            Action::SelectBasemap(basemap) => self.select_basemap(basemap),
            Action::ClickFeature(id) => self.focus(&id),
            Action::ClickSidebarEntry(id) => {
                self.focus(&id);
                self.state.close_sidebar();
            }
            Action::ClosePopup => self.state.focus_feature(None),
            Action::Carousel(step) => {
                let image_count = self
                    .state
                    .focused_feature_id()
                    .and_then(|id| self.collections.points_of_interest.get(id))
                    .map_or(0, |feature| feature.image_list().len());
                self.state.advance_carousel(step, image_count);
            }
            Action::OpenViewer => {
                let has_images = self
                    .state
                    .focused_feature_id()
                    .and_then(|id| self.collections.points_of_interest.get(id))
                    .is_some_and(|feature| Carousel::new(feature.image_list()).has_real_images());
                self.state.open_viewer(has_images);
            }
            Action::CloseViewer => self.state.close_viewer(),
            Action::Home => self
                .map
                .fit_bounds(self.map_config.home_bounds, self.map_config.bearing),
            Action::StyleLoaded => self.on_style_loaded(),
        }
        self.synchronize()
    }

    fn focus(&mut self, id: &str) {
        let Some((role, feature)) = self.collections.find(id) else {
            log::warn!("No feature with id {}", id);
            return;
        };
        let default_zoom = match role {
            Role::Subpoints => SUBPOINT_ZOOM,
            _ => POI_ZOOM,
        };
        match anchor_point(&feature.geometry) {
            Some(center) => self.map.fly_to(CameraTarget {
                center,
                zoom: feature.zoom.unwrap_or(default_zoom),
            }),
            None => log::warn!("Feature {} has no anchor point", id),
        }
        self.state.focus_feature(Some(id.to_string()));
    }

    fn select_basemap(&mut self, basemap: Basemap) {
        if !self.state.set_basemap(basemap) {
            return;
        }
        log::info!("Switching basemap to {:?}", basemap);
        self.map.set_style(self.map_config.styles.url(basemap));
        self.sync.invalidate_layers();
        self.layers_ready = false;
        self.style_poll = None;
        self.style_retry_after = None;
    }

    /// Checks the style once. While it is still loading, the poll is kept and
    /// [`Guide::style_retry_after`] tells the host when to check again.
    fn on_style_loaded(&mut self) {
        let mut poll = self
            .style_poll
            .take()
            .unwrap_or_else(|| StylePoll::new(&self.style_wait));
        self.style_retry_after = None;
        match poll.poll(&self.map) {
            StylePollOutcome::Ready => {
                self.rebuild_layers();
                self.layers_ready = true;
            }
            StylePollOutcome::Retry(delay) => {
                self.style_poll = Some(poll);
                self.style_retry_after = Some(delay);
            }
            StylePollOutcome::GaveUp => {
                log::error!("Style never finished loading, layers not installed")
            }
        }
    }

    fn rebuild_layers(&mut self) {
        teardown_layers(&mut self.map);
        install_layers(&mut self.map, &self.collections, &self.map_config.icon_dir);
        self.sync.invalidate_layers();
    }

    fn synchronize(&mut self) -> Vec<RenderEffect> {
        let derived = derive(&self.collections, &self.state);
        let effects = self.sync.plan(&self.state, &derived, self.layers_ready);
        let unapplied = apply_effects(&effects, &mut self.map, &mut self.dom);
        self.sync.forget(&unapplied);
        effects
    }
}
