//! Cross-cutting view state and the named transitions that mutate it.
//!
//! Every user action is expressed as an [`Action`] message. Handlers apply the matching
//! transition to [`ViewState`]; rendering never writes to it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::carousel::wrap_index;
use crate::feature::Language;

/// Base tile style of the map.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Basemap {
    #[default]
    Satellite,
    Streetmap,
}

/// Direction of a carousel step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum CarouselStep {
    Next,
    Previous,
}

impl CarouselStep {
    pub fn delta(&self) -> isize {
        match self {
            CarouselStep::Next => 1,
            CarouselStep::Previous => -1,
        }
    }
}

/// Slide-in panels of the page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub enum Panel {
    ControlPanel,
    Sidebar,
}

/// Discrete user (and engine) events the guide reacts to.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub enum Action {
    ToggleControlPanel,
    CloseControlPanel,
    ToggleSidebar,
    CloseSidebar,
    ToggleLabels,
    ResetFilters,
    SelectBasemap(Basemap),
    ToggleTag(String),
    SelectLanguage(Language),
    /// Click on a map marker (point of interest or subpoint).
    ClickFeature(String),
    /// Click on a sidebar entry; also closes the sidebar.
    ClickSidebarEntry(String),
    ClosePopup,
    Carousel(CarouselStep),
    OpenViewer,
    /// Click on the full-size viewer backdrop.
    CloseViewer,
    Home,
    /// The map engine reported that the current style finished loading.
    StyleLoaded,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ViewState {
    language: Language,
    tag_filter: BTreeSet<String>,
    basemap: Basemap,
    labels_visible: bool,
    focused_feature_id: Option<String>,
    carousel_index: usize,
    viewer_open: bool,
    sidebar_open: bool,
    control_panel_open: bool,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn tag_filter(&self) -> &BTreeSet<String> {
        &self.tag_filter
    }

    pub fn basemap(&self) -> Basemap {
        self.basemap
    }

    pub fn labels_visible(&self) -> bool {
        self.labels_visible
    }

    pub fn focused_feature_id(&self) -> Option<&str> {
        self.focused_feature_id.as_deref()
    }

    pub fn carousel_index(&self) -> usize {
        self.carousel_index
    }

    pub fn viewer_open(&self) -> bool {
        self.viewer_open
    }

    pub fn panel_open(&self, panel: Panel) -> bool {
        match panel {
            Panel::ControlPanel => self.control_panel_open,
            Panel::Sidebar => self.sidebar_open,
        }
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
    }

    /// Adds the tag to the filter, or removes it if already selected.
    pub fn toggle_tag(&mut self, tag: &str) {
        let tag = tag.trim();
        if tag.is_empty() {
            return;
        }
        if !self.tag_filter.remove(tag) {
            self.tag_filter.insert(tag.to_string());
        }
    }

    pub fn clear_filters(&mut self) {
        self.tag_filter.clear();
    }

    /// Returns `true` when the basemap changed, meaning every engine-owned layer has to be
    /// torn down and re-created against the new style.
    pub fn set_basemap(&mut self, basemap: Basemap) -> bool {
        if self.basemap == basemap {
            return false;
        }
        self.basemap = basemap;
        true
    }

    /// Focuses a feature (or clears focus). A new focus starts its carousel at the first
    /// image and closes the full-size viewer.
    pub fn focus_feature(&mut self, id: Option<String>) {
        if self.focused_feature_id != id {
            self.carousel_index = 0;
        }
        self.viewer_open = false;
        self.focused_feature_id = id;
    }

    pub fn toggle_labels(&mut self) {
        self.labels_visible = !self.labels_visible;
    }

    /// Moves the carousel by one step, wrapping around. A no-op for an empty image list.
    pub fn advance_carousel(&mut self, step: CarouselStep, image_count: usize) {
        if image_count == 0 {
            return;
        }
        self.carousel_index = wrap_index(self.carousel_index, step.delta(), image_count);
    }

    pub fn toggle_control_panel(&mut self) {
        self.control_panel_open = !self.control_panel_open;
        if self.control_panel_open {
            self.sidebar_open = false;
        }
    }

    pub fn close_control_panel(&mut self) {
        self.control_panel_open = false;
    }

    pub fn toggle_sidebar(&mut self) {
        self.sidebar_open = !self.sidebar_open;
        if self.sidebar_open {
            self.control_panel_open = false;
        }
    }

    pub fn close_sidebar(&mut self) {
        self.sidebar_open = false;
    }

    /// Opens only while a feature with real images is focused.
    pub fn open_viewer(&mut self, has_images: bool) {
        self.viewer_open = has_images && self.focused_feature_id.is_some();
    }

    pub fn close_viewer(&mut self) {
        self.viewer_open = false;
    }
}
