//! Translates view state into render effects on the map and the page.
//!
//! The synchronizer remembers what it last applied and only emits what differs, so running
//! it again with unchanged inputs yields no effects. Subsidiary source data is always emitted
//! before the visibility change that reveals it.

use std::collections::{BTreeMap, BTreeSet};

use geojson::JsonValue;
use serde_json::json;

use super::carousel::Carousel;
use super::content::{guide_link, ImageResolver, PopupContent, SidebarEntry};
use super::selection::DerivedView;
use super::state::{Panel, ViewState};
use crate::feature::model::features_to_geojson;
use crate::feature::Role;
use crate::map::engine::{DomSurface, MapEngine};
use crate::map::layers::{
    subsidiary_layer, text_field, POI_LAYERS, POI_POINT_LABELS, SUBPOINTS_LABELS,
};

#[derive(Clone, Debug, PartialEq)]
pub enum RenderEffect {
    SetSourceData {
        source: &'static str,
        data: geojson::FeatureCollection,
    },
    SetLayerVisibility {
        layer: &'static str,
        visible: bool,
    },
    SetLayerFilter {
        layer: &'static str,
        filter: Option<JsonValue>,
    },
    SetLabelField {
        layer: &'static str,
        field: String,
    },
    ReplaceSidebar(Vec<SidebarEntry>),
    /// Opens the popup, replacing any popup already open.
    OpenPopup(PopupContent),
    ClosePopup,
    SetCarouselImage(Option<String>),
    SetViewerImage(Option<String>),
    SetPanel {
        panel: Panel,
        open: bool,
    },
    SetLabelsButton(bool),
    SetGuideLink(String),
    SetCheckedTags(BTreeSet<String>),
}

/// Static inputs of content rendering.
#[derive(Clone, Debug, PartialEq)]
pub struct SyncSettings {
    pub images: ImageResolver,
    pub icon_dir: String,
    pub guide_link_template: String,
}

/// Engine-owned surface. Lost whenever the style changes.
#[derive(Clone, Debug, Default, PartialEq)]
struct MapSurface {
    source_ids: BTreeMap<&'static str, Vec<String>>,
    visibility: BTreeMap<&'static str, bool>,
    filters: BTreeMap<&'static str, Option<JsonValue>>,
    label_fields: BTreeMap<&'static str, String>,
}

/// Page surface. `None` means "not known to be applied yet".
#[derive(Clone, Debug, Default, PartialEq)]
struct PageSurface {
    sidebar: Option<Vec<SidebarEntry>>,
    popup: Option<Option<PopupContent>>,
    carousel_image: Option<Option<String>>,
    viewer_image: Option<Option<String>>,
    panels: BTreeMap<Panel, bool>,
    labels_button: Option<bool>,
    checked_tags: Option<BTreeSet<String>>,
    guide_link: Option<String>,
}

pub struct Synchronizer {
    settings: SyncSettings,
    map: MapSurface,
    page: PageSurface,
}

impl Synchronizer {
    pub fn new(settings: SyncSettings) -> Self {
        Self {
            settings,
            map: MapSurface::default(),
            page: PageSurface::default(),
        }
    }

    /// Forgets everything applied to engine layers. Called when the style is swapped, so the
    /// next pass re-applies data, visibility, filters and labels to the re-created layers.
    pub fn invalidate_layers(&mut self) {
        self.map = MapSurface::default();
    }

    /// Drops the memory of effects that never reached the engine, so the next pass plans
    /// them again.
    pub fn forget(&mut self, unapplied: &[RenderEffect]) {
        for effect in unapplied {
            match effect {
                RenderEffect::SetSourceData { source, .. } => {
                    self.map.source_ids.remove(source);
                }
                RenderEffect::SetLayerVisibility { layer, .. } => {
                    self.map.visibility.remove(layer);
                }
                RenderEffect::SetLayerFilter { layer, .. } => {
                    self.map.filters.remove(layer);
                }
                RenderEffect::SetLabelField { layer, .. } => {
                    self.map.label_fields.remove(layer);
                }
                _ => {}
            }
        }
    }

    /// Effects needed to bring the surfaces in line with `state`. Engine effects are only
    /// planned while `map_ready`; until then they stay pending.
    pub fn plan(
        &mut self,
        state: &ViewState,
        derived: &DerivedView<'_>,
        map_ready: bool,
    ) -> Vec<RenderEffect> {
        let mut effects = Vec::new();
        if map_ready {
            self.plan_map(state, derived, &mut effects);
        }
        self.plan_page(state, derived, &mut effects);
        effects
    }

    fn plan_map(
        &mut self,
        state: &ViewState,
        derived: &DerivedView<'_>,
        effects: &mut Vec<RenderEffect>,
    ) {
        let mut visibility = Vec::new();
        for role in Role::SUBSIDIARY {
            let Some(layer) = subsidiary_layer(role) else { continue };
            let matches = derived.subsidiaries(role);
            let visible = !matches.is_empty();
            if visible {
                let ids: Vec<String> = matches.iter().map(|feature| feature.id.clone()).collect();
                let source = role.source_id();
                if self.map.source_ids.get(source) != Some(&ids) {
                    effects.push(RenderEffect::SetSourceData {
                        source,
                        data: features_to_geojson(matches.iter().copied()),
                    });
                    self.map.source_ids.insert(source, ids);
                }
            }
            visibility.push((layer, visible));
        }
        visibility.push((POI_POINT_LABELS, state.labels_visible()));

        for (layer, visible) in visibility {
            if self.map.visibility.get(layer) != Some(&visible) {
                effects.push(RenderEffect::SetLayerVisibility { layer, visible });
                self.map.visibility.insert(layer, visible);
            }
        }

        let filter = poi_filter(state, derived);
        for layer in POI_LAYERS {
            if self.map.filters.get(layer) != Some(&filter) {
                effects.push(RenderEffect::SetLayerFilter {
                    layer,
                    filter: filter.clone(),
                });
                self.map.filters.insert(layer, filter.clone());
            }
        }

        let code = state.language().code();
        for (layer, field) in [
            (POI_POINT_LABELS, format!("name_{}", code)),
            (SUBPOINTS_LABELS, format!("title_{}", code)),
        ] {
            if self.map.label_fields.get(layer) != Some(&field) {
                effects.push(RenderEffect::SetLabelField {
                    layer,
                    field: field.clone(),
                });
                self.map.label_fields.insert(layer, field);
            }
        }
    }

    fn plan_page(
        &mut self,
        state: &ViewState,
        derived: &DerivedView<'_>,
        effects: &mut Vec<RenderEffect>,
    ) {
        let language = state.language();
        let settings = &self.settings;

        let sidebar: Vec<SidebarEntry> = derived
            .points_of_interest
            .iter()
            .map(|feature| SidebarEntry::for_feature(feature, language, &settings.images))
            .collect();
        if self.page.sidebar.as_ref() != Some(&sidebar) {
            effects.push(RenderEffect::ReplaceSidebar(sidebar.clone()));
            self.page.sidebar = Some(sidebar);
        }

        let popup = derived.focus.as_ref().and_then(|focus| {
            PopupContent::for_feature(
                focus.feature,
                focus.role,
                language,
                0,
                &settings.images,
                &settings.icon_dir,
            )
        });
        if self.page.popup.as_ref() != Some(&popup) {
            match &popup {
                Some(content) => {
                    effects.push(RenderEffect::OpenPopup(content.clone()));
                    // A freshly rendered popup shows its first image again.
                    self.page.carousel_image = None;
                }
                None => effects.push(RenderEffect::ClosePopup),
            }
            self.page.popup = Some(popup);
        }

        let carousel = derived
            .focus
            .as_ref()
            .filter(|focus| focus.role == Role::PointsOfInterest)
            .map(|focus| Carousel::with_index(focus.feature.image_list(), state.carousel_index()));
        let carousel_image = carousel
            .as_ref()
            .map(|carousel| settings.images.resolve(carousel.current()));
        if self.page.carousel_image.as_ref() != Some(&carousel_image) {
            effects.push(RenderEffect::SetCarouselImage(carousel_image.clone()));
            self.page.carousel_image = Some(carousel_image);
        }

        let viewer_image = carousel
            .as_ref()
            .filter(|carousel| state.viewer_open() && carousel.has_real_images())
            .map(|carousel| settings.images.resolve(carousel.current()));
        if self.page.viewer_image.as_ref() != Some(&viewer_image) {
            effects.push(RenderEffect::SetViewerImage(viewer_image.clone()));
            self.page.viewer_image = Some(viewer_image);
        }

        for panel in [Panel::ControlPanel, Panel::Sidebar] {
            let open = state.panel_open(panel);
            if self.page.panels.get(&panel) != Some(&open) {
                effects.push(RenderEffect::SetPanel { panel, open });
                self.page.panels.insert(panel, open);
            }
        }

        let labels_button = state.labels_visible();
        if self.page.labels_button != Some(labels_button) {
            effects.push(RenderEffect::SetLabelsButton(labels_button));
            self.page.labels_button = Some(labels_button);
        }

        if self.page.checked_tags.as_ref() != Some(state.tag_filter()) {
            effects.push(RenderEffect::SetCheckedTags(state.tag_filter().clone()));
            self.page.checked_tags = Some(state.tag_filter().clone());
        }

        let link = guide_link(&settings.guide_link_template, language);
        if self.page.guide_link.as_ref() != Some(&link) {
            effects.push(RenderEffect::SetGuideLink(link.clone()));
            self.page.guide_link = Some(link);
        }
    }
}

/// Engine filter selecting the points of interest that pass the tag filter, or no filter
/// when no tag is selected.
fn poi_filter(state: &ViewState, derived: &DerivedView<'_>) -> Option<JsonValue> {
    if state.tag_filter().is_empty() {
        return None;
    }
    Some(json!(["in", ["get", "id"], ["literal", derived.visible_poi_ids]]))
}

/// Applies effects in order. Effects aimed at layers or sources that do not exist (for
/// example mid style swap) are skipped; engine errors are logged and do not stop the rest.
///
/// Returns the effects that did not reach the engine, to be handed to
/// [`Synchronizer::forget`].
pub fn apply_effects(
    effects: &[RenderEffect],
    map: &mut dyn MapEngine,
    dom: &mut dyn DomSurface,
) -> Vec<RenderEffect> {
    let mut unapplied = Vec::new();
    for effect in effects {
        let result = match effect {
            RenderEffect::SetSourceData { source, data } => {
                if !map.has_source(source) {
                    log::debug!("Source {} not found", source);
                    unapplied.push(effect.clone());
                    continue;
                }
                map.set_source_data(source, data.clone())
            }
            RenderEffect::SetLayerVisibility { layer, visible } => {
                if !map.has_layer(layer) {
                    log::debug!("Layer {} not found", layer);
                    unapplied.push(effect.clone());
                    continue;
                }
                let visibility = if *visible { "visible" } else { "none" };
                map.set_layout_property(layer, "visibility", json!(visibility))
            }
            RenderEffect::SetLayerFilter { layer, filter } => {
                if !map.has_layer(layer) {
                    log::debug!("Layer {} not found", layer);
                    unapplied.push(effect.clone());
                    continue;
                }
                map.set_filter(layer, filter.clone())
            }
            RenderEffect::SetLabelField { layer, field } => {
                if !map.has_layer(layer) {
                    log::debug!("Layer {} not found", layer);
                    unapplied.push(effect.clone());
                    continue;
                }
                map.set_layout_property(layer, "text-field", text_field(field))
            }
            RenderEffect::ReplaceSidebar(entries) => {
                dom.replace_sidebar(entries);
                Ok(())
            }
            RenderEffect::OpenPopup(popup) => {
                map.remove_popups();
                map.show_popup(popup);
                Ok(())
            }
            RenderEffect::ClosePopup => {
                map.remove_popups();
                Ok(())
            }
            RenderEffect::SetCarouselImage(src) => {
                dom.set_carousel_image(src.as_deref());
                Ok(())
            }
            RenderEffect::SetViewerImage(src) => {
                dom.set_viewer_image(src.as_deref());
                Ok(())
            }
            RenderEffect::SetPanel { panel, open } => {
                dom.set_panel_open(*panel, *open);
                Ok(())
            }
            RenderEffect::SetLabelsButton(active) => {
                dom.set_labels_button(*active);
                Ok(())
            }
            RenderEffect::SetGuideLink(href) => {
                dom.set_guide_link(href);
                Ok(())
            }
            RenderEffect::SetCheckedTags(tags) => {
                dom.set_checked_tags(tags);
                Ok(())
            }
        };
        if let Err(err) = result {
            log::error!("Could not apply {}: {}", effect_name(effect), err);
            unapplied.push(effect.clone());
        }
    }
    unapplied
}

fn effect_name(effect: &RenderEffect) -> &'static str {
    match effect {
        RenderEffect::SetSourceData { .. } => "SetSourceData",
        RenderEffect::SetLayerVisibility { .. } => "SetLayerVisibility",
        RenderEffect::SetLayerFilter { .. } => "SetLayerFilter",
        RenderEffect::SetLabelField { .. } => "SetLabelField",
        RenderEffect::ReplaceSidebar(_) => "ReplaceSidebar",
        RenderEffect::OpenPopup(_) => "OpenPopup",
        RenderEffect::ClosePopup => "ClosePopup",
        RenderEffect::SetCarouselImage(_) => "SetCarouselImage",
        RenderEffect::SetViewerImage(_) => "SetViewerImage",
        RenderEffect::SetPanel { .. } => "SetPanel",
        RenderEffect::SetLabelsButton(_) => "SetLabelsButton",
        RenderEffect::SetGuideLink(_) => "SetGuideLink",
        RenderEffect::SetCheckedTags(_) => "SetCheckedTags",
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::feature::model::tests::point_feature;
    use crate::feature::{Collections, Feature, Language};
    use crate::map::headless::{HeadlessDom, HeadlessMap};
    use crate::map::layers::{install_layers, LINES_LAYER, POI_CIRCLES, POLYGONS_LAYER};
    use crate::view::selection::derive;
    use crate::view::state::CarouselStep;

    fn settings() -> SyncSettings {
        SyncSettings {
            images: ImageResolver::new("images"),
            icon_dir: "icons".to_string(),
            guide_link_template: "guide_{lang}.pdf".to_string(),
        }
    }

    fn associated(id: &str, parent: &str) -> Feature {
        let mut feature = point_feature(id, id, "");
        feature.association = Some(parent.to_string());
        feature
    }

    #[fixture]
    fn collections() -> Collections {
        let mut collections = Collections::default();
        let mut heron = point_feature("poi_12", "Heron Pond", "Estanque de Garzas");
        heron.tags = "restroom,parking".to_string();
        heron.images = "image1,image2,image3".to_string();
        let mut launch = point_feature("poi_13", "Boat Launch", "");
        launch.tags = "boats".to_string();
        collections.points_of_interest.features = vec![heron, launch];
        collections.lines.features = vec![
            associated("line_1", "Heron Pond"),
            associated("line_2", "Boat Launch"),
        ];
        collections.polygons.features = vec![associated("area_1", "Heron Pond")];
        collections
    }

    fn run(
        sync: &mut Synchronizer,
        collections: &Collections,
        state: &ViewState,
        map: &mut HeadlessMap,
        dom: &mut HeadlessDom,
    ) -> Vec<RenderEffect> {
        let derived = derive(collections, state);
        let effects = sync.plan(state, &derived, true);
        let unapplied = apply_effects(&effects, map, dom);
        sync.forget(&unapplied);
        effects
    }

    fn setup(collections: &Collections) -> (Synchronizer, HeadlessMap, HeadlessDom) {
        let mut map = HeadlessMap::loaded();
        install_layers(&mut map, collections, "icons");
        (Synchronizer::new(settings()), map, HeadlessDom::default())
    }

    #[rstest]
    fn test_second_pass_is_empty(collections: Collections) {
        let (mut sync, mut map, mut dom) = setup(&collections);
        let mut state = ViewState::new();
        state.focus_feature(Some("poi_12".to_string()));
        state.toggle_tag("restroom");

        let first = run(&mut sync, &collections, &state, &mut map, &mut dom);
        assert!(!first.is_empty());
        let layers_after_first = map.layer_ids().len();
        let second = run(&mut sync, &collections, &state, &mut map, &mut dom);
        assert!(second.is_empty());
        assert_eq!(map.popups().len(), 1);
        assert_eq!(map.layer_ids().len(), layers_after_first);
    }

    #[rstest]
    fn test_source_data_precedes_visibility(collections: Collections) {
        let (mut sync, mut map, mut dom) = setup(&collections);
        let mut state = ViewState::new();
        state.focus_feature(Some("poi_12".to_string()));
        let effects = run(&mut sync, &collections, &state, &mut map, &mut dom);

        let data_at = effects
            .iter()
            .position(|effect| {
                matches!(effect, RenderEffect::SetSourceData { source: "lines", .. })
            })
            .unwrap();
        let visible_at = effects
            .iter()
            .position(|effect| {
                matches!(
                    effect,
                    RenderEffect::SetLayerVisibility {
                        layer: LINES_LAYER,
                        visible: true
                    }
                )
            })
            .unwrap();
        assert!(data_at < visible_at);
        assert_eq!(map.source_ids("lines"), vec!["line_1"]);
        assert!(map.is_visible(LINES_LAYER));
        assert!(map.is_visible(POLYGONS_LAYER));
        assert!(!map.is_visible(crate::map::layers::POINTS_LAYER));
    }

    #[rstest]
    fn test_refocus_replaces_single_popup(collections: Collections) {
        let (mut sync, mut map, mut dom) = setup(&collections);
        let mut state = ViewState::new();
        state.focus_feature(Some("poi_12".to_string()));
        run(&mut sync, &collections, &state, &mut map, &mut dom);
        state.focus_feature(Some("poi_13".to_string()));
        run(&mut sync, &collections, &state, &mut map, &mut dom);
        assert_eq!(map.popups().len(), 1);
        assert_eq!(map.popups()[0].title, "Boat Launch");
        assert_eq!(map.source_ids("lines"), vec!["line_2"]);
        assert!(!map.is_visible(POLYGONS_LAYER));

        state.focus_feature(None);
        run(&mut sync, &collections, &state, &mut map, &mut dom);
        assert!(map.popups().is_empty());
        assert!(!map.is_visible(LINES_LAYER));
    }

    #[rstest]
    fn test_filter_uses_passing_ids(collections: Collections) {
        let (mut sync, mut map, mut dom) = setup(&collections);
        let mut state = ViewState::new();
        state.toggle_tag("restroom");
        run(&mut sync, &collections, &state, &mut map, &mut dom);
        let expected = json!(["in", ["get", "id"], ["literal", ["poi_12"]]]);
        for layer in POI_LAYERS {
            assert_eq!(map.filter(layer), Some(&expected));
        }
        assert!(dom.checked_tags.contains("restroom"));

        state.clear_filters();
        run(&mut sync, &collections, &state, &mut map, &mut dom);
        assert_eq!(map.filter(POI_CIRCLES), None);
    }

    #[rstest]
    fn test_language_round_trip(collections: Collections) {
        let (mut sync, mut map, mut dom) = setup(&collections);
        let mut state = ViewState::new();
        state.focus_feature(Some("poi_12".to_string()));
        run(&mut sync, &collections, &state, &mut map, &mut dom);
        let titles_en: Vec<String> = dom.sidebar.iter().map(|entry| entry.title.clone()).collect();
        let popup_en = map.popups()[0].title.clone();

        state.set_language(Language::Es);
        run(&mut sync, &collections, &state, &mut map, &mut dom);
        let titles_es: Vec<&str> = dom.sidebar.iter().map(|entry| entry.title.as_str()).collect();
        assert_eq!(titles_es, vec!["Estanque de Garzas", ""]);
        assert_eq!(
            map.layout_value(POI_POINT_LABELS, "text-field"),
            Some(json!(["get", "name_es"]))
        );
        assert_eq!(dom.guide_link, "guide_es.pdf");

        state.set_language(Language::En);
        run(&mut sync, &collections, &state, &mut map, &mut dom);
        let titles: Vec<String> = dom.sidebar.iter().map(|entry| entry.title.clone()).collect();
        assert_eq!(titles, titles_en);
        assert_eq!(map.popups()[0].title, popup_en);
        assert_eq!(
            map.layout_value(POI_POINT_LABELS, "text-field"),
            Some(json!(["get", "name_en"]))
        );
    }

    #[rstest]
    fn test_carousel_updates_image_only(collections: Collections) {
        let (mut sync, mut map, mut dom) = setup(&collections);
        let mut state = ViewState::new();
        state.focus_feature(Some("poi_12".to_string()));
        run(&mut sync, &collections, &state, &mut map, &mut dom);
        assert_eq!(dom.carousel_image.as_deref(), Some("images/image1.jpg"));

        state.advance_carousel(CarouselStep::Previous, 3);
        let effects = run(&mut sync, &collections, &state, &mut map, &mut dom);
        assert_eq!(
            effects,
            vec![RenderEffect::SetCarouselImage(Some(
                "images/image3.jpg".to_string()
            ))]
        );

        state.open_viewer(true);
        run(&mut sync, &collections, &state, &mut map, &mut dom);
        assert_eq!(dom.viewer_image.as_deref(), Some("images/image3.jpg"));
        state.close_viewer();
        run(&mut sync, &collections, &state, &mut map, &mut dom);
        assert_eq!(dom.viewer_image, None);
    }

    #[rstest]
    fn test_invalidate_reapplies_layer_state(collections: Collections) {
        let (mut sync, mut map, mut dom) = setup(&collections);
        let mut state = ViewState::new();
        state.toggle_tag("boats");
        state.toggle_labels();
        run(&mut sync, &collections, &state, &mut map, &mut dom);

        let mut fresh = HeadlessMap::loaded();
        install_layers(&mut fresh, &collections, "icons");
        sync.invalidate_layers();
        let effects = run(&mut sync, &collections, &state, &mut fresh, &mut dom);
        assert!(effects
            .iter()
            .all(|effect| !matches!(effect, RenderEffect::ReplaceSidebar(_))));
        let expected = json!(["in", ["get", "id"], ["literal", ["poi_13"]]]);
        assert_eq!(fresh.filter(POI_CIRCLES), Some(&expected));
        assert!(fresh.is_visible(POI_POINT_LABELS));
    }

    #[rstest]
    fn test_missing_layers_are_skipped(collections: Collections) {
        let mut map = HeadlessMap::loaded();
        let mut dom = HeadlessDom::default();
        let mut sync = Synchronizer::new(settings());
        let mut state = ViewState::new();
        state.focus_feature(Some("poi_12".to_string()));
        run(&mut sync, &collections, &state, &mut map, &mut dom);
        assert_eq!(map.layer_count(), 0);
        assert_eq!(map.popups().len(), 1);
        assert_eq!(dom.sidebar.len(), 2);
    }

    #[rstest]
    fn test_skipped_effects_are_planned_again(collections: Collections) {
        let mut map = HeadlessMap::loaded();
        let mut dom = HeadlessDom::default();
        let mut sync = Synchronizer::new(settings());
        let mut state = ViewState::new();
        state.toggle_tag("restroom");
        state.toggle_labels();
        state.focus_feature(Some("poi_12".to_string()));
        run(&mut sync, &collections, &state, &mut map, &mut dom);
        assert_eq!(map.layer_count(), 0);

        install_layers(&mut map, &collections, "icons");
        let effects = run(&mut sync, &collections, &state, &mut map, &mut dom);
        assert!(effects
            .iter()
            .any(|effect| matches!(effect, RenderEffect::SetSourceData { .. })));
        let expected = json!(["in", ["get", "id"], ["literal", ["poi_12"]]]);
        for layer in POI_LAYERS {
            assert_eq!(map.filter(layer), Some(&expected));
        }
        assert!(map.is_visible(POI_POINT_LABELS));
        assert!(map.is_visible(POLYGONS_LAYER));
        assert_eq!(map.source_ids("polygons"), vec!["area_1"]);
        assert!(run(&mut sync, &collections, &state, &mut map, &mut dom).is_empty());
    }

    #[rstest]
    fn test_map_effects_wait_for_readiness(collections: Collections) {
        let mut sync = Synchronizer::new(settings());
        let state = ViewState::new();
        let derived = derive(&collections, &state);
        let effects = sync.plan(&state, &derived, false);
        assert!(effects.iter().all(|effect| !matches!(
            effect,
            RenderEffect::SetLayerVisibility { .. }
                | RenderEffect::SetLayerFilter { .. }
                | RenderEffect::SetLabelField { .. }
                | RenderEffect::SetSourceData { .. }
        )));
        let effects = sync.plan(&state, &derived, true);
        assert!(effects
            .iter()
            .any(|effect| matches!(effect, RenderEffect::SetLayerFilter { .. })));
    }
}
