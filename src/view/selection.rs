use std::collections::BTreeSet;

use super::state::ViewState;
use crate::feature::{Collections, Feature, FeatureCollection, Role};

/// Name of the property linking subsidiary features to their point of interest.
pub const ASSOCIATION_KEY: &str = "feature";

/// Marker label for the active language. Missing names are empty, never a fallback.
pub fn label_for<'a>(feature: &'a Feature, state: &ViewState) -> &'a str {
    &feature.text(state.language()).name
}

/// Subsidiary features belonging to `focused`, in input order.
///
/// An empty result means the subsidiary layer should be hidden.
pub fn subsidiaries_for<'a>(
    focused: &Feature,
    subsidiaries: &'a FeatureCollection,
    association_key: &str,
) -> Vec<&'a Feature> {
    let key = focused.name_key();
    if key.is_empty() {
        return Vec::new();
    }
    subsidiaries
        .features
        .iter()
        .filter(|feature| association_value(feature, association_key) == Some(key))
        .collect()
}

fn association_value<'a>(feature: &'a Feature, association_key: &str) -> Option<&'a str> {
    if association_key == ASSOCIATION_KEY {
        return feature.association.as_deref();
    }
    feature
        .properties
        .get(association_key)
        .and_then(|value| value.as_str())
}

/// True when no tag is selected, or when the feature carries every selected tag.
pub fn passes_filter(feature: &Feature, tag_filter: &BTreeSet<String>) -> bool {
    if tag_filter.is_empty() {
        return true;
    }
    let tags = feature.tag_list();
    tag_filter.iter().all(|tag| tags.contains(tag))
}

/// Feature the popup is bound to.
#[derive(Clone, Debug, PartialEq)]
pub struct Focus<'a> {
    pub role: Role,
    pub feature: &'a Feature,
}

/// Everything the synchronizer needs that is derived from collections plus state.
#[derive(Clone, Debug, PartialEq)]
pub struct DerivedView<'a> {
    /// Every point of interest, for the sidebar list.
    pub points_of_interest: &'a [Feature],
    /// Points of interest passing the tag filter, in collection order.
    pub visible_poi_ids: Vec<&'a str>,
    pub polygons: Vec<&'a Feature>,
    pub lines: Vec<&'a Feature>,
    pub points: Vec<&'a Feature>,
    pub focus: Option<Focus<'a>>,
}

impl<'a> DerivedView<'a> {
    pub fn subsidiaries(&self, role: Role) -> &[&'a Feature] {
        match role {
            Role::Polygons => &self.polygons,
            Role::Lines => &self.lines,
            Role::Points => &self.points,
            Role::PointsOfInterest | Role::Subpoints => &[],
        }
    }
}

/// Recomputes the derived view. Pure: depends only on its inputs.
pub fn derive<'a>(collections: &'a Collections, state: &ViewState) -> DerivedView<'a> {
    let visible_poi_ids = collections
        .points_of_interest
        .features
        .iter()
        .filter(|feature| passes_filter(feature, state.tag_filter()))
        .map(|feature| feature.id.as_str())
        .collect();

    let focus = state
        .focused_feature_id()
        .and_then(|id| collections.find(id))
        .map(|(role, feature)| Focus { role, feature });

    let parent = focus.as_ref().and_then(|focus| match focus.role {
        Role::Subpoints => parent_of(collections, focus.feature),
        _ => Some(focus.feature),
    });

    let select = |role: Role| match parent {
        Some(parent) => subsidiaries_for(parent, collections.get(role), ASSOCIATION_KEY),
        None => Vec::new(),
    };

    DerivedView {
        points_of_interest: &collections.points_of_interest.features,
        visible_poi_ids,
        polygons: select(Role::Polygons),
        lines: select(Role::Lines),
        points: select(Role::Points),
        focus,
    }
}

/// Point of interest a subpoint hangs off, through its association key.
fn parent_of<'a>(collections: &'a Collections, subpoint: &Feature) -> Option<&'a Feature> {
    let key = subpoint.association.as_deref()?;
    collections
        .points_of_interest
        .features
        .iter()
        .find(|feature| feature.name_key() == key)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::feature::model::tests::point_feature;
    use crate::feature::Language;

    fn tagged(id: &str, tags: &str) -> Feature {
        let mut feature = point_feature(id, id, "");
        feature.tags = tags.to_string();
        feature
    }

    fn associated(id: &str, parent: &str) -> Feature {
        let mut feature = point_feature(id, id, "");
        feature.association = Some(parent.to_string());
        feature
    }

    fn tags(tags: &[&str]) -> BTreeSet<String> {
        tags.iter().map(|tag| tag.to_string()).collect()
    }

    #[rstest]
    #[case(&[], true)]
    #[case(&["restroom"], true)]
    #[case(&["boats"], false)]
    #[case(&["restroom", "boats"], false)]
    #[case(&["restroom", "parking"], true)]
    fn test_passes_filter_requires_every_tag(#[case] filter: &[&str], #[case] expected: bool) {
        let feature = tagged("poi_12", "restroom, parking");
        assert_eq!(passes_filter(&feature, &tags(filter)), expected);
    }

    #[rstest]
    fn test_passes_filter_matches_whole_tags() {
        let feature = tagged("poi_1", "parking");
        assert!(!passes_filter(&feature, &tags(&["park"])));
    }

    #[rstest]
    fn test_label_for_follows_language() {
        let with_es = point_feature("poi_1", "Heron Pond", "Estanque de Garzas");
        let without_es = point_feature("poi_2", "Boat Launch", "");
        let mut state = ViewState::new();
        assert_eq!(label_for(&with_es, &state), "Heron Pond");
        state.set_language(Language::Es);
        assert_eq!(label_for(&with_es, &state), "Estanque de Garzas");
        assert_eq!(label_for(&without_es, &state), "");
        state.set_language(Language::En);
        assert_eq!(label_for(&without_es, &state), "Boat Launch");
    }

    #[rstest]
    fn test_subsidiaries_keep_input_order() {
        let focused = point_feature("poi_12", "Heron Pond", "");
        let lines = FeatureCollection {
            role: Role::Lines,
            features: vec![
                associated("line_3", "Heron Pond"),
                associated("line_1", "Other"),
                associated("line_2", "Heron Pond"),
            ],
        };
        let ids: Vec<&str> = subsidiaries_for(&focused, &lines, ASSOCIATION_KEY)
            .iter()
            .map(|feature| feature.id.as_str())
            .collect();
        assert_eq!(ids, vec!["line_3", "line_2"]);
    }

    #[rstest]
    fn test_no_subsidiaries_is_empty() {
        let focused = point_feature("poi_12", "Heron Pond", "");
        let lines = FeatureCollection::empty(Role::Lines);
        assert!(subsidiaries_for(&focused, &lines, ASSOCIATION_KEY).is_empty());
    }

    #[rstest]
    fn test_derive_through_subpoint_parent() {
        let mut collections = Collections::default();
        collections
            .points_of_interest
            .features
            .push(point_feature("poi_12", "Heron Pond", ""));
        collections
            .subpoints
            .features
            .push(associated("sub_1", "Heron Pond"));
        collections
            .polygons
            .features
            .push(associated("area_1", "Heron Pond"));

        let mut state = ViewState::new();
        state.focus_feature(Some("sub_1".to_string()));
        let derived = derive(&collections, &state);
        assert_eq!(derived.focus.as_ref().unwrap().role, Role::Subpoints);
        assert_eq!(derived.polygons.len(), 1);
        assert!(derived.lines.is_empty());
    }

    #[rstest]
    fn test_derive_filters_points_of_interest() {
        let mut collections = Collections::default();
        collections.points_of_interest.features = vec![
            tagged("poi_1", "restroom,parking"),
            tagged("poi_2", "parking"),
            tagged("poi_3", "restroom"),
        ];
        let mut state = ViewState::new();
        state.toggle_tag("restroom");
        let derived = derive(&collections, &state);
        assert_eq!(derived.visible_poi_ids, vec!["poi_1", "poi_3"]);
        assert!(derived.focus.is_none());
    }
}
