//! Content models for popups, sidebar cards and image references.

use super::carousel::{Carousel, ImageRef, NO_IMAGE_SENTINEL};
use crate::feature::geometry::anchor_point;
use crate::feature::{Feature, Language, Role};

/// Characters of content shown on a sidebar card before truncation.
pub const SIDEBAR_DESCRIPTION_CHARS: usize = 100;

/// Turns image references into URLs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageResolver {
    pub image_dir: String,
}

impl ImageResolver {
    pub fn new(image_dir: impl Into<String>) -> Self {
        Self {
            image_dir: image_dir.into().trim_end_matches('/').to_string(),
        }
    }

    /// Absolute `http(s)` references pass through; bare names live in the image directory.
    pub fn resolve(&self, image: ImageRef<'_>) -> String {
        match image {
            ImageRef::Image(reference)
                if reference.starts_with("http://") || reference.starts_with("https://") =>
            {
                reference.to_string()
            }
            ImageRef::Image(reference) => format!("{}/{}.jpg", self.image_dir, reference),
            ImageRef::Placeholder => format!("{}/{}.png", self.image_dir, NO_IMAGE_SENTINEL),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapLink {
    pub provider: &'static str,
    pub url: String,
}

/// Links to open a position in external map apps.
pub fn map_links(lat: f64, lon: f64) -> Vec<MapLink> {
    vec![
        MapLink {
            provider: "Google Maps",
            url: format!("https://maps.google.com/?q={},{}", lat, lon),
        },
        MapLink {
            provider: "Apple Maps",
            url: format!("http://maps.apple.com/?q={},{}", lat, lon),
        },
        MapLink {
            provider: "Bing Maps",
            url: format!("https://bing.com/maps/default.aspx?cp={}~{}&lvl=15", lat, lon),
        },
    ]
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagIcon {
    pub tag: String,
    pub src: String,
}

/// Detail overlay for the focused feature.
#[derive(Clone, Debug, PartialEq)]
pub struct PopupContent {
    pub feature_id: String,
    pub role: Role,
    /// `(lon, lat)` the popup is anchored at.
    pub anchor: (f64, f64),
    pub title: String,
    pub subtitle: String,
    pub body: String,
    pub icons: Vec<TagIcon>,
    pub links: String,
    pub map_links: Vec<MapLink>,
    pub image: Option<String>,
    pub show_carousel_controls: bool,
}

impl PopupContent {
    /// Builds the popup for a point of interest or a subpoint. Returns `None` only when the
    /// geometry has no anchor point.
    pub fn for_feature(
        feature: &Feature,
        role: Role,
        language: Language,
        carousel_index: usize,
        images: &ImageResolver,
        icon_dir: &str,
    ) -> Option<Self> {
        let anchor = anchor_point(&feature.geometry)?;
        let text = feature.text(language);
        let content = match role {
            Role::Subpoints => Self {
                feature_id: feature.id.clone(),
                role,
                anchor: (anchor.x(), anchor.y()),
                title: text.title.clone(),
                subtitle: text.directions.clone(),
                body: text.content.clone(),
                icons: Vec::new(),
                links: String::new(),
                map_links: Vec::new(),
                image: None,
                show_carousel_controls: false,
            },
            _ => {
                let carousel = Carousel::with_index(feature.image_list(), carousel_index);
                let real_images = carousel.has_real_images();
                Self {
                    feature_id: feature.id.clone(),
                    role,
                    anchor: (anchor.x(), anchor.y()),
                    title: text.name.clone(),
                    subtitle: text.location.clone(),
                    body: text.content.clone(),
                    icons: feature
                        .tag_list()
                        .into_iter()
                        .map(|tag| TagIcon {
                            src: format!("{}/{}.svg", icon_dir.trim_end_matches('/'), tag),
                            tag,
                        })
                        .collect(),
                    links: feature.links.clone(),
                    map_links: map_links(anchor.y(), anchor.x()),
                    image: Some(images.resolve(carousel.current())),
                    show_carousel_controls: real_images && carousel.len() > 1,
                }
            }
        };
        Some(content)
    }
}

/// One card of the sidebar list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SidebarEntry {
    pub feature_id: String,
    pub label_id: String,
    pub title: String,
    pub description: String,
    pub thumbnail: Option<String>,
}

impl SidebarEntry {
    pub fn for_feature(feature: &Feature, language: Language, images: &ImageResolver) -> Self {
        let text = feature.text(language);
        let carousel = Carousel::new(feature.image_list());
        Self {
            feature_id: feature.id.clone(),
            label_id: feature.label_id.clone(),
            title: text.name.clone(),
            description: truncate(&text.content, SIDEBAR_DESCRIPTION_CHARS),
            thumbnail: match carousel.current() {
                ImageRef::Placeholder => None,
                image => Some(images.resolve(image)),
            },
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Guide document link for a language, `{lang}` substituted.
pub fn guide_link(template: &str, language: Language) -> String {
    template.replace("{lang}", language.code())
}
