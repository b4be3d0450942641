use std::path::{Path, PathBuf};

use anyhow::anyhow;
use serde::Deserialize;

use crate::map::engine::Bounds;
use crate::map::layers::StyleWait;
use crate::view::state::Basemap;

/// Where the guide reads its features from.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub enum DataConfig {
    /// GeoJSON files in a directory or under an http(s) base URL.
    Bundle { location: String },
    /// Document store seeded from a YAML snapshot.
    Store { snapshot: PathBuf },
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct StyleUrls {
    pub satellite: String,
    pub streetmap: String,
}

impl Default for StyleUrls {
    fn default() -> Self {
        Self {
            satellite: "mapbox://styles/mapbox/satellite-streets-v11".to_string(),
            streetmap: "mapbox://styles/mapbox/navigation-day-v1".to_string(),
        }
    }
}

impl StyleUrls {
    pub fn url(&self, basemap: Basemap) -> &str {
        match basemap {
            Basemap::Satellite => &self.satellite,
            Basemap::Streetmap => &self.streetmap,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct MapConfig {
    pub styles: StyleUrls,
    /// Panning limit of the map.
    pub bounds: Bounds,
    /// Extent shown on start and by the home button.
    pub home_bounds: Bounds,
    pub bearing: f64,
    pub icon_dir: String,
    pub image_dir: String,
    /// Printable guide URL, `{lang}` is replaced by the language code.
    pub guide_link_template: String,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            styles: StyleUrls::default(),
            bounds: [[-122.8, 45.53], [-122.45, 45.65]],
            home_bounds: [[-122.9, 45.53], [-122.3, 45.65]],
            bearing: 16.0,
            icon_dir: "../resources/icons".to_string(),
            image_dir: "../resources/popup-images".to_string(),
            guide_link_template: "../resources/NatureInTheCity_FINAL_{lang}.pdf".to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub data: DataConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub style_wait: StyleWait,
}

impl Config {
    pub fn from_file(filepath: &Path) -> anyhow::Result<Self> {
        if !filepath.exists() {
            return Err(anyhow!("Config file {:?} not found", filepath));
        }
        let contents = std::fs::read_to_string(filepath)?;
        Ok(serde_yaml::from_str(&contents)?)
    }
}
