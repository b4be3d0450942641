pub mod geometry;
pub mod model;
pub mod normalize;

pub use model::{Collections, Feature, FeatureCollection, Language, LocalizedText, Role};
pub use normalize::{normalize, parse_list, Normalized, RawRecord};
