//! Where feature records come from.

pub mod bundle;
pub mod load;
pub mod store;

pub use bundle::BundleSource;
pub use load::{load_collections, LoadError};
pub use store::{MemoryStore, StoreError};

use crate::feature::RawRecord;

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("collection not found: {0}")]
    NotFound(String),
    #[error("malformed collection: {0}")]
    Malformed(String),
    #[error(transparent)]
    GeoJson(#[from] geojson::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Read access to named collections of raw records. Fetches of different collections may run
/// concurrently.
pub trait DataSource: Sync {
    fn fetch_collection(&self, collection: &str) -> Result<Vec<RawRecord>, SourceError>;
}
