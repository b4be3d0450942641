pub mod engine;
pub mod headless;
pub mod layers;

pub use engine::{CameraTarget, DomSurface, MapEngine, MapError};
