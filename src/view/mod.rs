pub mod carousel;
pub mod content;
pub mod selection;
pub mod state;
pub mod sync;

pub use selection::{derive, label_for, passes_filter, subsidiaries_for, DerivedView};
pub use state::{Action, Basemap, CarouselStep, Panel, ViewState};
pub use sync::{apply_effects, RenderEffect, Synchronizer};
