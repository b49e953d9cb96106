//! Pipeline stages and the data modules they run against

pub mod datamodule;
pub mod pipeline;
pub mod render;
pub mod subset;
pub mod timeseries;

// Re-export main types
pub use datamodule::{DataModule, EarthEngineModule, GeotiffStack, ModuleCore};
pub use pipeline::{Pipeline, RunSummary, SaveMode, Stage};
pub use render::{RenderConfig, Renderer};
pub use subset::{clip, clip_raster, ClipOutcome, CoordinateTransform, GdalCoordinateTransform};
pub use timeseries::{aggregate, nanmedian, BandSample, TimeSeriesRecord};
