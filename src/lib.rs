//! sarstack: a pluggable pipeline for stacks of SAR backscatter products
//!
//! Products are read band by band (linear power converted to dB, zero
//! treated as no-data), clipped to an area of interest, rendered,
//! persisted and finally aggregated into a per-band time series.
//! Source formats plug in through the [`core::DataModule`] trait.

pub mod config;
pub mod core;
pub mod io;
pub mod types;

#[cfg(feature = "python")]
mod python;

// Re-export main types
pub use config::{DatasetConfig, DatasetKind, PipelineConfig, RunConfig};
pub use core::{DataModule, GeotiffStack, Pipeline, RunSummary, SaveMode, Stage};
pub use types::{AreaOfInterest, Crs, GeoRaster, MetadataRecord, Product, SarError, SarResult};

/// Run the pipeline described by `config` against its dataset.
///
/// Earth Engine datasets need an authenticated client and can only be run
/// through [`core::EarthEngineModule`] with [`Pipeline::run`].
pub fn run_config(config: &RunConfig) -> SarResult<RunSummary> {
    config.validate()?;
    let pipeline = Pipeline::new(config.pipeline()?.clone())?;

    match config.dataset.kind {
        DatasetKind::GeotiffStack => {
            let module = GeotiffStack::new(&config.dataset)?;
            pipeline.run(&module)
        }
        DatasetKind::EarthEngine => Err(SarError::Configuration(
            "earth_engine datasets need a client supplied through the library API".to_string(),
        )),
    }
}
