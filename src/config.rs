//! Run configuration loaded from YAML
//!
//! ```yaml
//! dataset:
//!   kind: geotiff_stack
//!   dir: /data/rcm/
//!   ext: _GRD
//!   outdir: /data/out/
//!   meta_map: {date: 4, time: 5, sat: 0, mode: 3, band_start: 6}
//!   aoi:
//!     crs: EPSG:4326
//!     vertices: [[-75.8, 45.3], [-75.6, 45.3], [-75.6, 45.5], [-75.8, 45.5]]
//!   lims_for_plotting: {HH: [-30, -5], HV: [-35, -10]}
//! pipeline:
//!   stages: [read, subset, plot, save, timeseries]
//! ```

use crate::core::pipeline::{SaveMode, Stage};
use crate::io::{EeSearch, MetaMap};
use crate::types::{AreaOfInterest, Crs, SarError, SarResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

fn default_true() -> bool {
    true
}

/// Source format of the dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    /// Directories of single-band GeoTIFFs, one directory per product
    #[default]
    GeotiffStack,
    /// Earth Engine image ids found by an [`EeSearch`]
    EarthEngine,
}

/// Dataset section: where products come from and where outputs go
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    #[serde(default)]
    pub kind: DatasetKind,
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub files: Option<Vec<String>>,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub aoi: Option<AreaOfInterest>,
    pub outdir: PathBuf,
    /// Persisted products; defaults to `outdir`
    #[serde(default)]
    pub savedir: Option<PathBuf>,
    #[serde(default)]
    pub lims_for_plotting: BTreeMap<String, [f32; 2]>,
    #[serde(default)]
    pub meta_map: Option<MetaMap>,
    /// Band allow-list; all bands when absent
    #[serde(default)]
    pub bands: Option<Vec<String>>,
    #[serde(default = "default_true")]
    pub convert_to_db: bool,
    #[serde(default)]
    pub target_crs: Option<Crs>,
    /// Station `[lon, lat]` marked on product plots
    #[serde(default)]
    pub station: Option<(f64, f64)>,
    #[serde(default)]
    pub earth_engine: Option<EeSearch>,
}

impl DatasetConfig {
    pub fn save_dir(&self) -> &Path {
        self.savedir.as_deref().unwrap_or(&self.outdir)
    }

    pub fn plot_limits(&self) -> BTreeMap<String, (f32, f32)> {
        self.lims_for_plotting
            .iter()
            .map(|(band, [lo, hi])| (band.clone(), (*lo, *hi)))
            .collect()
    }
}

/// Pipeline section: which stages run and how.
///
/// Reading is implicit; `read` may be listed, but only first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub save_mode: SaveMode,
    /// Reduce each band to its median in the time series
    #[serde(default = "default_true")]
    pub avg_values: bool,
}

impl PipelineConfig {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self {
            stages,
            save_mode: SaveMode::default(),
            avg_values: true,
        }
    }

    pub fn validate(&self) -> SarResult<()> {
        if self.stages.is_empty() {
            return Err(SarError::Configuration("pipeline.stages is empty".to_string()));
        }
        // reading is implicit; `read` is only allowed as the first stage
        if self.stages.iter().skip(1).any(|s| *s == Stage::Read) {
            return Err(SarError::Configuration(
                "pipeline.stages: read may only appear as the first stage".to_string(),
            ));
        }
        Ok(())
    }
}

/// Complete run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub pipeline: Option<PipelineConfig>,
}

impl RunConfig {
    pub fn from_yaml_str(yaml: &str) -> SarResult<Self> {
        let config: RunConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> SarResult<Self> {
        log::info!("Loading configuration from: {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|e| {
            SarError::Configuration(format!("cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn pipeline(&self) -> SarResult<&PipelineConfig> {
        self.pipeline
            .as_ref()
            .ok_or_else(|| SarError::Configuration("no pipeline declared".to_string()))
    }

    /// Check everything a run needs before any file is touched
    pub fn validate(&self) -> SarResult<()> {
        let ds = &self.dataset;
        let pipeline = self.pipeline()?;
        pipeline.validate()?;

        if ds.meta_map.is_none() {
            return Err(SarError::Configuration(
                "dataset.meta_map is missing: cannot parse metadata from filenames".to_string(),
            ));
        }
        if let Some(aoi) = &ds.aoi {
            aoi.validate()?;
        } else if pipeline.stages.contains(&Stage::Subset) || ds.kind == DatasetKind::EarthEngine {
            return Err(SarError::Configuration(
                "dataset.aoi is required for the subset stage and for earth_engine datasets".to_string(),
            ));
        }
        for (band, [lo, hi]) in &ds.lims_for_plotting {
            if lo >= hi {
                log::warn!("lims_for_plotting for {} is empty: [{}, {}]", band, lo, hi);
            }
        }

        match ds.kind {
            DatasetKind::GeotiffStack => {
                if ds.dir.is_some() == ds.files.is_some() {
                    return Err(SarError::Configuration(
                        "dataset needs exactly one of dir or files".to_string(),
                    ));
                }
            }
            DatasetKind::EarthEngine => {
                if ds.earth_engine.is_none() {
                    return Err(SarError::Configuration(
                        "dataset.earth_engine search is required for earth_engine datasets".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}
