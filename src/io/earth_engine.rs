use crate::types::{AreaOfInterest, RawRaster, SarResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Sentinel-1 collection searched by default
pub const S1_GRD_COLLECTION: &str = "COPERNICUS/S1_GRD";

fn default_collection() -> String {
    S1_GRD_COLLECTION.to_string()
}

fn default_instrument_mode() -> String {
    "IW".to_string()
}

/// Image search over an Earth Engine collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EeSearch {
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Inclusive start date
    pub start: NaiveDate,
    /// Exclusive end date
    pub end: NaiveDate,
    #[serde(default = "default_instrument_mode")]
    pub instrument_mode: String,
}

/// Authenticated access to Earth Engine.
///
/// Session setup and credentials live with the implementor; the pipeline only
/// needs search, band listing and pixel sampling.
pub trait EarthEngineClient {
    /// Ids of images matching `query` whose footprint intersects `aoi`
    fn search(&self, query: &EeSearch, aoi: &AreaOfInterest) -> SarResult<Vec<String>>;

    fn band_names(&self, image_id: &str) -> SarResult<Vec<String>>;

    /// Pixels of one band over the AOI envelope in the image's native
    /// projection. Masked pixels must be returned as 0 (`unmask(0)`).
    fn sample_rectangle(&self, image_id: &str, band: &str, aoi: &AreaOfInterest) -> SarResult<RawRaster>;
}
