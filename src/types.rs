use chrono::{DateTime, Utc};
use geo::{Coord, LineString, Polygon};
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Real-valued backscatter or intensity sample
pub type SarReal = f32;

/// 2D real raster (row x col)
pub type SarRealImage = Array2<SarReal>;

/// 3D real raster as decoded from storage (band x row x col)
pub type SarCube = Array3<SarReal>;

/// Coordinate reference system identifier.
///
/// Holds any definition GDAL's `SetFromUserInput` understands: `EPSG:4326`,
/// a PROJ string or full WKT. Two CRSs are considered the same when their
/// definitions compare equal after trimming; no semantic equivalence check
/// is attempted here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Crs(String);

impl Crs {
    pub fn new(definition: impl Into<String>) -> Self {
        Self(definition.into().trim().to_string())
    }

    pub fn epsg(code: u32) -> Self {
        Self(format!("EPSG:{}", code))
    }

    /// Geographic WGS84, the CRS areas of interest are usually declared in
    pub fn wgs84() -> Self {
        Self::epsg(4326)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Geospatial bounding box in the units of the owning CRS
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

/// Geospatial transformation parameters (GDAL affine ordering)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Build from the six coefficients returned by `Dataset::geo_transform`
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// True when the grid is axis-aligned (no rotation/shear terms)
    pub fn is_axis_aligned(&self) -> bool {
        self.rotation_x == 0.0 && self.rotation_y == 0.0
    }

    /// World coordinates of the centre of pixel (row, col)
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let c = col as f64 + 0.5;
        let r = row as f64 + 0.5;
        (
            self.top_left_x + c * self.pixel_width + r * self.rotation_x,
            self.top_left_y + c * self.rotation_y + r * self.pixel_height,
        )
    }

    /// Fractional (col, row) of a world coordinate. Only valid for axis-aligned grids.
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.top_left_x) / self.pixel_width,
            (y - self.top_left_y) / self.pixel_height,
        )
    }

    /// Transform of a window whose top-left pixel is (row, col) in this grid
    pub fn window(&self, row: usize, col: usize) -> Self {
        let (x, y) = (
            self.top_left_x + col as f64 * self.pixel_width + row as f64 * self.rotation_x,
            self.top_left_y + col as f64 * self.rotation_y + row as f64 * self.pixel_height,
        );
        Self {
            top_left_x: x,
            top_left_y: y,
            ..*self
        }
    }

    /// Extent covered by a `rows` x `cols` grid
    pub fn bounds(&self, rows: usize, cols: usize) -> BoundingBox {
        let x0 = self.top_left_x;
        let x1 = self.top_left_x + cols as f64 * self.pixel_width;
        let y0 = self.top_left_y;
        let y1 = self.top_left_y + rows as f64 * self.pixel_height;
        BoundingBox {
            min_x: x0.min(x1),
            max_x: x0.max(x1),
            min_y: y0.min(y1),
            max_y: y0.max(y1),
        }
    }
}

impl Default for GeoTransform {
    /// Identity pixel grid: one unit per pixel, north-up
    fn default() -> Self {
        Self::from_gdal([0.0, 1.0, 0.0, 0.0, 0.0, -1.0])
    }
}

/// Summary statistics over the valid (non-NaN) pixels of a raster
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandStats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub valid_pixels: usize,
    pub total_pixels: usize,
}

/// A decoded raster before masking, squeezing and CRS tagging
#[derive(Debug, Clone)]
pub struct RawRaster {
    pub data: SarCube,
    pub transform: GeoTransform,
    pub crs: Option<Crs>,
}

/// One georeferenced 2D band
#[derive(Debug, Clone, PartialEq)]
pub struct GeoRaster {
    pub data: SarRealImage,
    pub transform: GeoTransform,
    pub crs: Crs,
}

impl GeoRaster {
    pub fn new(data: SarRealImage, transform: GeoTransform, crs: Crs) -> Self {
        Self { data, transform, crs }
    }

    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn bounds(&self) -> BoundingBox {
        let (rows, cols) = self.shape();
        self.transform.bounds(rows, cols)
    }

    /// Min/max/mean over non-NaN pixels, `None` when every pixel is missing
    pub fn stats(&self) -> Option<BandStats> {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut sum = 0.0f64;
        let mut valid = 0usize;
        for &v in self.data.iter().filter(|v| !v.is_nan()) {
            min = min.min(v);
            max = max.max(v);
            sum += v as f64;
            valid += 1;
        }
        if valid == 0 {
            return None;
        }
        Some(BandStats {
            min,
            max,
            mean: (sum / valid as f64) as f32,
            valid_pixels: valid,
            total_pixels: self.data.len(),
        })
    }

    /// Pixel-for-pixel equality treating NaN == NaN
    pub fn same_pixels(&self, other: &GeoRaster) -> bool {
        self.data.dim() == other.data.dim()
            && self
                .data
                .iter()
                .zip(other.data.iter())
                .all(|(a, b)| (a.is_nan() && b.is_nan()) || a == b)
    }
}

/// Band name to raster mapping; ordered so iteration is deterministic
pub type BandStore = BTreeMap<String, GeoRaster>;

/// Scalar metadata value as it appears in a time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Time(DateTime<Utc>),
    Text(String),
}

/// Acquisition metadata carried by every product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub acquisition_time: DateTime<Utc>,
    pub satellite: String,
    pub mode: String,
}

impl MetadataRecord {
    pub const ACQUISITION_TIME: &'static str = "acquisition_time";
    pub const SATELLITE: &'static str = "satellite";
    pub const MODE: &'static str = "mode";

    /// Keyed view in a fixed order
    pub fn entries(&self) -> [(&'static str, MetaValue); 3] {
        [
            (Self::ACQUISITION_TIME, MetaValue::Time(self.acquisition_time)),
            (Self::SATELLITE, MetaValue::Text(self.satellite.clone())),
            (Self::MODE, MetaValue::Text(self.mode.clone())),
        ]
    }
}

/// One acquisition: provenance, metadata and its named bands
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    /// Source filename (no directory)
    pub provenance: String,
    pub metadata: MetadataRecord,
    pub bands: BandStore,
}

impl Product {
    pub fn new(provenance: impl Into<String>, metadata: MetadataRecord) -> Self {
        Self {
            provenance: provenance.into(),
            metadata,
            bands: BandStore::new(),
        }
    }

    pub fn with_band(mut self, name: impl Into<String>, raster: GeoRaster) -> Self {
        self.bands.insert(name.into(), raster);
        self
    }

    pub fn band(&self, name: &str) -> Option<&GeoRaster> {
        self.bands.get(name)
    }

    pub fn band_names(&self) -> Vec<String> {
        self.bands.keys().cloned().collect()
    }

    /// Base name used for rendered figures: `<satellite>_<YYYYMMDD_HHMMSS>`
    pub fn figure_stem(&self) -> String {
        format!(
            "{}_{}",
            self.metadata.satellite,
            self.metadata.acquisition_time.format("%Y%m%d_%H%M%S")
        )
    }
}

/// Area of interest polygon, `(lon, lat)` or `(x, y)` vertices in `crs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaOfInterest {
    pub vertices: Vec<(f64, f64)>,
    #[serde(default = "Crs::wgs84")]
    pub crs: Crs,
}

impl AreaOfInterest {
    pub fn new(vertices: Vec<(f64, f64)>, crs: Crs) -> SarResult<Self> {
        let aoi = Self { vertices, crs };
        aoi.validate()?;
        Ok(aoi)
    }

    /// Axis-aligned rectangle, handy for whole-extent clips
    pub fn from_bounds(bbox: &BoundingBox, crs: Crs) -> SarResult<Self> {
        Self::new(
            vec![
                (bbox.min_x, bbox.min_y),
                (bbox.max_x, bbox.min_y),
                (bbox.max_x, bbox.max_y),
                (bbox.min_x, bbox.max_y),
            ],
            crs,
        )
    }

    pub fn validate(&self) -> SarResult<()> {
        if self.vertices.len() < 3 {
            return Err(SarError::Configuration(format!(
                "aoi needs at least 3 vertices, got {}",
                self.vertices.len()
            )));
        }
        if self.vertices.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(SarError::Configuration(
                "aoi contains non-finite coordinates".to_string(),
            ));
        }
        Ok(())
    }

    /// Closed polygon built from the vertices as given
    pub fn polygon(&self) -> Polygon<f64> {
        Self::polygon_from(&self.vertices)
    }

    pub fn polygon_from(vertices: &[(f64, f64)]) -> Polygon<f64> {
        let ring: Vec<Coord<f64>> = vertices.iter().map(|&(x, y)| Coord { x, y }).collect();
        Polygon::new(LineString::from(ring), vec![])
    }
}

/// Error types for product pipeline processing
#[derive(Debug, thiserror::Error)]
pub enum SarError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Metadata parse error: {0}")]
    MetadataParse(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Render error: {0}")]
    Render(String),
}

impl SarError {
    /// Errors that abort a whole run rather than a single file
    pub fn is_fatal(&self) -> bool {
        matches!(self, SarError::Configuration(_))
    }
}

impl From<serde_json::Error> for SarError {
    fn from(e: serde_json::Error) -> Self {
        SarError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for SarError {
    fn from(e: serde_yaml::Error) -> Self {
        SarError::Serialization(e.to_string())
    }
}

/// Result type for pipeline operations
pub type SarResult<T> = Result<T, SarError>;
