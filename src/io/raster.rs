use crate::types::{Crs, GeoRaster, GeoTransform, RawRaster, SarError, SarResult};
use gdal::Dataset;
use ndarray::Array3;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Source of decoded rasters and of the band members making up a product
pub trait RasterReader {
    /// Band member files of a product, in a stable order
    fn list_band_files(&self, product: &Path) -> SarResult<Vec<PathBuf>>;

    /// Decode one raster file with all of its bands
    fn read(&self, path: &Path) -> SarResult<RawRaster>;
}

/// GDAL-backed reader for GeoTIFF product directories
pub struct GdalRasterReader {
    band_file: Regex,
}

impl GdalRasterReader {
    pub fn new() -> Self {
        Self {
            band_file: Regex::new(r"(?i)\.tiff?$").expect("static regex is valid"),
        }
    }
}

impl Default for GdalRasterReader {
    fn default() -> Self {
        Self::new()
    }
}

impl RasterReader for GdalRasterReader {
    fn list_band_files(&self, product: &Path) -> SarResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(product)? {
            let path = entry?.path();
            let is_band = path
                .file_name()
                .map(|n| self.band_file.is_match(&n.to_string_lossy()))
                .unwrap_or(false);
            if is_band && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        log::debug!("Found {} band files in {}", files.len(), product.display());
        Ok(files)
    }

    fn read(&self, path: &Path) -> SarResult<RawRaster> {
        log::info!("Reading raster: {}", path.display());
        let dataset = Dataset::open(path)?;
        let (width, height) = dataset.raster_size();
        let band_count = dataset.raster_count() as usize;

        let transform = match dataset.geo_transform() {
            Ok(gt) => GeoTransform::from_gdal(gt),
            Err(e) => {
                log::warn!("{} has no geotransform ({}), using pixel grid", path.display(), e);
                GeoTransform::default()
            }
        };
        let crs = dataset
            .spatial_ref()
            .and_then(|srs| srs.to_wkt())
            .ok()
            .filter(|wkt| !wkt.is_empty())
            .map(Crs::new);

        log::debug!("Raster size: {}x{}, {} band(s)", width, height, band_count);

        let mut data = Vec::with_capacity(band_count * width * height);
        for index in 1..=band_count {
            let band = dataset.rasterband(index as isize)?;
            let buffer = band.read_as::<f32>((0, 0), (width, height), (width, height), None)?;
            data.extend(buffer.data);
        }
        let data = Array3::from_shape_vec((band_count, height, width), data)
            .map_err(|e| SarError::InvalidFormat(format!("Failed to reshape raster data: {}", e)))?;

        Ok(RawRaster { data, transform, crs })
    }
}

/// In-memory reader: rasters keyed by path, products are their parent directories
#[derive(Debug, Default, Clone)]
pub struct MemoryRasterReader {
    rasters: BTreeMap<PathBuf, RawRaster>,
}

impl MemoryRasterReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, raster: RawRaster) {
        self.rasters.insert(path.into(), raster);
    }
}

impl RasterReader for MemoryRasterReader {
    fn list_band_files(&self, product: &Path) -> SarResult<Vec<PathBuf>> {
        let files: Vec<PathBuf> = self
            .rasters
            .keys()
            .filter(|p| p.parent() == Some(product))
            .cloned()
            .collect();
        if files.is_empty() {
            return Err(SarError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no rasters under {}", product.display()),
            )));
        }
        Ok(files)
    }

    fn read(&self, path: &Path) -> SarResult<RawRaster> {
        self.rasters.get(path).cloned().ok_or_else(|| {
            SarError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no raster at {}", path.display()),
            ))
        })
    }
}

/// Save a band as a single-band float GeoTIFF with NaN as no-data
pub fn save_geotiff(raster: &GeoRaster, output_path: &Path) -> SarResult<()> {
    use gdal::spatial_ref::SpatialRef;
    use gdal::DriverManager;

    let (height, width) = raster.shape();
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut dataset = driver.create_with_band_type::<f32, _>(
        output_path,
        width as isize,
        height as isize,
        1,
    )?;

    dataset.set_geo_transform(&raster.transform.to_gdal())?;
    dataset.set_spatial_ref(&SpatialRef::from_definition(raster.crs.as_str())?)?;

    let mut rasterband = dataset.rasterband(1)?;
    let flat_data: Vec<f32> = raster.data.iter().cloned().collect();
    let buffer = gdal::raster::Buffer::new((width, height), flat_data);
    rasterband.write((0, 0), (width, height), &buffer)?;
    rasterband.set_no_data_value(Some(f32::NAN as f64))?;

    log::info!("Saved GeoTIFF: {}", output_path.display());
    Ok(())
}
