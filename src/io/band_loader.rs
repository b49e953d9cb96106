use crate::io::raster::RasterReader;
use crate::types::{Crs, GeoRaster, RawRaster, SarError, SarRealImage, SarResult};
use ndarray::Axis;
use std::path::Path;

/// Bands holding linear power that are converted to decibels on load
pub const POWER_BANDS: &[&str] = &["HH", "HV", "VH", "VV", "CH", "CV", "RH", "RV", "RLd", "RRd"];

/// Power-band check; multi-token names such as `RL_d` match `RLd`
pub fn is_power_band(band_name: &str) -> bool {
    let compact: String = band_name.chars().filter(|c| *c != '_').collect();
    POWER_BANDS.contains(&compact.as_str())
}

/// `10 * log10(|x|)`; zero and NaN map to NaN instead of -inf
pub fn lin_to_db(x: f32) -> f32 {
    let db = 10.0 * x.abs().log10();
    if db == f32::NEG_INFINITY {
        f32::NAN
    } else {
        db
    }
}

/// Turns decoded rasters into masked, squeezed, CRS-tagged bands
#[derive(Debug, Clone)]
pub struct BandLoader {
    /// CRS written onto every band; `None` keeps the source CRS
    pub target_crs: Option<Crs>,
    pub convert_to_db: bool,
}

impl BandLoader {
    pub fn new(target_crs: Option<Crs>, convert_to_db: bool) -> Self {
        Self {
            target_crs,
            convert_to_db,
        }
    }

    /// Read `path` through `reader` and prepare it as band `band_name`
    pub fn load_band(
        &self,
        reader: &dyn RasterReader,
        path: &Path,
        band_name: &str,
    ) -> SarResult<GeoRaster> {
        let raw = reader.read(path)?;
        self.prepare(raw, band_name, &path.display().to_string())
    }

    /// Mask, squeeze, convert and tag an already decoded raster.
    ///
    /// Zero is treated as the sensor no-data value. Decibel conversion runs at
    /// most once per call and only for power bands.
    pub fn prepare(&self, raw: RawRaster, band_name: &str, source: &str) -> SarResult<GeoRaster> {
        let RawRaster { data, transform, crs } = raw;

        let bands = data.len_of(Axis(0));
        if bands != 1 {
            return Err(SarError::InvalidFormat(format!(
                "{}: expected a single-band raster for '{}', found {} bands",
                source, band_name, bands
            )));
        }
        let mut image: SarRealImage = data.index_axis_move(Axis(0), 0);
        image.mapv_inplace(|v| if v == 0.0 { f32::NAN } else { v });

        if self.convert_to_db && is_power_band(band_name) {
            log::debug!("Converting {} to dB", band_name);
            image.mapv_inplace(lin_to_db);
        }

        let crs = match (&self.target_crs, crs) {
            (Some(target), Some(source_crs)) => {
                if *target != source_crs {
                    log::debug!("Tagging {} with {} (source CRS not reprojected)", band_name, target);
                }
                target.clone()
            }
            (Some(target), None) => target.clone(),
            (None, Some(source_crs)) => source_crs,
            (None, None) => {
                return Err(SarError::InvalidFormat(format!(
                    "{}: band '{}' has no CRS and no target_crs is configured",
                    source, band_name
                )))
            }
        };

        let raster = GeoRaster::new(image, transform, crs);
        match raster.stats() {
            Some(s) => log::info!(
                "{}: min {:.3}, max {:.3}, mean {:.3} ({}/{} valid pixels)",
                band_name,
                s.min,
                s.max,
                s.mean,
                s.valid_pixels,
                s.total_pixels
            ),
            None => log::warn!("{}: every pixel is no-data", band_name),
        }
        Ok(raster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::raster::MemoryRasterReader;
    use crate::types::GeoTransform;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array3};

    fn raw_scenario() -> RawRaster {
        RawRaster {
            data: Array3::from_shape_vec((1, 2, 2), vec![0.0, 50.0, 100.0, 0.0]).unwrap(),
            transform: GeoTransform::default(),
            crs: Some(Crs::epsg(2960)),
        }
    }

    #[test]
    fn test_zero_masked_to_nan() {
        let loader = BandLoader::new(None, false);
        let band = loader.prepare(raw_scenario(), "HH", "test").unwrap();
        assert!(band.data[[0, 0]].is_nan());
        assert_eq!(band.data[[0, 1]], 50.0);
        assert_eq!(band.data[[1, 0]], 100.0);
        assert!(band.data[[1, 1]].is_nan());
        assert_eq!(band.crs, Crs::epsg(2960));
    }

    #[test]
    fn test_db_conversion_on_power_band() {
        let loader = BandLoader::new(Some(Crs::wgs84()), true);
        let band = loader.prepare(raw_scenario(), "HH", "test").unwrap();
        assert!(band.data[[0, 0]].is_nan());
        assert_abs_diff_eq!(band.data[[0, 1]], 16.99, epsilon = 0.005);
        assert_abs_diff_eq!(band.data[[1, 0]], 20.0, epsilon = 1e-5);
        assert!(band.data[[1, 1]].is_nan());
        assert_eq!(band.crs, Crs::wgs84());
    }

    #[test]
    fn test_db_conversion_skipped_for_non_power_band() {
        let loader = BandLoader::new(None, true);
        let band = loader.prepare(raw_scenario(), "XC", "test").unwrap();
        assert_eq!(band.data[[0, 1]], 50.0);
    }

    #[test]
    fn test_db_applied_once_per_load() {
        let mut reader = MemoryRasterReader::new();
        reader.insert("/p/A/a_HH.tif", raw_scenario());
        let loader = BandLoader::new(None, true);
        let first = loader.load_band(&reader, Path::new("/p/A/a_HH.tif"), "HH").unwrap();
        let second = loader.load_band(&reader, Path::new("/p/A/a_HH.tif"), "HH").unwrap();
        assert!(first.same_pixels(&second));
        // compounding would give 10*log10(20) ~ 13.01
        assert_abs_diff_eq!(second.data[[1, 0]], 20.0, epsilon = 1e-5);
    }

    #[test]
    fn test_multi_token_compact_pol_is_power_band() {
        assert!(is_power_band("RL_d"));
        assert!(is_power_band("RRd"));
        assert!(!is_power_band("XC"));

        let loader = BandLoader::new(None, true);
        let band = loader.prepare(raw_scenario(), "RL_d", "test").unwrap();
        assert_abs_diff_eq!(band.data[[1, 0]], 20.0, epsilon = 1e-5);
    }

    #[test]
    fn test_lin_to_db_tolerates_sign_and_zero() {
        assert_abs_diff_eq!(lin_to_db(-100.0), 20.0, epsilon = 1e-5);
        assert!(lin_to_db(0.0).is_nan());
        assert!(lin_to_db(f32::NAN).is_nan());
    }

    #[test]
    fn test_multiband_rejected_and_missing_crs() {
        let loader = BandLoader::new(None, false);
        let multi = RawRaster {
            data: Array3::from_elem((2, 2, 2), 1.0),
            transform: GeoTransform::default(),
            crs: Some(Crs::wgs84()),
        };
        assert!(matches!(loader.prepare(multi, "HH", "t"), Err(SarError::InvalidFormat(_))));

        let no_crs = RawRaster { crs: None, ..raw_scenario() };
        assert!(loader.prepare(no_crs, "HH", "t").is_err());
    }

    #[test]
    fn test_squeeze_keeps_layout() {
        let loader = BandLoader::new(None, false);
        let raw = RawRaster {
            data: Array3::from_shape_vec((1, 2, 3), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap(),
            transform: GeoTransform::default(),
            crs: Some(Crs::wgs84()),
        };
        let band = loader.prepare(raw, "VV", "t").unwrap();
        assert_eq!(band.data, array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
    }
}
