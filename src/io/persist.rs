use crate::core::timeseries::{BandSample, TimeSeriesRecord};
use crate::types::{
    BandStore, Crs, GeoRaster, GeoTransform, MetaValue, MetadataRecord, Product, SarError,
    SarRealImage, SarResult,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// File name of the serialized time series inside the output directory
pub const TIMESERIES_FILE: &str = "timeseries.json";

/// Pixel grid with missing values as `null`
#[derive(Debug, Serialize, Deserialize)]
struct GridSnapshot {
    rows: usize,
    cols: usize,
    pixels: Vec<Option<f32>>,
}

impl GridSnapshot {
    fn from_array(data: &SarRealImage) -> Self {
        let (rows, cols) = data.dim();
        Self {
            rows,
            cols,
            pixels: data.iter().map(|&v| if v.is_nan() { None } else { Some(v) }).collect(),
        }
    }

    fn into_array(self) -> SarResult<SarRealImage> {
        let values = self.pixels.into_iter().map(|v| v.unwrap_or(f32::NAN)).collect();
        SarRealImage::from_shape_vec((self.rows, self.cols), values).map_err(|e| {
            SarError::Serialization(format!("pixel count does not match {}x{}: {}", self.rows, self.cols, e))
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RasterSnapshot {
    transform: GeoTransform,
    crs: Crs,
    grid: GridSnapshot,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProductSnapshot {
    provenance: String,
    metadata: MetadataRecord,
    bands: BTreeMap<String, RasterSnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum SampleSnapshot {
    Scalar(Option<f32>),
    Array(GridSnapshot),
}

#[derive(Debug, Serialize, Deserialize)]
struct TimeSeriesSnapshot {
    per_band: BTreeMap<String, Vec<SampleSnapshot>>,
    per_meta: BTreeMap<String, Vec<MetaValue>>,
}

/// Writes products to `<save_dir>/<provenance>.json` and reads them back
#[derive(Debug, Clone)]
pub struct Persister {
    save_dir: PathBuf,
}

impl Persister {
    pub fn new(save_dir: impl Into<PathBuf>) -> Self {
        Self {
            save_dir: save_dir.into(),
        }
    }

    pub fn path_for(&self, product: &Product) -> PathBuf {
        let name = Path::new(&product.provenance)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| product.provenance.clone());
        self.save_dir.join(format!("{}.json", name))
    }

    pub fn save(&self, product: &Product) -> SarResult<PathBuf> {
        let snapshot = ProductSnapshot {
            provenance: product.provenance.clone(),
            metadata: product.metadata.clone(),
            bands: product
                .bands
                .iter()
                .map(|(name, r)| {
                    (
                        name.clone(),
                        RasterSnapshot {
                            transform: r.transform,
                            crs: r.crs.clone(),
                            grid: GridSnapshot::from_array(&r.data),
                        },
                    )
                })
                .collect(),
        };
        let path = self.path_for(product);
        let writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer(writer, &snapshot)?;
        log::info!("Saved product to: {}", path.display());
        Ok(path)
    }

    /// Reconstitute a product written by [`Persister::save`]
    pub fn load(path: &Path) -> SarResult<Product> {
        let reader = BufReader::new(File::open(path)?);
        let snapshot: ProductSnapshot = serde_json::from_reader(reader)?;
        let mut bands = BandStore::new();
        for (name, r) in snapshot.bands {
            bands.insert(name, GeoRaster::new(r.grid.into_array()?, r.transform, r.crs));
        }
        Ok(Product {
            provenance: snapshot.provenance,
            metadata: snapshot.metadata,
            bands,
        })
    }
}

/// Write the time series verbatim to `<output_dir>/timeseries.json`
pub fn save_timeseries(record: &TimeSeriesRecord, output_dir: &Path) -> SarResult<PathBuf> {
    let snapshot = TimeSeriesSnapshot {
        per_band: record
            .per_band
            .iter()
            .map(|(name, samples)| {
                let samples = samples
                    .iter()
                    .map(|s| match s {
                        BandSample::Scalar(v) => SampleSnapshot::Scalar(if v.is_nan() { None } else { Some(*v) }),
                        BandSample::Array(a) => SampleSnapshot::Array(GridSnapshot::from_array(a)),
                    })
                    .collect();
                (name.clone(), samples)
            })
            .collect(),
        per_meta: record.per_meta.clone(),
    };
    let path = output_dir.join(TIMESERIES_FILE);
    let writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer(writer, &snapshot)?;
    log::info!("Saved time series to: {}", path.display());
    Ok(path)
}

pub fn load_timeseries(path: &Path) -> SarResult<TimeSeriesRecord> {
    let reader = BufReader::new(File::open(path)?);
    let snapshot: TimeSeriesSnapshot = serde_json::from_reader(reader)?;
    let mut per_band = BTreeMap::new();
    for (name, samples) in snapshot.per_band {
        let samples = samples
            .into_iter()
            .map(|s| match s {
                SampleSnapshot::Scalar(v) => Ok(BandSample::Scalar(v.unwrap_or(f32::NAN))),
                SampleSnapshot::Array(g) => g.into_array().map(BandSample::Array),
            })
            .collect::<SarResult<Vec<_>>>()?;
        per_band.insert(name, samples);
    }
    Ok(TimeSeriesRecord {
        per_band,
        per_meta: snapshot.per_meta,
    })
}
