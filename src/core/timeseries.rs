//! Time-series aggregation across a processed file series
//!
//! Every accumulated product stays in memory until the end of the run, so
//! memory grows linearly with the number of files. There is no streaming or
//! windowed aggregation.

use crate::types::{MetaValue, Product, SarError, SarRealImage, SarResult};
use chrono::{DateTime, Utc};
use ndarray::Array2;
use std::collections::BTreeMap;

/// Per-file contribution of one band
#[derive(Debug, Clone, PartialEq)]
pub enum BandSample {
    /// NaN-ignoring median of the band
    Scalar(f32),
    /// The full band array
    Array(SarRealImage),
}

impl BandSample {
    /// Scalar view used for plotting: the value itself or the array median
    pub fn as_scalar(&self) -> f32 {
        match self {
            BandSample::Scalar(v) => *v,
            BandSample::Array(a) => nanmedian(a.iter().copied()),
        }
    }
}

/// Aligned per-band and per-metadata sequences; index i is the i-th product
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeSeriesRecord {
    pub per_band: BTreeMap<String, Vec<BandSample>>,
    pub per_meta: BTreeMap<String, Vec<MetaValue>>,
}

impl TimeSeriesRecord {
    /// Number of aggregated products
    pub fn len(&self) -> usize {
        self.per_meta.values().map(|v| v.len()).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Acquisition times in product order
    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.per_meta
            .get(crate::types::MetadataRecord::ACQUISITION_TIME)
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| match v {
                        MetaValue::Time(t) => Some(*t),
                        MetaValue::Text(_) => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Scalar series of a band, arrays reduced to their median
    pub fn scalar_series(&self, band: &str) -> Option<Vec<f32>> {
        self.per_band
            .get(band)
            .map(|samples| samples.iter().map(BandSample::as_scalar).collect())
    }
}

/// Median of the non-NaN values, NaN when none remain
pub fn nanmedian(values: impl Iterator<Item = f32>) -> f32 {
    let mut valid: Vec<f32> = values.filter(|v| !v.is_nan()).collect();
    if valid.is_empty() {
        return f32::NAN;
    }
    valid.sort_by(|a, b| a.total_cmp(b));
    let mid = valid.len() / 2;
    if valid.len() % 2 == 1 {
        valid[mid]
    } else {
        ((valid[mid - 1] as f64 + valid[mid] as f64) / 2.0) as f32
    }
}

/// Aggregate products into one aligned time series.
///
/// Products are taken in the given order; timestamps are not re-sorted. The
/// band set is that of the first product. A later product lacking one of those
/// bands contributes a missing sample (`NaN` scalar or an empty array) so that
/// every sequence stays aligned; bands absent from the first product are ignored.
pub fn aggregate(products: &[Product], avg_values: bool) -> SarResult<TimeSeriesRecord> {
    let first = products.first().ok_or_else(|| {
        SarError::Processing("time series aggregation needs at least one product".to_string())
    })?;
    let band_names = first.band_names();
    log::info!(
        "Aggregating {} products over bands {:?} (avg_values={})",
        products.len(),
        band_names,
        avg_values
    );

    let mut record = TimeSeriesRecord::default();
    for name in &band_names {
        record.per_band.insert(name.clone(), Vec::with_capacity(products.len()));
    }

    for product in products {
        for (key, value) in product.metadata.entries() {
            record.per_meta.entry(key.to_string()).or_default().push(value);
        }

        for name in &band_names {
            let sample = match product.band(name) {
                Some(raster) if avg_values => BandSample::Scalar(nanmedian(raster.data.iter().copied())),
                Some(raster) => BandSample::Array(raster.data.clone()),
                None => {
                    log::warn!(
                        "{} has no band {}; recording a missing sample",
                        product.provenance,
                        name
                    );
                    if avg_values {
                        BandSample::Scalar(f32::NAN)
                    } else {
                        BandSample::Array(Array2::from_elem((0, 0), f32::NAN))
                    }
                }
            };
            if let Some(series) = record.per_band.get_mut(name) {
                series.push(sample);
            }
        }

        for extra in product.bands.keys().filter(|b| !band_names.contains(b)) {
            log::warn!(
                "{}: band {} is not in the first product, ignored",
                product.provenance,
                extra
            );
        }
    }

    Ok(record)
}
