use crate::types::{AreaOfInterest, BandStore, Crs, GeoRaster, Product, SarError, SarResult};
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use geo::{BoundingRect, Intersects, Point, Polygon};
use ndarray::s;
use std::collections::HashMap;

/// Reprojects points between coordinate reference systems
pub trait CoordinateTransform {
    /// Transform `(x, y)` points in place from `from` to `to`
    fn transform_points(&self, from: &Crs, to: &Crs, points: &mut [(f64, f64)]) -> SarResult<()>;
}

/// PROJ transforms through GDAL's OSR, with x = easting/longitude axis order
#[derive(Debug, Default, Clone, Copy)]
pub struct GdalCoordinateTransform;

impl GdalCoordinateTransform {
    fn spatial_ref(crs: &Crs) -> SarResult<SpatialRef> {
        let srs = SpatialRef::from_definition(crs.as_str())?;
        srs.set_axis_mapping_strategy(gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);
        Ok(srs)
    }
}

impl CoordinateTransform for GdalCoordinateTransform {
    fn transform_points(&self, from: &Crs, to: &Crs, points: &mut [(f64, f64)]) -> SarResult<()> {
        if from == to || points.is_empty() {
            return Ok(());
        }
        let transform = CoordTransform::new(&Self::spatial_ref(from)?, &Self::spatial_ref(to)?)?;
        let mut xs: Vec<f64> = points.iter().map(|p| p.0).collect();
        let mut ys: Vec<f64> = points.iter().map(|p| p.1).collect();
        let mut zs = vec![0.0; points.len()];
        transform.transform_coords(&mut xs, &mut ys, &mut zs)?;
        for (p, (x, y)) in points.iter_mut().zip(xs.into_iter().zip(ys)) {
            *p = (x, y);
        }
        Ok(())
    }
}

/// Result of clipping a product to an area of interest
#[derive(Debug)]
pub enum ClipOutcome {
    /// Every band was clipped
    Clipped(Product),
    /// The AOI covers no pixel of `band`; no band was modified
    NoDataInBounds { band: String },
}

/// Clip every band of `product` to `aoi`.
///
/// The AOI polygon is reprojected into each band's CRS when they differ. All
/// bands are clipped before any is replaced, so a product is either clipped
/// completely or reported as [`ClipOutcome::NoDataInBounds`].
pub fn clip(
    mut product: Product,
    aoi: &AreaOfInterest,
    transform: &dyn CoordinateTransform,
) -> SarResult<ClipOutcome> {
    let mut polygons: HashMap<Crs, Polygon<f64>> = HashMap::new();
    let mut clipped = BandStore::new();

    for (name, raster) in &product.bands {
        if !polygons.contains_key(&raster.crs) {
            let mut vertices = aoi.vertices.clone();
            if raster.crs != aoi.crs {
                log::debug!("Reprojecting AOI from {} to {}", aoi.crs, raster.crs);
                transform.transform_points(&aoi.crs, &raster.crs, &mut vertices)?;
            }
            polygons.insert(raster.crs.clone(), AreaOfInterest::polygon_from(&vertices));
        }
        let polygon = &polygons[&raster.crs];

        match clip_raster(raster, polygon)? {
            Some(band) => {
                log::info!(
                    "{}: clipped {:?} -> {:?}",
                    name,
                    raster.shape(),
                    band.shape()
                );
                clipped.insert(name.clone(), band);
            }
            None => {
                log::warn!(
                    "{}: no data in bounds for band {}, skipping product",
                    product.provenance,
                    name
                );
                return Ok(ClipOutcome::NoDataInBounds { band: name.clone() });
            }
        }
    }

    product.bands = clipped;
    Ok(ClipOutcome::Clipped(product))
}

/// Clip one raster to a polygon in the raster's CRS.
///
/// The result covers the pixels whose centres fall inside the polygon's
/// envelope; centres outside the polygon itself become NaN. `None` when no
/// pixel centre lies inside the polygon.
pub fn clip_raster(raster: &GeoRaster, polygon: &Polygon<f64>) -> SarResult<Option<GeoRaster>> {
    let gt = &raster.transform;
    if !gt.is_axis_aligned() {
        return Err(SarError::Processing(
            "clipping rotated geotransforms is not supported".to_string(),
        ));
    }
    let (rows, cols) = raster.shape();
    let Some(envelope) = polygon.bounding_rect() else {
        return Ok(None);
    };

    let col_span = center_span(envelope.min().x, envelope.max().x, gt.top_left_x, gt.pixel_width, cols);
    let row_span = center_span(envelope.min().y, envelope.max().y, gt.top_left_y, gt.pixel_height, rows);
    let (Some((c0, c1)), Some((r0, r1))) = (col_span, row_span) else {
        log::debug!("AOI envelope {:?} misses raster bounds {:?}", envelope, raster.bounds());
        return Ok(None);
    };

    let window_gt = gt.window(r0, c0);
    let mut data = raster.data.slice(s![r0..=r1, c0..=c1]).to_owned();
    let mut inside = 0usize;
    for ((r, c), v) in data.indexed_iter_mut() {
        let (x, y) = window_gt.pixel_center(r, c);
        if polygon.intersects(&Point::new(x, y)) {
            inside += 1;
        } else {
            *v = f32::NAN;
        }
    }
    log::debug!("{} pixels inside AOI in window rows {}..={}, cols {}..={}", inside, r0, r1, c0, c1);

    if inside == 0 {
        return Ok(None);
    }
    Ok(Some(GeoRaster::new(data, window_gt, raster.crs.clone())))
}

/// Inclusive index range of pixels along one axis whose centres lie in [lo, hi]
fn center_span(lo: f64, hi: f64, origin: f64, step: f64, n: usize) -> Option<(usize, usize)> {
    if n == 0 || step == 0.0 {
        return None;
    }
    let a = (lo - origin) / step - 0.5;
    let b = (hi - origin) / step - 0.5;
    let (first, last) = (a.min(b).ceil(), a.max(b).floor());
    let first = first.max(0.0);
    let last = last.min((n - 1) as f64);
    if first > last {
        return None;
    }
    Some((first as usize, last as usize))
}
