use crate::core::subset::CoordinateTransform;
use crate::core::timeseries::TimeSeriesRecord;
use crate::types::{Crs, GeoRaster, Product, SarError, SarResult};
use plotters::coord::Shift;
use plotters::prelude::*;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// File name of the time-series figure inside the output directory
pub const TIMESERIES_FIGURE: &str = "timeseries.png";

/// Longest side, in pixels, drawn per band panel; larger bands are decimated
const MAX_PANEL_SAMPLES: usize = 400;

/// Stops of a matplotlib-like "pink" colormap (position, rgb)
const PINK_STOPS: [(f32, [u8; 3]); 4] = [
    (0.0, [30, 0, 0]),
    (0.35, [190, 130, 130]),
    (0.75, [232, 232, 181]),
    (1.0, [255, 255, 255]),
];

/// Figure settings for product and time-series plots
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub output_dir: PathBuf,
    /// Per-band (vmin, vmax); bands without limits use their data range
    pub limits: BTreeMap<String, (f32, f32)>,
    /// Station `(x, y)` in `station_crs`, highlighted on every band panel
    pub station: Option<(f64, f64)>,
    pub station_crs: Crs,
    /// Width and height of one band panel
    pub panel_size: (u32, u32),
}

impl RenderConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            limits: BTreeMap::new(),
            station: None,
            station_crs: Crs::wgs84(),
            panel_size: (450, 300),
        }
    }
}

/// Writes diagnostic figures; never modifies the products it draws
#[derive(Debug, Clone)]
pub struct Renderer {
    config: RenderConfig,
}

fn render_err<E: std::fmt::Display>(e: E) -> SarError {
    SarError::Render(e.to_string())
}

/// Map `value` in [vmin, vmax] to the pink colormap, `None` for NaN
pub fn pink(value: f32, vmin: f32, vmax: f32) -> Option<RGBColor> {
    if value.is_nan() {
        return None;
    }
    let span = vmax - vmin;
    let t = if span > 0.0 { ((value - vmin) / span).clamp(0.0, 1.0) } else { 0.5 };
    let upper = PINK_STOPS.iter().position(|(p, _)| *p >= t).unwrap_or(PINK_STOPS.len() - 1).max(1);
    let (p0, c0) = PINK_STOPS[upper - 1];
    let (p1, c1) = PINK_STOPS[upper];
    let f = if p1 > p0 { (t - p0) / (p1 - p0) } else { 0.0 };
    let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * f).round() as u8;
    Some(RGBColor(mix(c0[0], c1[0]), mix(c0[1], c1[1]), mix(c0[2], c1[2])))
}

impl Renderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Output path of a product's figure: `<output_dir>/<satellite>_<YYYYMMDD_HHMMSS>.png`
    pub fn product_figure_path(&self, product: &Product) -> PathBuf {
        self.config.output_dir.join(format!("{}.png", product.figure_stem()))
    }

    /// Colour limits for a band: configured, else finite data range
    pub fn limits_for(&self, band_name: &str, raster: &GeoRaster) -> (f32, f32) {
        if let Some(&lims) = self.config.limits.get(band_name) {
            return lims;
        }
        raster.stats().map(|s| (s.min, s.max)).unwrap_or((0.0, 1.0))
    }

    /// Draw every band of `product` side by side and write the PNG
    pub fn plot_product(
        &self,
        product: &Product,
        transform: &dyn CoordinateTransform,
    ) -> SarResult<PathBuf> {
        let path = self.product_figure_path(product);
        let panels = product.bands.len().max(1);
        let (pw, ph) = self.config.panel_size;
        {
            let root = BitMapBackend::new(&path, (pw * panels as u32, ph)).into_drawing_area();
            root.fill(&WHITE).map_err(render_err)?;
            let areas = root.split_evenly((1, panels));
            for ((name, raster), area) in product.bands.iter().zip(areas.iter()) {
                let station = self.station_pixel(raster, transform)?;
                self.draw_band(area, name, raster, station)?;
            }
            root.present().map_err(render_err)?;
        }
        log::info!("Saved plot to: {}", path.display());
        Ok(path)
    }

    /// (row, col) of the pixel containing the configured station, if any
    fn station_pixel(
        &self,
        raster: &GeoRaster,
        transform: &dyn CoordinateTransform,
    ) -> SarResult<Option<(usize, usize)>> {
        let Some(station) = self.config.station else {
            return Ok(None);
        };
        let mut pts = [station];
        transform.transform_points(&self.config.station_crs, &raster.crs, &mut pts)?;
        let (col, row) = raster.transform.world_to_pixel(pts[0].0, pts[0].1);
        let (rows, cols) = raster.shape();
        if col < 0.0 || row < 0.0 || col >= cols as f64 || row >= rows as f64 {
            log::warn!("Station {:?} falls outside the band extent", station);
            return Ok(None);
        }
        Ok(Some((row as usize, col as usize)))
    }

    fn draw_band(
        &self,
        area: &DrawingArea<BitMapBackend, Shift>,
        name: &str,
        raster: &GeoRaster,
        station: Option<(usize, usize)>,
    ) -> SarResult<()> {
        let (rows, cols) = raster.shape();
        let (vmin, vmax) = self.limits_for(name, raster);
        let step = (rows.max(cols) + MAX_PANEL_SAMPLES - 1) / MAX_PANEL_SAMPLES;
        let step = step.max(1);

        let mut chart = ChartBuilder::on(area)
            .caption(name, ("sans-serif", 18))
            .margin(5)
            .x_label_area_size(25)
            .y_label_area_size(40)
            .build_cartesian_2d(0f64..cols.max(1) as f64, 0f64..rows.max(1) as f64)
            .map_err(render_err)?;
        chart
            .configure_mesh()
            .disable_mesh()
            .y_label_formatter(&|y| format!("{:.0}", rows as f64 - y))
            .draw()
            .map_err(render_err)?;

        // origin upper: row 0 is drawn at the top
        let cells = (0..rows).step_by(step).flat_map(|r| {
            (0..cols).step_by(step).filter_map(move |c| {
                pink(raster.data[[r, c]], vmin, vmax).map(|color| {
                    let x0 = c as f64;
                    let x1 = (c + step).min(cols) as f64;
                    let y0 = (rows - r) as f64;
                    let y1 = rows.saturating_sub(r + step) as f64;
                    Rectangle::new([(x0, y0), (x1, y1)], color.filled())
                })
            })
        });
        chart.draw_series(cells).map_err(render_err)?;

        if let Some((r, c)) = station {
            let centre = (c as f64 + 0.5, (rows - r) as f64 - 0.5);
            chart
                .draw_series(std::iter::once(Circle::new(centre, 5, BLUE.filled())))
                .map_err(render_err)?;
        }
        Ok(())
    }

    /// Stacked per-band series against acquisition date (`yy-mm-dd` labels)
    pub fn plot_timeseries(&self, record: &TimeSeriesRecord) -> SarResult<PathBuf> {
        let path = self.config.output_dir.join(TIMESERIES_FIGURE);
        let dates: Vec<String> = record
            .timestamps()
            .iter()
            .map(|t| t.format("%y-%m-%d").to_string())
            .collect();
        let n = record.len();
        let bands = record.per_band.len().max(1);
        let (pw, ph) = self.config.panel_size;
        {
            let root = BitMapBackend::new(&path, (pw * 2, ph * bands as u32)).into_drawing_area();
            root.fill(&WHITE).map_err(render_err)?;
            let rows = root.split_evenly((bands, 1));
            for ((name, _), area) in record.per_band.iter().zip(rows.iter()) {
                let series = record.scalar_series(name).unwrap_or_default();
                let points: Vec<(f64, f64)> = series
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| !v.is_nan())
                    .map(|(i, v)| (i as f64, *v as f64))
                    .collect();
                let (lo, hi) = points.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
                    (lo.min(p.1), hi.max(p.1))
                });
                let (lo, hi) = if lo.is_finite() { (lo, hi) } else { (0.0, 1.0) };
                let pad = ((hi - lo) * 0.1).max(1e-3);

                let mut chart = ChartBuilder::on(area)
                    .caption(name, ("sans-serif", 18))
                    .margin(5)
                    .x_label_area_size(30)
                    .y_label_area_size(50)
                    .build_cartesian_2d(-0.5f64..(n.max(1) as f64 - 0.5), (lo - pad)..(hi + pad))
                    .map_err(render_err)?;
                chart
                    .configure_mesh()
                    .x_labels(n.clamp(1, 12))
                    .x_label_formatter(&|x| {
                        let i = x.round();
                        if i >= 0.0 && (i as usize) < dates.len() && (x - i).abs() < 1e-6 {
                            dates[i as usize].clone()
                        } else {
                            String::new()
                        }
                    })
                    .draw()
                    .map_err(render_err)?;
                chart
                    .draw_series(LineSeries::new(points.clone(), &BLUE))
                    .map_err(render_err)?;
                chart
                    .draw_series(points.iter().map(|&p| Circle::new(p, 3, BLUE.filled())))
                    .map_err(render_err)?;
            }
            root.present().map_err(render_err)?;
        }
        log::info!("Saved time-series plot to: {}", path.display());
        Ok(path)
    }
}
