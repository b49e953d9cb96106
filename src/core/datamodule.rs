use crate::config::DatasetConfig;
use crate::core::render::{RenderConfig, Renderer};
use crate::core::subset::{clip, ClipOutcome, CoordinateTransform, GdalCoordinateTransform};
use crate::core::timeseries::TimeSeriesRecord;
use crate::io::{
    checkdir, get_filelist, save_timeseries, BandLoader, EarthEngineClient, EeSearch,
    FilenameParser, GdalRasterReader, Persister, RasterReader,
};
use crate::types::{AreaOfInterest, Product, SarError, SarResult};
use std::path::{Path, PathBuf};

/// State shared by every data module: AOI, outputs and the CRS transform
pub struct ModuleCore {
    pub aoi: Option<AreaOfInterest>,
    pub output_dir: PathBuf,
    pub renderer: Renderer,
    pub persister: Persister,
    pub transform: Box<dyn CoordinateTransform>,
}

impl ModuleCore {
    /// Build from the dataset section, creating output directories
    pub fn from_config(cfg: &DatasetConfig) -> SarResult<Self> {
        checkdir(&cfg.outdir)?;
        checkdir(cfg.save_dir())?;

        let mut render = RenderConfig::new(&cfg.outdir);
        render.limits = cfg.plot_limits();
        render.station = cfg.station;
        if let Some(aoi) = &cfg.aoi {
            render.station_crs = aoi.crs.clone();
        }

        Ok(Self {
            aoi: cfg.aoi.clone(),
            output_dir: cfg.outdir.clone(),
            renderer: Renderer::new(render),
            persister: Persister::new(cfg.save_dir()),
            transform: Box::new(GdalCoordinateTransform),
        })
    }

    pub fn with_transform(mut self, transform: Box<dyn CoordinateTransform>) -> Self {
        self.transform = transform;
        self
    }

    fn require_aoi(&self) -> SarResult<&AreaOfInterest> {
        self.aoi.as_ref().ok_or_else(|| {
            SarError::Configuration("the subset stage requires dataset.aoi".to_string())
        })
    }
}

/// One source format behind the pipeline: read, subset, plot and save products
pub trait DataModule {
    /// Short name for logging
    fn name(&self) -> &'static str;

    fn core(&self) -> &ModuleCore;

    /// Sources to process, in processing order
    fn filelist(&self) -> SarResult<Vec<String>>;

    /// Build a product from one source
    fn read_file(&self, file: &str) -> SarResult<Product>;

    /// Clip a product to the configured AOI
    fn subset(&self, product: Product) -> SarResult<ClipOutcome> {
        let core = self.core();
        clip(product, core.require_aoi()?, core.transform.as_ref())
    }

    fn plot(&self, product: &Product) -> SarResult<PathBuf> {
        let core = self.core();
        core.renderer.plot_product(product, core.transform.as_ref())
    }

    fn save(&self, product: &Product) -> SarResult<PathBuf> {
        self.core().persister.save(product)
    }

    /// Persist and plot the aggregated time series.
    ///
    /// A failed figure is logged; the persisted record is still returned.
    fn write_timeseries(&self, record: &TimeSeriesRecord) -> SarResult<Vec<PathBuf>> {
        let core = self.core();
        let mut outputs = vec![save_timeseries(record, &core.output_dir)?];
        match core.renderer.plot_timeseries(record) {
            Ok(figure) => outputs.push(figure),
            Err(e) => log::warn!("Time-series figure not written: {}", e),
        }
        Ok(outputs)
    }
}

fn keep_band(allowed: &Option<Vec<String>>, band: &str) -> bool {
    allowed.as_ref().map_or(true, |list| list.iter().any(|b| b == band))
}

/// Directories of single-band GeoTIFFs, one directory per acquisition
pub struct GeotiffStack<R: RasterReader = GdalRasterReader> {
    core: ModuleCore,
    parser: FilenameParser,
    loader: BandLoader,
    reader: R,
    bands: Option<Vec<String>>,
    dir: Option<PathBuf>,
    files: Option<Vec<String>>,
    ext: Option<String>,
}

impl GeotiffStack<GdalRasterReader> {
    pub fn new(cfg: &DatasetConfig) -> SarResult<Self> {
        Self::with_reader(cfg, GdalRasterReader::new())
    }
}

impl<R: RasterReader> GeotiffStack<R> {
    pub fn with_reader(cfg: &DatasetConfig, reader: R) -> SarResult<Self> {
        let parser = FilenameParser::new(cfg.meta_map.clone())?;
        if parser.meta_map().band_start.is_none() {
            return Err(SarError::Configuration(
                "meta_map.band_start is required for geotiff stacks".to_string(),
            ));
        }
        Ok(Self {
            core: ModuleCore::from_config(cfg)?,
            parser,
            loader: BandLoader::new(cfg.target_crs.clone(), cfg.convert_to_db),
            reader,
            bands: cfg.bands.clone(),
            dir: cfg.dir.clone(),
            files: cfg.files.clone(),
            ext: cfg.ext.clone(),
        })
    }

    pub fn with_transform(mut self, transform: Box<dyn CoordinateTransform>) -> Self {
        self.core = self.core.with_transform(transform);
        self
    }
}

impl<R: RasterReader> DataModule for GeotiffStack<R> {
    fn name(&self) -> &'static str {
        "geotiff_stack"
    }

    fn core(&self) -> &ModuleCore {
        &self.core
    }

    fn filelist(&self) -> SarResult<Vec<String>> {
        get_filelist(self.dir.as_deref(), self.files.as_deref(), self.ext.as_deref())
    }

    fn read_file(&self, file: &str) -> SarResult<Product> {
        let product_dir = Path::new(file);
        let name = product_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.to_string());
        let metadata = self.parser.parse(&name)?;
        let mut product = Product::new(name, metadata);

        for member in self.reader.list_band_files(product_dir)? {
            let member_name = member
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let band = match self.parser.band_name(&member_name) {
                Ok(band) => band,
                Err(e) => {
                    log::warn!("Skipping band file {}: {}", member.display(), e);
                    continue;
                }
            };
            if !keep_band(&self.bands, &band) {
                log::debug!("Band {} not in allow-list, skipping", band);
                continue;
            }
            let raster = self.loader.load_band(&self.reader, &member, &band)?;
            if product.bands.insert(band.clone(), raster).is_some() {
                log::warn!("{}: band {} appears twice, keeping the last", product.provenance, band);
            }
        }

        if product.bands.is_empty() {
            return Err(SarError::InvalidFormat(format!(
                "{}: no bands loaded",
                product.provenance
            )));
        }
        log::info!("{}: loaded bands {:?}", product.provenance, product.band_names());
        Ok(product)
    }
}

/// Earth Engine images sampled over the AOI through an [`EarthEngineClient`]
pub struct EarthEngineModule<C: EarthEngineClient> {
    core: ModuleCore,
    parser: FilenameParser,
    loader: BandLoader,
    client: C,
    search: EeSearch,
    bands: Option<Vec<String>>,
}

impl<C: EarthEngineClient> EarthEngineModule<C> {
    pub fn new(cfg: &DatasetConfig, client: C) -> SarResult<Self> {
        let parser = FilenameParser::new(cfg.meta_map.clone())?;
        let search = cfg.earth_engine.clone().ok_or_else(|| {
            SarError::Configuration("dataset.earth_engine search is missing".to_string())
        })?;
        let core = ModuleCore::from_config(cfg)?;
        core.require_aoi()?;
        Ok(Self {
            core,
            parser,
            loader: BandLoader::new(cfg.target_crs.clone(), cfg.convert_to_db),
            client,
            search,
            bands: cfg.bands.clone(),
        })
    }

    pub fn with_transform(mut self, transform: Box<dyn CoordinateTransform>) -> Self {
        self.core = self.core.with_transform(transform);
        self
    }
}

impl<C: EarthEngineClient> DataModule for EarthEngineModule<C> {
    fn name(&self) -> &'static str {
        "earth_engine"
    }

    fn core(&self) -> &ModuleCore {
        &self.core
    }

    fn filelist(&self) -> SarResult<Vec<String>> {
        let ids = self.client.search(&self.search, self.core.require_aoi()?)?;
        log::info!(
            "Found {} images in {} between {} and {}",
            ids.len(),
            self.search.collection,
            self.search.start,
            self.search.end
        );
        Ok(ids)
    }

    fn read_file(&self, file: &str) -> SarResult<Product> {
        let aoi = self.core.require_aoi()?;
        let metadata = self.parser.parse(file)?;
        let mut product = Product::new(file, metadata);

        for band in self.client.band_names(file)? {
            if !keep_band(&self.bands, &band) {
                continue;
            }
            let raw = self.client.sample_rectangle(file, &band, aoi)?;
            let raster = self.loader.prepare(raw, &band, file)?;
            product.bands.insert(band, raster);
        }

        if product.bands.is_empty() {
            return Err(SarError::InvalidFormat(format!("{}: no bands sampled", file)));
        }
        Ok(product)
    }
}
