//! Input/output: filenames, raster decoding, band loading and persistence

pub mod band_loader;
pub mod earth_engine;
pub mod filelist;
pub mod filename;
pub mod persist;
pub mod raster;

pub use band_loader::{is_power_band, lin_to_db, BandLoader, POWER_BANDS};
pub use earth_engine::{EarthEngineClient, EeSearch};
pub use filelist::{checkdir, get_filelist};
pub use filename::{FilenameParser, MetaMap, BAND_STOPWORDS};
pub use persist::{load_timeseries, save_timeseries, Persister};
pub use raster::{save_geotiff, GdalRasterReader, MemoryRasterReader, RasterReader};
