//! Python bindings, built with the `python` feature

use crate::config::RunConfig;
use crate::core::{DataModule, GeotiffStack};
use crate::io::{FilenameParser, MetaMap};
use numpy::ToPyArray;
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::path::Path;

fn to_py_err(e: crate::SarError) -> PyErr {
    if e.is_fatal() {
        PyValueError::new_err(e.to_string())
    } else {
        PyRuntimeError::new_err(e.to_string())
    }
}

/// Run a pipeline from a YAML config file and return its summary
#[pyfunction]
fn run_pipeline(py: Python, config_path: String) -> PyResult<PyObject> {
    let config = RunConfig::from_yaml_file(Path::new(&config_path)).map_err(to_py_err)?;
    let summary = crate::run_config(&config).map_err(to_py_err)?;

    let result = PyDict::new(py);
    result.set_item("files_total", summary.files_total)?;
    result.set_item("processed", summary.processed)?;
    result.set_item("read_failures", summary.read_failures)?;
    result.set_item("no_data", summary.no_data)?;
    result.set_item("stage_failures", summary.stage_failures)?;
    result.set_item("stopped_early", summary.stopped_early)?;
    let saved: Vec<String> = summary.saved.iter().map(|p| p.display().to_string()).collect();
    result.set_item("saved", saved)?;
    let timeseries: Vec<String> = summary.timeseries.iter().map(|p| p.display().to_string()).collect();
    result.set_item("timeseries", timeseries)?;
    result.set_item("timeseries_failed", summary.timeseries_failed)?;
    Ok(result.into())
}

/// Parse acquisition metadata from a product name.
///
/// The token layout comes from `meta_map` (an inline YAML mapping such as
/// `"{date: 4, time: 5, sat: 0, mode: 3}"`) or from the `dataset.meta_map` of
/// `config_path`; the RCM layout is used when neither is given.
#[pyfunction]
#[pyo3(signature = (filename, meta_map=None, config_path=None))]
fn parse_filename(
    py: Python,
    filename: String,
    meta_map: Option<String>,
    config_path: Option<String>,
) -> PyResult<PyObject> {
    let meta_map = match (meta_map, config_path) {
        (Some(_), Some(_)) => {
            return Err(PyValueError::new_err("give either meta_map or config_path, not both"))
        }
        (Some(inline), None) => MetaMap::from_yaml_str(&inline).map_err(to_py_err)?,
        (None, Some(path)) => {
            let config = RunConfig::from_yaml_file(Path::new(&path)).map_err(to_py_err)?;
            FilenameParser::new(config.dataset.meta_map)
                .map_err(to_py_err)?
                .meta_map()
                .clone()
        }
        (None, None) => MetaMap::rcm(),
    };
    let parser = FilenameParser::new(Some(meta_map)).map_err(to_py_err)?;
    let record = parser.parse(&filename).map_err(to_py_err)?;

    let result = PyDict::new(py);
    result.set_item("acquisition_time", record.acquisition_time.to_rfc3339())?;
    result.set_item("satellite", record.satellite)?;
    result.set_item("mode", record.mode)?;
    Ok(result.into())
}

/// Read one product directory of the configured dataset into numpy arrays
#[pyfunction]
fn read_product(py: Python, config_path: String, product_dir: String) -> PyResult<PyObject> {
    let config = RunConfig::from_yaml_file(Path::new(&config_path)).map_err(to_py_err)?;
    let module = GeotiffStack::new(&config.dataset).map_err(to_py_err)?;
    let product = module.read_file(&product_dir).map_err(to_py_err)?;

    let bands = PyDict::new(py);
    for (name, raster) in &product.bands {
        bands.set_item(name, raster.data.to_pyarray(py))?;
    }
    let result = PyDict::new(py);
    result.set_item("provenance", &product.provenance)?;
    result.set_item("satellite", &product.metadata.satellite)?;
    result.set_item("mode", &product.metadata.mode)?;
    result.set_item("acquisition_time", product.metadata.acquisition_time.to_rfc3339())?;
    result.set_item("bands", bands)?;
    Ok(result.into())
}

#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(run_pipeline, m)?)?;
    m.add_function(wrap_pyfunction!(parse_filename, m)?)?;
    m.add_function(wrap_pyfunction!(read_product, m)?)?;
    Ok(())
}
