use approx::assert_abs_diff_eq;
use ndarray::Array3;
use sarstack::core::{EarthEngineModule, GeotiffStack, Pipeline, SaveMode, Stage};
use sarstack::io::{load_timeseries, EarthEngineClient, EeSearch, MemoryRasterReader, Persister};
use sarstack::types::{AreaOfInterest, Crs, GeoTransform, RawRaster, SarResult};
use sarstack::{PipelineConfig, RunConfig};
use std::path::Path;

const UTM: &str = "EPSG:32618";

fn product_name(day: u32) -> String {
    format!("RCM1_OK1_PK1_3M_202301{:02}_101010_HH_GRD", day)
}

/// 4x4 single-band raster, top-left at (x0, 10), 1 m pixels
fn raw(value: f32, x0: f64) -> RawRaster {
    RawRaster {
        data: Array3::from_elem((1, 4, 4), value),
        transform: GeoTransform::from_gdal([x0, 1.0, 0.0, 10.0, 0.0, -1.0]),
        crs: Some(Crs::new(UTM)),
    }
}

fn add_product(reader: &mut MemoryRasterReader, day: u32, value: f32, x0: f64) -> String {
    let dir = format!("/virtual/{}", product_name(day));
    reader.insert(
        format!("{}/RCM1_OK1_PK1_3M_202301{:02}_101010_HH_GRD.tif", dir, day),
        raw(value, x0),
    );
    dir
}

fn config(outdir: &Path, files: &[String], stages: &str) -> RunConfig {
    let yaml = format!(
        r#"
dataset:
  files: {files:?}
  outdir: "{outdir}"
  meta_map: {{date: 4, time: 5, sat: 0, mode: 3, band_start: 6}}
  aoi:
    crs: "{UTM}"
    vertices: [[1.0, 7.0], [3.0, 7.0], [3.0, 9.0], [1.0, 9.0]]
pipeline:
  stages: {stages}
"#,
        files = files,
        outdir = outdir.display(),
        UTM = UTM,
        stages = stages,
    );
    RunConfig::from_yaml_str(&yaml).unwrap()
}

#[test]
fn test_rcm_stack_end_to_end() {
    let _ = env_logger::builder().is_test(true).try_init();
    let out = tempfile::tempdir().unwrap();

    let mut reader = MemoryRasterReader::new();
    let files = vec![
        add_product(&mut reader, 1, 10.0, 0.0),
        add_product(&mut reader, 2, 100.0, 0.0),
        "/virtual/not_a_product".to_string(),
        add_product(&mut reader, 3, 1000.0, 0.0),
        add_product(&mut reader, 4, 5.0, 5000.0),
    ];

    let cfg = config(out.path(), &files, "[read, subset, save, timeseries]");
    let module = GeotiffStack::with_reader(&cfg.dataset, reader).unwrap();
    let pipeline = Pipeline::new(cfg.pipeline().unwrap().clone()).unwrap();
    let summary = pipeline.run(&module).unwrap();

    assert_eq!(summary.files_total, 5);
    assert_eq!(summary.processed, 4);
    assert_eq!(summary.read_failures, 1);
    assert_eq!(summary.no_data, 1);
    assert_eq!(summary.stage_failures, 0);
    assert!(!summary.stopped_early);
    assert_eq!(summary.saved.len(), 3);

    let saved = Persister::load(&summary.saved[0]).unwrap();
    assert_eq!(saved.provenance, product_name(1));
    let hh = saved.band("HH").unwrap();
    assert_eq!(hh.shape(), (2, 2));
    assert_eq!(hh.transform.top_left_x, 1.0);
    assert_eq!(hh.transform.top_left_y, 9.0);
    assert_abs_diff_eq!(hh.data[[0, 0]], 10.0, epsilon = 1e-4);

    assert_eq!(summary.timeseries[0], out.path().join("timeseries.json"));
    let record = load_timeseries(&summary.timeseries[0]).unwrap();
    assert_eq!(record.len(), 3);
    let series = record.scalar_series("HH").unwrap();
    assert_abs_diff_eq!(series[0], 10.0, epsilon = 1e-4);
    assert_abs_diff_eq!(series[1], 20.0, epsilon = 1e-4);
    assert_abs_diff_eq!(series[2], 30.0, epsilon = 1e-4);
    let days: Vec<u32> = record
        .timestamps()
        .iter()
        .map(|t| t.format("%d").to_string().parse().unwrap())
        .collect();
    assert_eq!(days, vec![1, 2, 3]);
}

#[test]
fn test_band_allow_list_and_read_only() {
    let out = tempfile::tempdir().unwrap();
    let mut reader = MemoryRasterReader::new();
    let dir = add_product(&mut reader, 1, 10.0, 0.0);
    reader.insert(
        format!("{}/RCM1_OK1_PK1_3M_20230101_101010_HV_GRD.tif", dir),
        raw(1.0, 0.0),
    );

    let mut cfg = config(out.path(), &[dir.clone()], "[read]");
    cfg.dataset.bands = Some(vec!["HV".to_string()]);
    let module = GeotiffStack::with_reader(&cfg.dataset, reader).unwrap();

    use sarstack::DataModule;
    let product = module.read_file(&dir).unwrap();
    assert_eq!(product.band_names(), vec!["HV".to_string()]);
    assert_abs_diff_eq!(product.band("HV").unwrap().data[[0, 0]], 0.0, epsilon = 1e-6);

    let summary = Pipeline::new(cfg.pipeline().unwrap().clone())
        .unwrap()
        .run(&module)
        .unwrap();
    assert_eq!(summary.processed, 1);
    assert!(summary.saved.is_empty());
    assert!(summary.timeseries.is_empty());
}

#[test]
fn test_single_shot_save_stops_after_first_file() {
    let out = tempfile::tempdir().unwrap();
    let mut reader = MemoryRasterReader::new();
    let files = vec![
        add_product(&mut reader, 1, 10.0, 0.0),
        add_product(&mut reader, 2, 100.0, 0.0),
    ];

    let cfg = config(out.path(), &files, "[read, timeseries, save]");
    let module = GeotiffStack::with_reader(&cfg.dataset, reader).unwrap();
    let mut pipeline_cfg = PipelineConfig::new(vec![Stage::Read, Stage::Timeseries, Stage::Save]);
    pipeline_cfg.save_mode = SaveMode::SingleShot;

    let summary = Pipeline::new(pipeline_cfg).unwrap().run(&module).unwrap();
    assert!(summary.stopped_early);
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.saved.len(), 1);

    let record = load_timeseries(&summary.timeseries[0]).unwrap();
    assert_eq!(record.len(), 1);
}

#[test]
fn test_full_resolution_time_series() {
    let out = tempfile::tempdir().unwrap();
    let mut reader = MemoryRasterReader::new();
    let files = vec![
        add_product(&mut reader, 1, 10.0, 0.0),
        add_product(&mut reader, 2, 100.0, 0.0),
    ];

    let cfg = config(out.path(), &files, "[read, subset, timeseries]");
    let module = GeotiffStack::with_reader(&cfg.dataset, reader).unwrap();
    let mut pipeline_cfg = cfg.pipeline().unwrap().clone();
    pipeline_cfg.avg_values = false;

    let summary = Pipeline::new(pipeline_cfg).unwrap().run(&module).unwrap();
    let record = load_timeseries(&summary.timeseries[0]).unwrap();
    let samples = &record.per_band["HH"];
    assert_eq!(samples.len(), 2);
    match &samples[1] {
        sarstack::core::BandSample::Array(a) => {
            assert_eq!(a.dim(), (2, 2));
            assert_abs_diff_eq!(a[[1, 1]], 20.0, epsilon = 1e-4);
        }
        other => panic!("expected an array sample, got {:?}", other),
    }
}

/// Serves one zero-padded VV/VH sample per image id
struct FakeEarthEngine {
    ids: Vec<String>,
}

impl EarthEngineClient for FakeEarthEngine {
    fn search(&self, query: &EeSearch, _aoi: &AreaOfInterest) -> SarResult<Vec<String>> {
        assert_eq!(query.instrument_mode, "IW");
        Ok(self.ids.clone())
    }

    fn band_names(&self, _image_id: &str) -> SarResult<Vec<String>> {
        Ok(vec!["VV".to_string(), "VH".to_string(), "angle".to_string()])
    }

    fn sample_rectangle(&self, _image_id: &str, band: &str, _aoi: &AreaOfInterest) -> SarResult<RawRaster> {
        let value = if band == "VV" { 100.0 } else { 10.0 };
        let mut data = Array3::from_elem((1, 2, 2), value);
        data[[0, 0, 0]] = 0.0;
        Ok(RawRaster {
            data,
            transform: GeoTransform::from_gdal([1.0, 1.0, 0.0, 9.0, 0.0, -1.0]),
            crs: Some(Crs::new(UTM)),
        })
    }
}

#[test]
fn test_earth_engine_module_time_series() {
    let out = tempfile::tempdir().unwrap();
    let yaml = format!(
        r#"
dataset:
  kind: earth_engine
  outdir: "{}"
  meta_map: {{date: 4, sat: 0, mode: 1, datetime_format: "%Y%m%dT%H%M%S"}}
  bands: [VV, VH]
  aoi:
    crs: "{}"
    vertices: [[1.0, 7.0], [3.0, 7.0], [3.0, 9.0], [1.0, 9.0]]
  earth_engine: {{start: 2023-01-01, end: 2023-02-01}}
pipeline:
  stages: [read, subset, timeseries]
"#,
        out.path().display(),
        UTM
    );
    let cfg = RunConfig::from_yaml_str(&yaml).unwrap();
    let client = FakeEarthEngine {
        ids: vec![
            "S1A_IW_GRDH_1SDV_20230101T120000_20230101T120025_046000_058000_ABCD".to_string(),
            "S1A_IW_GRDH_1SDV_20230113T120000_20230113T120025_046175_058600_EF01".to_string(),
        ],
    };
    let module = EarthEngineModule::new(&cfg.dataset, client).unwrap();
    let summary = Pipeline::new(cfg.pipeline().unwrap().clone())
        .unwrap()
        .run(&module)
        .unwrap();

    assert_eq!(summary.processed, 2);
    let record = load_timeseries(&summary.timeseries[0]).unwrap();
    assert_eq!(record.per_band.keys().cloned().collect::<Vec<_>>(), vec!["VH", "VV"]);
    let vv = record.scalar_series("VV").unwrap();
    assert_abs_diff_eq!(vv[0], 20.0, epsilon = 1e-4);
    let vh = record.scalar_series("VH").unwrap();
    assert_abs_diff_eq!(vh[1], 10.0, epsilon = 1e-4);
}

#[test]
fn test_run_config_rejects_earth_engine_without_client() {
    let out = tempfile::tempdir().unwrap();
    let yaml = format!(
        r#"
dataset:
  kind: earth_engine
  outdir: "{}"
  meta_map: {{date: 4, sat: 0, mode: 1}}
  aoi:
    vertices: [[-75.8, 45.3], [-75.6, 45.3], [-75.6, 45.5]]
  earth_engine: {{start: 2023-01-01, end: 2023-02-01}}
pipeline:
  stages: [read]
"#,
        out.path().display()
    );
    let cfg = RunConfig::from_yaml_str(&yaml).unwrap();
    let err = sarstack::run_config(&cfg).unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn test_plot_stage_writes_figures() {
    let out = tempfile::tempdir().unwrap();
    let mut reader = MemoryRasterReader::new();
    let files = vec![
        add_product(&mut reader, 1, 10.0, 0.0),
        add_product(&mut reader, 2, 100.0, 0.0),
    ];

    let cfg = config(out.path(), &files, "[read, subset, plot, timeseries]");
    let module = GeotiffStack::with_reader(&cfg.dataset, reader).unwrap();
    let summary = Pipeline::new(cfg.pipeline().unwrap().clone())
        .unwrap()
        .run(&module)
        .unwrap();

    assert_eq!(summary.stage_failures, 0);
    assert_eq!(
        summary.figures,
        vec![
            out.path().join("RCM1_20230101_101010.png"),
            out.path().join("RCM1_20230102_101010.png"),
        ]
    );
    assert!(summary.figures.iter().all(|p| p.is_file()));

    let chart = out.path().join("timeseries.png");
    assert!(summary.timeseries.contains(&chart));
    assert!(chart.is_file());
    assert!(!summary.timeseries_failed);
}

#[test]
fn test_unwritable_time_series_keeps_summary() {
    let out = tempfile::tempdir().unwrap();
    let outdir = out.path().join("results");
    let mut reader = MemoryRasterReader::new();
    let files = vec![
        add_product(&mut reader, 1, 10.0, 0.0),
        add_product(&mut reader, 2, 100.0, 0.0),
    ];

    let cfg = config(&outdir, &files, "[read, timeseries]");
    let module = GeotiffStack::with_reader(&cfg.dataset, reader).unwrap();
    std::fs::remove_dir_all(&outdir).unwrap();

    let summary = Pipeline::new(cfg.pipeline().unwrap().clone())
        .unwrap()
        .run(&module)
        .unwrap();
    assert_eq!(summary.processed, 2);
    assert!(summary.timeseries.is_empty());
    assert!(summary.timeseries_failed);
}

#[test]
fn test_failed_save_skips_file_and_continues() {
    let out = tempfile::tempdir().unwrap();
    let savedir = out.path().join("saved");
    let mut reader = MemoryRasterReader::new();
    let files = vec![
        add_product(&mut reader, 1, 10.0, 0.0),
        add_product(&mut reader, 2, 100.0, 0.0),
        add_product(&mut reader, 3, 1000.0, 0.0),
    ];

    let mut cfg = config(out.path(), &files, "[read, save, timeseries]");
    cfg.dataset.savedir = Some(savedir.clone());
    let module = GeotiffStack::with_reader(&cfg.dataset, reader).unwrap();
    // a regular file where the save directory should be
    std::fs::remove_dir_all(&savedir).unwrap();
    std::fs::write(&savedir, b"not a directory").unwrap();

    let summary = Pipeline::new(cfg.pipeline().unwrap().clone())
        .unwrap()
        .run(&module)
        .unwrap();
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.stage_failures, 3);
    assert!(summary.saved.is_empty());
    assert!(summary.timeseries.is_empty());
    assert!(!summary.timeseries_failed);
}

#[test]
fn test_configuration_error_in_stage_aborts_run() {
    let out = tempfile::tempdir().unwrap();
    let mut reader = MemoryRasterReader::new();
    let files = vec![add_product(&mut reader, 1, 10.0, 0.0)];

    let mut cfg = config(out.path(), &files, "[read]");
    cfg.dataset.aoi = None;
    let module = GeotiffStack::with_reader(&cfg.dataset, reader).unwrap();

    let err = Pipeline::new(PipelineConfig::new(vec![Stage::Read, Stage::Subset]))
        .unwrap()
        .run(&module)
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("aoi"));
}
