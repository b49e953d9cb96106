use crate::config::PipelineConfig;
use crate::core::datamodule::DataModule;
use crate::core::subset::ClipOutcome;
use crate::core::timeseries::aggregate;
use crate::types::{Product, SarResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Pipeline stage names as declared in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Read,
    Subset,
    Plot,
    Save,
    Timeseries,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Read => "read",
            Stage::Subset => "subset",
            Stage::Plot => "plot",
            Stage::Save => "save",
            Stage::Timeseries => "timeseries",
        };
        write!(f, "{}", name)
    }
}

/// Behaviour of the save stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveMode {
    /// Save every product and continue
    #[default]
    All,
    /// End the run after the first successful save
    SingleShot,
}

/// Outcome counts of one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub files_total: usize,
    /// Files read successfully
    pub processed: usize,
    pub read_failures: usize,
    /// Files whose AOI clip found no data
    pub no_data: usize,
    /// Files abandoned after a plot/save/subset error
    pub stage_failures: usize,
    /// True when single-shot save ended the run
    pub stopped_early: bool,
    pub saved: Vec<PathBuf>,
    pub figures: Vec<PathBuf>,
    /// Time-series artifacts, when the timeseries stage ran
    pub timeseries: Vec<PathBuf>,
    /// Products were accumulated but the time series could not be built or written
    pub timeseries_failed: bool,
}

/// Drives every file of a data module through the declared stages
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> SarResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.config.stages
    }

    /// Process every file of `module`.
    ///
    /// Every file is read before the stage list runs, so `read` is implicit;
    /// when listed it must be the first stage.
    ///
    /// Per-file failures are logged and the file skipped; only configuration
    /// errors abort the run. Products reaching the `timeseries` stage are
    /// kept in memory until the file loop ends.
    pub fn run(&self, module: &dyn DataModule) -> SarResult<RunSummary> {
        let files = module.filelist()?;
        let mut summary = RunSummary {
            files_total: files.len(),
            ..Default::default()
        };
        log::info!("{}: number of files: {}", module.name(), files.len());
        log::info!("Stages: {:?}", self.config.stages);

        let last = self.config.stages.len() - 1;
        let mut accumulated: Vec<Product> = Vec::new();

        'files: for file in &files {
            log::info!("processing file: {}", file);
            let product = match module.read_file(file) {
                Ok(product) => product,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::warn!("Failed to read {}: {}; skipping file", file, e);
                    summary.read_failures += 1;
                    continue;
                }
            };
            summary.processed += 1;

            let mut working = Some(product);
            for (i, stage) in self.config.stages.iter().enumerate() {
                let Some(product) = working.take() else {
                    break;
                };
                let result = match stage {
                    // reading already happened above; `read` only marks the start
                    Stage::Read => {
                        working = Some(product);
                        Ok(())
                    }
                    Stage::Subset => match module.subset(product) {
                        Ok(ClipOutcome::Clipped(clipped)) => {
                            working = Some(clipped);
                            Ok(())
                        }
                        Ok(ClipOutcome::NoDataInBounds { band }) => {
                            log::warn!(
                                "{}: AOI holds no data for band {}; skipping remaining stages",
                                file,
                                band
                            );
                            summary.no_data += 1;
                            continue 'files;
                        }
                        Err(e) => Err(e),
                    },
                    Stage::Plot => {
                        let result = module.plot(&product).map(|path| summary.figures.push(path));
                        working = Some(product);
                        result
                    }
                    Stage::Save => match module.save(&product) {
                        Ok(path) => {
                            summary.saved.push(path);
                            if self.config.save_mode == SaveMode::SingleShot {
                                log::warn!("Single-shot save mode: ending run after first save");
                                summary.stopped_early = true;
                                break 'files;
                            }
                            working = Some(product);
                            Ok(())
                        }
                        Err(e) => Err(e),
                    },
                    Stage::Timeseries => {
                        if i == last {
                            accumulated.push(product);
                        } else {
                            accumulated.push(product.clone());
                            working = Some(product);
                        }
                        Ok(())
                    }
                };

                if let Err(e) = result {
                    if e.is_fatal() {
                        return Err(e);
                    }
                    log::warn!("{} failed for {}: {}; skipping remaining stages", stage, file, e);
                    summary.stage_failures += 1;
                    continue 'files;
                }
            }
        }

        if !accumulated.is_empty() {
            log::info!("Building time series from {} products", accumulated.len());
            let written = aggregate(&accumulated, self.config.avg_values)
                .and_then(|record| module.write_timeseries(&record));
            drop(accumulated);
            match written {
                Ok(paths) => summary.timeseries = paths,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::warn!("Time series not written: {}; keeping per-file results", e);
                    summary.timeseries_failed = true;
                }
            }
        } else if self.config.stages.contains(&Stage::Timeseries) {
            log::warn!("timeseries stage declared but no product reached it");
        }

        log::info!(
            "finished processing {} files ({} listed, {} unreadable, {} without data in AOI, {} failed)",
            summary.processed,
            summary.files_total,
            summary.read_failures,
            summary.no_data,
            summary.stage_failures
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SarError;

    #[test]
    fn test_stage_names_round_trip() {
        let stages: Vec<Stage> = serde_yaml::from_str("[read, subset, plot, save, timeseries]").unwrap();
        assert_eq!(stages.len(), 5);
        let names: Vec<String> = stages.iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["read", "subset", "plot", "save", "timeseries"]);
    }

    #[test]
    fn test_save_mode_parse() {
        let mode: SaveMode = serde_yaml::from_str("single_shot").unwrap();
        assert_eq!(mode, SaveMode::SingleShot);
        assert_eq!(SaveMode::default(), SaveMode::All);
    }

    #[test]
    fn test_read_must_lead_the_stage_list() {
        assert!(Pipeline::new(PipelineConfig::new(vec![Stage::Subset, Stage::Read])).is_err());
        assert!(Pipeline::new(PipelineConfig::new(vec![Stage::Read, Stage::Read])).is_err());
        assert!(Pipeline::new(PipelineConfig::new(vec![Stage::Subset, Stage::Save])).is_ok());
        assert!(Pipeline::new(PipelineConfig::new(vec![Stage::Read, Stage::Save])).is_ok());
    }

    #[test]
    fn test_empty_stage_list_rejected() {
        assert!(matches!(
            Pipeline::new(PipelineConfig::new(vec![])),
            Err(SarError::Configuration(_))
        ));
    }
}
