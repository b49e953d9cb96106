use anyhow::{Context, Result};
use clap::Parser;
use sarstack::{run_config, RunConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about = "run a SAR product pipeline from a YAML config")]
pub struct Args {
    /// Pipeline configuration file
    #[arg(short, long, env = "SARSTACK_CONFIG")]
    pub config: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = RunConfig::from_yaml_file(&args.config)
        .with_context(|| format!("invalid configuration {}", args.config.display()))?;

    let summary = run_config(&config)?;
    if summary.stopped_early {
        log::info!("run ended after the first save (single_shot)");
    }
    for path in &summary.timeseries {
        println!("{}", path.display());
    }
    Ok(())
}
