use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use s2_grid_raster::config::PipelineConfig;
use s2_grid_raster::earthengine::EarthEngine;
use s2_grid_raster::pipeline;

/// Sample a cloud-free Sentinel-2 median composite onto a regular grid over an
/// area of interest and write it as a GeoTIFF.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Pipeline configuration (TOML); the built-in defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the default configuration to this path and exit
    #[arg(long)]
    write_template: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Some(path) = args.write_template {
        PipelineConfig::template().write(&path)?;
        log::info!("Wrote template to {}", path.display());
        return Ok(());
    }

    let config = match args.config {
        Some(path) => PipelineConfig::read(path)?,
        None => PipelineConfig::template(),
    };

    let service = EarthEngine::from_config(&config.earthengine)?;
    let written = pipeline::run(&config, &service).await?;
    for path in written {
        println!("{}", path.display());
    }

    Ok(())
}
