use anyhow::Result;
use std::path::PathBuf;

extern crate s2_grid_raster;
use s2_grid_raster::config::PipelineConfig;
use s2_grid_raster::earthengine::EarthEngine;
use s2_grid_raster::pipeline;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();

    let mut config = PipelineConfig::template();
    config.aoi = PathBuf::from("./inputs/farm.geojson");
    config.output_dir = PathBuf::from("./outputs");
    config.bands = vec!["B4".to_string(), "NDVI".to_string()];

    std::fs::create_dir_all(&config.output_dir)?;

    let service = EarthEngine::from_config(&config.earthengine)?;
    let written = pipeline::run(&config, &service).await?;
    println!("{:?}", written);

    Ok(())
}
