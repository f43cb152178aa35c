use crate::config::PipelineConfig;
use crate::earthengine::ComputeService;
use crate::error::PipelineError;
use crate::geometry;
use crate::grid::Grid;
use crate::raster::{self, OutputRaster};
use crate::sampler::{self, SampleTable};
use crate::sentinel2::Compositor;
use anyhow::Result;
use std::collections::HashSet;
use std::path::PathBuf;

/// Runs every stage once and returns the paths of the rasters written.
pub async fn run(config: &PipelineConfig, service: &impl ComputeService) -> Result<Vec<PathBuf>> {
    config.validate()?;

    let bounds = geometry::load_bounds(&config.aoi)?;
    if bounds.looks_geographic() != config.crs.is_geographic() {
        log::warn!(
            "Area of interest bounds {:?} do not look like {} coordinates; \
             the vector file must already be in the output CRS",
            bounds,
            config.crs
        );
    }
    let grid = Grid::new(bounds, config.pixel_size, config.crs.clone())?;
    log::info!(
        "Grid of {} columns by {} rows ({} points)",
        grid.len_x(),
        grid.len_y(),
        grid.len()
    );

    let compositor = Compositor::from_config(config);
    let composite = compositor.composite(grid.footprint());

    let table = sampler::sample(
        service,
        composite,
        grid.points(),
        &config.bands,
        grid.crs(),
        config.collection.scale,
    )
    .await?;

    if table.len() != grid.len() {
        return Err(PipelineError::Shape {
            expected: grid.len(),
            actual: table.len(),
        }
        .into());
    }

    let cells = locate(&grid, &table)?;

    let (west, north) = grid.origin();
    let transform =
        raster::transform_from_origin(west, north, grid.pixel_size(), grid.pixel_size());

    let mut written = vec![];
    for band in config.bands.iter() {
        let values = table.band(band)?;
        let data = raster::place(&values, &cells, grid.shape())?;
        let output = OutputRaster {
            data: raster::flip_vertical(&data),
            transform,
            crs: grid.crs().clone(),
        };

        let path = raster::output_path(&config.output_dir, &output_stem(config, band));
        output.write_geotiff(&path)?;
        written.push(path);
    }

    log::info!("Done");
    Ok(written)
}

/// Grid cell of every sample row. Each node must be hit exactly once.
fn locate(grid: &Grid, table: &SampleTable) -> Result<Vec<(usize, usize)>> {
    let mut seen = HashSet::new();
    let mut cells = Vec::with_capacity(table.len());
    for (x, y) in table.coordinates()? {
        match grid.cell(x, y) {
            Some(cell) if seen.insert(cell) => cells.push(cell),
            Some(_) => log::warn!("Duplicate sample at ({x}, {y})"),
            None => log::warn!("Sample at ({x}, {y}) lies outside the grid"),
        }
    }

    if cells.len() != grid.len() {
        return Err(PipelineError::Shape {
            expected: grid.len(),
            actual: cells.len(),
        }
        .into());
    }
    Ok(cells)
}

fn output_stem(config: &PipelineConfig, band: &str) -> String {
    if config.bands.len() == 1 {
        config.output_stem.clone()
    } else {
        format!("{}_{}", config.output_stem, band.to_lowercase())
    }
}
