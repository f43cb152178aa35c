#![allow(async_fn_in_trait)]
pub mod config;
pub mod earthengine;
pub mod error;
pub mod geometry;
pub mod geotiff;
pub mod grid;
pub mod pipeline;
pub mod raster;
pub mod sampler;
pub mod sentinel2;
