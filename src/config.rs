use crate::error::PipelineError;
use crate::geometry::Crs;
use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use toml;

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct PipelineConfig {
    pub aoi: PathBuf,
    pub output_dir: PathBuf,
    pub output_stem: String,
    pub pixel_size: f64,
    pub crs: Crs,
    pub bands: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub collection: CollectionConfig,
    pub earthengine: EarthEngineConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct CollectionConfig {
    pub id: String,
    pub cloud_property: String,
    pub max_cloud_percentage: f64,
    pub scale: f64,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct EarthEngineConfig {
    pub project: String,
    pub base_url: String,
    /// Name of the environment variable holding an OAuth access token
    pub token_env: String,
}

pub fn pipeline_toml() -> toml::Table {
    toml::toml! {
        // GeoPackage and other OGR formats need the `gdal` feature
        aoi = "./aoi.geojson"

        output_dir = "./"

        output_stem = "b4_band"

        pixel_size = 10.0

        crs = "EPSG:32643"

        bands = ["B4"]

        // Earth Engine date ranges include the start and exclude the end
        start_date = "2020-02-01"
        end_date = "2020-02-08"

        [collection]
        id = "COPERNICUS/S2_SR"
        cloud_property = "CLOUDY_PIXEL_PERCENTAGE"
        max_cloud_percentage = 50.0
        scale = 10.0

        [earthengine]
        project = "earthengine-legacy"
        base_url = "https://earthengine.googleapis.com"
        token_env = "EE_ACCESS_TOKEN"
    }
}

impl PipelineConfig {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(PipelineError::Io)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn from_template(table: &toml::Table) -> Result<Self> {
        let config: Self = toml::from_str(&table.to_string())
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        Ok(config)
    }

    pub fn template() -> Self {
        Self::from_template(&pipeline_toml()).expect("Built-in template should always parse")
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.pixel_size.is_finite() && self.pixel_size > 0.0) {
            return Err(invalid(format!("pixel_size must be positive, got {}", self.pixel_size)));
        }
        if !(self.collection.scale.is_finite() && self.collection.scale > 0.0) {
            return Err(invalid(format!("scale must be positive, got {}", self.collection.scale)));
        }
        if self.bands.is_empty() {
            return Err(invalid("at least one band must be requested".to_string()));
        }
        if self.start_date >= self.end_date {
            return Err(invalid(format!(
                "start_date {} must precede end_date {}",
                self.start_date, self.end_date
            )));
        }
        if !(0.0..=100.0).contains(&self.collection.max_cloud_percentage) {
            return Err(invalid(format!(
                "max_cloud_percentage must be within 0..=100, got {}",
                self.collection.max_cloud_percentage
            )));
        }
        if self.crs.epsg().is_none() {
            return Err(invalid(format!("crs must be an EPSG code, got {}", self.crs)));
        }
        if self.output_stem.trim().is_empty() {
            return Err(invalid("output_stem must not be empty".to_string()));
        }
        Ok(())
    }
}

fn invalid(msg: String) -> anyhow::Error {
    PipelineError::Config(msg).into()
}
