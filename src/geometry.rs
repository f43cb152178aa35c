//! Area of interest loading and the small spatial types shared by the pipeline.
use crate::error::PipelineError;
use anyhow::Result;
use geo::BoundingRect;
use geojson::GeoJson;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub minx: f64,
    pub miny: f64,
    pub maxx: f64,
    pub maxy: f64,
}

impl BoundingBox {
    pub fn new(minx: f64, miny: f64, maxx: f64, maxy: f64) -> Self {
        Self {
            minx,
            miny,
            maxx,
            maxy,
        }
    }

    pub fn union(&self, other: &Self) -> Self {
        Self {
            minx: self.minx.min(other.minx),
            miny: self.miny.min(other.miny),
            maxx: self.maxx.max(other.maxx),
            maxy: self.maxy.max(other.maxy),
        }
    }

    pub fn width(&self) -> f64 {
        self.maxx - self.minx
    }

    pub fn height(&self) -> f64 {
        self.maxy - self.miny
    }

    /// Whether every corner is a plausible lon/lat pair.
    pub fn looks_geographic(&self) -> bool {
        (-180.0..=180.0).contains(&self.minx)
            && (-180.0..=180.0).contains(&self.maxx)
            && (-90.0..=90.0).contains(&self.miny)
            && (-90.0..=90.0).contains(&self.maxy)
    }
}

impl From<geo::Rect<f64>> for BoundingBox {
    fn from(rect: geo::Rect<f64>) -> Self {
        Self::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }
}

/// Coordinate reference system given as an authority string, e.g. `EPSG:32643`.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(transparent)]
pub struct Crs(String);

impl Crs {
    pub fn new(authority: &str) -> Self {
        Self(authority.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn epsg(&self) -> Option<u16> {
        static EPSG: OnceLock<Regex> = OnceLock::new();
        let re = EPSG.get_or_init(|| {
            Regex::new(r"^(?i:epsg):(?<code>\d+)$").expect("Regex pattern should always compile")
        });
        let captures = re.captures(self.0.trim())?;
        captures["code"].parse().ok()
    }

    /// EPSG codes in the 4000 range are lon/lat systems.
    pub fn is_geographic(&self) -> bool {
        self.epsg()
            .map(|code| (4000..5000).contains(&code))
            .unwrap_or(false)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read a vector file and return the bounds of all of its geometries.
///
/// GeoJSON is always supported. Other formats (GeoPackage, shapefile, ...)
/// go through GDAL and need the `gdal` feature.
///
/// Coordinates are taken as they are: the file must already be in the
/// output CRS, even for GeoJSON.
pub fn load_bounds<P: AsRef<Path>>(path: P) -> Result<BoundingBox> {
    let path = path.as_ref();
    log::info!("Reading area of interest: {}", path.display());

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let bounds = match extension.as_deref() {
        Some("geojson") | Some("json") => read_geojson_bounds(path)?,
        _ => read_ogr_bounds(path)?,
    };

    log::debug!("Area of interest bounds: {:?}", bounds);
    Ok(bounds)
}

fn read_geojson_bounds(path: &Path) -> Result<BoundingBox> {
    let content = fs::read_to_string(path).map_err(PipelineError::Io)?;
    let geojson: GeoJson = content
        .parse()
        .map_err(|e: geojson::Error| PipelineError::Geometry(e.to_string()))?;

    let geometries: Vec<geojson::Geometry> = match geojson {
        GeoJson::FeatureCollection(fc) => {
            fc.features.into_iter().filter_map(|f| f.geometry).collect()
        }
        GeoJson::Feature(feature) => feature.geometry.into_iter().collect(),
        GeoJson::Geometry(geometry) => vec![geometry],
    };

    let mut bounds: Option<BoundingBox> = None;
    for geometry in geometries {
        let geometry: geo::Geometry<f64> = geometry
            .try_into()
            .map_err(|e: geojson::Error| PipelineError::Geometry(e.to_string()))?;
        if let Some(rect) = geometry.bounding_rect() {
            let rect = BoundingBox::from(rect);
            bounds = Some(bounds.map_or(rect, |b| b.union(&rect)));
        }
    }

    bounds.ok_or_else(|| {
        PipelineError::Geometry(format!("{} contains no geometry", path.display())).into()
    })
}

#[cfg(feature = "gdal")]
fn read_ogr_bounds(path: &Path) -> Result<BoundingBox> {
    use gdal::vector::LayerAccess;

    if !path.exists() {
        return Err(PipelineError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} does not exist", path.display()),
        ))
        .into());
    }

    let dataset =
        gdal::Dataset::open(path).map_err(|e| PipelineError::Geometry(e.to_string()))?;

    let mut bounds: Option<BoundingBox> = None;
    for layer in dataset.layers() {
        let extent = layer
            .get_extent()
            .map_err(|e| PipelineError::Geometry(e.to_string()))?;
        let rect = BoundingBox::new(extent.MinX, extent.MinY, extent.MaxX, extent.MaxY);
        bounds = Some(bounds.map_or(rect, |b| b.union(&rect)));
    }

    bounds.ok_or_else(|| {
        PipelineError::Geometry(format!("{} contains no layers", path.display())).into()
    })
}

#[cfg(not(feature = "gdal"))]
fn read_ogr_bounds(path: &Path) -> Result<BoundingBox> {
    Err(PipelineError::Geometry(format!(
        "unsupported vector format for {}; rebuild with the `gdal` feature",
        path.display()
    ))
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_geojson(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".geojson").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_feature_collection_bounds() {
        let file = write_geojson(
            r#"{
                "type": "FeatureCollection",
                "features": [
                    {"type": "Feature", "properties": {}, "geometry": {"type": "Polygon",
                        "coordinates": [[[0, 0], [20, 0], [20, 20], [0, 20], [0, 0]]]}},
                    {"type": "Feature", "properties": {}, "geometry": {"type": "Point",
                        "coordinates": [25, -5]}}
                ]
            }"#,
        );
        let bounds = load_bounds(file.path()).unwrap();
        assert_eq!(bounds, BoundingBox::new(0.0, -5.0, 25.0, 20.0));
    }

    #[test]
    fn test_bare_geometry_bounds() {
        let file = write_geojson(
            r#"{"type": "Polygon", "coordinates": [[[500000, 1000000], [500100, 1000000],
                [500100, 1000050], [500000, 1000000]]]}"#,
        );
        let bounds = load_bounds(file.path()).unwrap();
        assert_eq!(bounds.width(), 100.0);
        assert_eq!(bounds.height(), 50.0);
    }

    #[test]
    fn test_empty_collection_is_geometry_error() {
        let file = write_geojson(r#"{"type": "FeatureCollection", "features": []}"#);
        let err = load_bounds(file.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Geometry(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_bounds("/nonexistent/aoi.geojson").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Io(_))
        ));
    }

    #[test]
    fn test_looks_geographic() {
        assert!(BoundingBox::new(74.1, 12.2, 74.3, 12.4).looks_geographic());
        assert!(!BoundingBox::new(500000.0, 1000000.0, 500100.0, 1000050.0).looks_geographic());
        assert!(!BoundingBox::new(-10.0, 0.0, 10.0, 95.0).looks_geographic());
    }

    #[cfg(feature = "gdal")]
    #[test]
    fn test_geopackage_layers_are_unioned() {
        use gdal::vector::{Geometry, LayerAccess, LayerOptions};
        use gdal::DriverManager;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fields.gpkg");
        {
            let driver = DriverManager::get_driver_by_name("GPKG").unwrap();
            let mut dataset = driver.create_vector_only(&path).unwrap();
            for (name, wkt) in [
                ("north", "POLYGON ((0 10, 20 10, 20 30, 0 30, 0 10))"),
                ("east", "POINT (45 -5)"),
            ] {
                let mut layer = dataset
                    .create_layer(LayerOptions {
                        name,
                        ..Default::default()
                    })
                    .unwrap();
                layer.create_feature(Geometry::from_wkt(wkt).unwrap()).unwrap();
            }
        }

        let bounds = load_bounds(&path).unwrap();
        assert_eq!(bounds, BoundingBox::new(0.0, -5.0, 45.0, 30.0));
    }

    #[cfg(feature = "gdal")]
    #[test]
    fn test_missing_geopackage_is_io_error() {
        let err = load_bounds("/nonexistent/mygpkg.gpkg").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Io(_))
        ));
    }

    #[cfg(not(feature = "gdal"))]
    #[test]
    fn test_geopackage_needs_gdal_feature() {
        let err = load_bounds("fields.gpkg").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Geometry(m)) if m.contains("gdal")
        ));
    }

    #[test]
    fn test_crs_epsg() {
        assert_eq!(Crs::new("EPSG:32643").epsg(), Some(32643));
        assert_eq!(Crs::new("epsg:4326").epsg(), Some(4326));
        assert_eq!(Crs::new("WGS84").epsg(), None);
        assert!(Crs::new("EPSG:4326").is_geographic());
        assert!(!Crs::new("EPSG:32643").is_geographic());
    }
}
