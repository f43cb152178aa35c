//! Single band float32 GeoTIFF output.
//!
//! Georeferencing is written as ModelPixelScale + ModelTiepoint (north-up
//! rasters only) and a GeoKey directory naming the EPSG code.

use crate::error::PipelineError;
use crate::raster::OutputRaster;
use anyhow::Result;
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKind};
use tiff::tags::Tag;

// GeoTIFF tag IDs (not in the tiff crate)
pub const GEOTIFF_MODELPIXELSCALE: u16 = 33550;
pub const GEOTIFF_MODELTIEPOINT: u16 = 33922;
pub const GEOTIFF_GEOKEYDIRECTORY: u16 = 34735;
pub const GEOTIFF_GEOASCIIPARAMS: u16 = 34737;
pub const GDAL_NODATA: u16 = 42113;

// GeoKey IDs
const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
const GT_CITATION_GEO_KEY: u16 = 1026;
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;

// GeoKey values
const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

pub struct GeoTiffWriter<'a> {
    raster: &'a OutputRaster,
}

impl<'a> GeoTiffWriter<'a> {
    pub fn new(raster: &'a OutputRaster) -> Self {
        Self { raster }
    }

    /// Create or truncate `path` and write the raster into it.
    pub fn write<P: AsRef<Path>>(self, path: P) -> Result<()> {
        let path = path.as_ref();
        log::info!("Writing {}", path.display());
        let file = File::create(path).map_err(PipelineError::Io)?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)?;
        writer.flush().map_err(PipelineError::Io)?;
        Ok(())
    }

    pub fn write_to<W: Write + Seek>(self, writer: W) -> Result<()> {
        let (rows, cols) = self.raster.shape();
        if rows == 0 || cols == 0 {
            return Err(PipelineError::Shape {
                expected: 1,
                actual: 0,
            }
            .into());
        }

        let pixels: Vec<f32> = self.raster.data.iter().copied().collect();

        let mut encoder = TiffEncoder::new(writer)?;
        let mut image = encoder.new_image::<Gray32Float>(cols as u32, rows as u32)?;
        self.write_geotiff_tags(image.encoder())?;
        image.write_data(&pixels)?;
        Ok(())
    }

    fn write_geotiff_tags<W: Write + Seek, K: TiffKind>(
        &self,
        dir: &mut DirectoryEncoder<'_, W, K>,
    ) -> Result<()> {
        let raster = self.raster;
        let (xsize, ysize) = raster.pixel_size();
        let (west, north) = raster.pixel_to_world(0.0, 0.0);

        // ModelPixelScale: [ScaleX, ScaleY, ScaleZ]
        let pixel_scale = [xsize, ysize, 0.0];
        dir.write_tag(Tag::Unknown(GEOTIFF_MODELPIXELSCALE), pixel_scale.as_slice())?;

        // ModelTiepoint: pixel (0, 0) sits at (west, north)
        let tiepoint = [0.0, 0.0, 0.0, west, north, 0.0];
        dir.write_tag(Tag::Unknown(GEOTIFF_MODELTIEPOINT), tiepoint.as_slice())?;

        let citation = format!("{}|", raster.crs);
        let geokeys = build_geokey_directory(raster, citation.len() as u16)?;
        dir.write_tag(Tag::Unknown(GEOTIFF_GEOKEYDIRECTORY), geokeys.as_slice())?;
        dir.write_tag(Tag::Unknown(GEOTIFF_GEOASCIIPARAMS), citation.as_str())?;

        dir.write_tag(Tag::Unknown(GDAL_NODATA), "nan")?;
        Ok(())
    }
}

/// Layout: [KeyDirectoryVersion, KeyRevision, MinorRevision, NumberOfKeys,
/// then KeyID, TIFFTagLocation, Count, Value_Offset per key, sorted by KeyID].
fn build_geokey_directory(raster: &OutputRaster, citation_len: u16) -> Result<Vec<u16>> {
    let epsg = raster.crs.epsg().ok_or_else(|| {
        PipelineError::Config(format!("{} has no EPSG code", raster.crs))
    })?;
    let geographic = raster.crs.is_geographic();

    let mut keys = vec![1, 1, 0, 4];

    let model_type = if geographic {
        MODEL_TYPE_GEOGRAPHIC
    } else {
        MODEL_TYPE_PROJECTED
    };
    keys.extend_from_slice(&[GT_MODEL_TYPE_GEO_KEY, 0, 1, model_type]);
    keys.extend_from_slice(&[GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_AREA]);
    keys.extend_from_slice(&[GT_CITATION_GEO_KEY, GEOTIFF_GEOASCIIPARAMS, citation_len, 0]);

    let crs_key = if geographic {
        GEOGRAPHIC_TYPE_GEO_KEY
    } else {
        PROJECTED_CS_TYPE_GEO_KEY
    };
    keys.extend_from_slice(&[crs_key, 0, 1, epsg]);

    Ok(keys)
}

impl OutputRaster {
    pub fn write_geotiff<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        GeoTiffWriter::new(self).write(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Crs;
    use crate::raster::transform_from_origin;
    use ndarray::array;
    use tiff::decoder::{Decoder, DecodingResult};

    fn sample_raster(crs: &str) -> OutputRaster {
        OutputRaster {
            data: array![[1.0, 2.0, 3.0], [4.0, f32::NAN, 6.0]],
            transform: transform_from_origin(500000.0, 1000020.0, 10.0, 10.0),
            crs: Crs::new(crs),
        }
    }

    #[test]
    fn test_write_and_decode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tif");
        sample_raster("EPSG:32643").write_geotiff(&path).unwrap();

        let mut decoder = Decoder::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(decoder.dimensions().unwrap(), (3, 2));

        match decoder.read_image().unwrap() {
            DecodingResult::F32(pixels) => {
                assert_eq!(pixels.len(), 6);
                assert_eq!(pixels[0], 1.0);
                assert_eq!(pixels[2], 3.0);
                assert!(pixels[4].is_nan());
                assert_eq!(pixels[5], 6.0);
            }
            _ => panic!("expected f32 pixels"),
        }
    }

    #[test]
    fn test_georeferencing_tags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tif");
        sample_raster("EPSG:32643").write_geotiff(&path).unwrap();

        let mut decoder = Decoder::new(File::open(&path).unwrap()).unwrap();
        let scale = decoder
            .get_tag_f64_vec(Tag::Unknown(GEOTIFF_MODELPIXELSCALE))
            .unwrap();
        assert_eq!(scale, vec![10.0, 10.0, 0.0]);

        let tiepoint = decoder
            .get_tag_f64_vec(Tag::Unknown(GEOTIFF_MODELTIEPOINT))
            .unwrap();
        assert_eq!(tiepoint, vec![0.0, 0.0, 0.0, 500000.0, 1000020.0, 0.0]);

        let keys = decoder
            .get_tag_u16_vec(Tag::Unknown(GEOTIFF_GEOKEYDIRECTORY))
            .unwrap();
        assert_eq!(&keys[..4], &[1, 1, 0, 4]);
        assert_eq!(&keys[4..8], &[GT_MODEL_TYPE_GEO_KEY, 0, 1, MODEL_TYPE_PROJECTED]);
        assert_eq!(&keys[16..20], &[PROJECTED_CS_TYPE_GEO_KEY, 0, 1, 32643]);
    }

    #[test]
    fn test_geographic_crs_keys() {
        let keys = build_geokey_directory(&sample_raster("EPSG:4326"), 10).unwrap();
        assert_eq!(&keys[4..8], &[GT_MODEL_TYPE_GEO_KEY, 0, 1, MODEL_TYPE_GEOGRAPHIC]);
        assert_eq!(&keys[8..12], &[GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_AREA]);
        assert_eq!(&keys[12..16], &[GT_CITATION_GEO_KEY, GEOTIFF_GEOASCIIPARAMS, 10, 0]);
        assert_eq!(&keys[16..20], &[GEOGRAPHIC_TYPE_GEO_KEY, 0, 1, 4326]);
    }

    #[test]
    fn test_existing_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tif");
        std::fs::write(&path, b"stale contents that are not a tiff").unwrap();

        sample_raster("EPSG:32643").write_geotiff(&path).unwrap();
        let mut decoder = Decoder::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(decoder.dimensions().unwrap(), (3, 2));
    }

    #[test]
    fn test_empty_raster_rejected() {
        let raster = OutputRaster {
            data: ndarray::Array2::zeros((0, 3)),
            transform: transform_from_origin(0.0, 0.0, 10.0, 10.0),
            crs: Crs::new("EPSG:32643"),
        };
        let mut buffer = std::io::Cursor::new(Vec::new());
        assert!(GeoTiffWriter::new(&raster).write_to(&mut buffer).is_err());
    }
}
