use crate::error::PipelineError;
use crate::geometry::Crs;
use anyhow::Result;
use geo::{AffineTransform, Coord};
use ndarray::{s, Array2};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct OutputRaster {
    pub data: Array2<f32>,
    pub transform: AffineTransform<f64>,
    pub crs: Crs,
}

impl OutputRaster {
    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// World coordinate of the upper left corner of pixel (col, row).
    pub fn pixel_to_world(&self, col: f64, row: f64) -> (f64, f64) {
        let coord = self.transform.apply(Coord { x: col, y: row });
        (coord.x, coord.y)
    }

    /// Pixel width and height in world units, both positive for a north-up raster.
    pub fn pixel_size(&self) -> (f64, f64) {
        let (x0, y0) = self.pixel_to_world(0.0, 0.0);
        let (x1, _) = self.pixel_to_world(1.0, 0.0);
        let (_, y1) = self.pixel_to_world(0.0, 1.0);
        (x1 - x0, y0 - y1)
    }
}

/// Row-major reshape of `values` into `(rows, cols)`.
pub fn reshape(values: Vec<f32>, (rows, cols): (usize, usize)) -> Result<Array2<f32>> {
    let expected = rows * cols;
    if values.len() != expected {
        return Err(PipelineError::Shape {
            expected,
            actual: values.len(),
        }
        .into());
    }
    let array = Array2::from_shape_vec((rows, cols), values)?;
    Ok(array)
}

/// Scatter `values` into a `(rows, cols)` array at the matching `cells`.
/// Cells no value lands on stay `NaN`.
pub fn place(
    values: &[f32],
    cells: &[(usize, usize)],
    (rows, cols): (usize, usize),
) -> Result<Array2<f32>> {
    if values.len() != cells.len() {
        return Err(PipelineError::Shape {
            expected: cells.len(),
            actual: values.len(),
        }
        .into());
    }

    let mut ordered = vec![f32::NAN; rows * cols];
    for (&value, &(row, col)) in values.iter().zip(cells) {
        if row >= rows || col >= cols {
            return Err(PipelineError::Shape {
                expected: rows * cols,
                actual: row * cols + col + 1,
            }
            .into());
        }
        ordered[row * cols + col] = value;
    }
    reshape(ordered, (rows, cols))
}

/// Reverse the row order so the first row is the northernmost one.
pub fn flip_vertical(array: &Array2<f32>) -> Array2<f32> {
    array.slice(s![..;-1, ..]).to_owned()
}

/// Maps (col, row) to `(west + col * xsize, north - row * ysize)`.
pub fn transform_from_origin(west: f64, north: f64, xsize: f64, ysize: f64) -> AffineTransform<f64> {
    AffineTransform::new(xsize, 0.0, west, 0.0, -ysize, north)
}

/// `<dir>/<name>.tif`, where name is the file name of `stem` up to its first dot.
pub fn output_path<P: AsRef<Path>>(dir: P, stem: &str) -> PathBuf {
    let file_name = Path::new(stem)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(stem);
    let name = file_name.split('.').next().unwrap_or(file_name);
    dir.as_ref().join(format!("{name}.tif"))
}
