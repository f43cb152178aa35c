use crate::earthengine::Node;
use crate::error::PipelineError;
use crate::geometry::{BoundingBox, Crs};
use anyhow::Result;

/// Values from `start` to `end` inclusive, `step` apart, matching `List.sequence`.
pub fn sequence(start: f64, end: f64, step: f64) -> Vec<f64> {
    if step.is_nan() || step <= 0.0 || end < start {
        return vec![];
    }
    let count = ((end - start) / step).floor() as usize + 1;
    (0..count).map(|i| start + i as f64 * step).collect()
}

#[derive(Debug, Clone)]
pub struct Grid {
    bounds: BoundingBox,
    pixel_size: f64,
    crs: Crs,
    x: Vec<f64>,
    y: Vec<f64>,
}

impl Grid {
    pub fn new(bounds: BoundingBox, pixel_size: f64, crs: Crs) -> Result<Self> {
        if !(pixel_size.is_finite() && pixel_size > 0.0) {
            return Err(PipelineError::Config(format!(
                "pixel size must be positive, got {pixel_size}"
            ))
            .into());
        }
        if bounds.width() < 0.0 || bounds.height() < 0.0 {
            return Err(PipelineError::Geometry(format!("inverted bounds {bounds:?}")).into());
        }

        let x = sequence(bounds.minx, bounds.maxx, pixel_size);
        let y = sequence(bounds.miny, bounds.maxy, pixel_size);
        log::debug!("Grid of {} x {} points at {} {}", x.len(), y.len(), pixel_size, crs);

        Ok(Self {
            bounds,
            pixel_size,
            crs,
            x,
            y,
        })
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn len_x(&self) -> usize {
        self.x.len()
    }

    pub fn len_y(&self) -> usize {
        self.y.len()
    }

    pub fn len(&self) -> usize {
        self.x.len() * self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (rows, cols) of the raster built from this grid.
    pub fn shape(&self) -> (usize, usize) {
        (self.len_y(), self.len_x())
    }

    /// Upper left corner of the output raster.
    pub fn origin(&self) -> (f64, f64) {
        (self.bounds.minx, self.bounds.maxy)
    }

    pub fn pixel_size(&self) -> f64 {
        self.pixel_size
    }

    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    /// (row, col) of the grid node at or just below `(x, y)`, rows counted from
    /// the south edge. `None` when the point falls outside the grid.
    ///
    /// `getRegion` reports either the sampled node or the centre of the pixel
    /// holding it, both of which land in the same cell.
    pub fn cell(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let col = node_index(x - self.bounds.minx, self.pixel_size, self.len_x())?;
        let row = node_index(y - self.bounds.miny, self.pixel_size, self.len_y())?;
        Some((row, col))
    }

    fn remote_sequence(&self, start: f64, end: f64) -> Node {
        Node::invoke(
            "List.sequence",
            [
                ("start", Node::constant(start)),
                ("end", Node::constant(end)),
                ("step", Node::constant(self.pixel_size)),
            ],
        )
    }

    /// One point feature per (x, y) pair, generated remotely and flattened x-major.
    pub fn points(&self) -> Node {
        let x_seq = self.remote_sequence(self.bounds.minx, self.bounds.maxx);
        let y_seq = self.remote_sequence(self.bounds.miny, self.bounds.maxy);
        let crs = self.crs.clone();

        let column = Node::lambda("x", move |x| {
            let features = Node::invoke(
                "List.map",
                [
                    ("list", y_seq),
                    ("baseAlgorithm", Node::lambda("y", |y| point_feature(x, y, &crs))),
                ],
            );
            Node::invoke("Collection", [("features", features)])
        });

        let columns = Node::invoke(
            "List.map",
            [("list", x_seq), ("baseAlgorithm", column)],
        );

        Node::invoke(
            "Collection.flatten",
            [("collection", Node::invoke("Collection", [("features", columns)]))],
        )
    }

    /// Union of all grid points, used to bound the scene search and the sampling.
    pub fn footprint(&self) -> Node {
        Node::invoke("Collection.geometry", [("collection", self.points())])
    }
}

fn node_index(offset: f64, step: f64, len: usize) -> Option<usize> {
    const SNAP: f64 = 1e-6;
    let index = (offset / step + SNAP).floor();
    if index.is_finite() && index >= 0.0 && index < len as f64 {
        Some(index as usize)
    } else {
        None
    }
}

fn point_feature(x: Node, y: Node, crs: &Crs) -> Node {
    let projection = Node::invoke("Projection", [("crs", Node::constant(crs.as_str()))]);
    let point = Node::invoke(
        "GeometryConstructors.Point",
        [("coordinates", Node::Array(vec![x, y])), ("crs", projection)],
    );
    Node::invoke("Feature", [("geometry", point)])
}
