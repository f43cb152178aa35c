use crate::earthengine::{ComputeService, Expression, Node};
use crate::error::PipelineError;
use crate::geometry::Crs;
use anyhow::Result;
use serde_json::Value;

const DROPPED_COLUMNS: [&str; 2] = ["id", "time"];
const LONGITUDE: &str = "longitude";
const LATITUDE: &str = "latitude";

/// Rows returned by `getRegion`, one per sampled point, in fetch order.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleTable {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl SampleTable {
    /// Promote the first row to the header and drop the `id`/`time` columns.
    pub fn from_region(value: Value) -> Result<Self> {
        let mut rows = match value {
            Value::Array(rows) => rows.into_iter(),
            other => return Err(malformed(format!("expected a list of rows, got {other}"))),
        };

        let header = match rows.next() {
            Some(Value::Array(header)) => header,
            _ => return Err(malformed("missing header row".to_string())),
        };
        let header = header
            .into_iter()
            .map(|cell| match cell {
                Value::String(name) => Ok(name),
                other => Err(malformed(format!("non-string column name {other}"))),
            })
            .collect::<Result<Vec<_>>>()?;

        let keep: Vec<bool> = header
            .iter()
            .map(|name| !DROPPED_COLUMNS.contains(&name.as_str()))
            .collect();
        let columns = header
            .iter()
            .zip(&keep)
            .filter(|(_, k)| **k)
            .map(|(name, _)| name.clone())
            .collect::<Vec<_>>();

        let rows = rows
            .map(|row| match row {
                Value::Array(cells) if cells.len() == keep.len() => Ok(cells
                    .into_iter()
                    .zip(&keep)
                    .filter(|(_, k)| **k)
                    .map(|(cell, _)| cell)
                    .collect::<Vec<_>>()),
                Value::Array(cells) => Err(malformed(format!(
                    "row has {} cells, header has {}",
                    cells.len(),
                    keep.len()
                ))),
                other => Err(malformed(format!("expected a row, got {other}"))),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one band in fetch order; masked pixels come back as `NaN`.
    pub fn band(&self, name: &str) -> Result<Vec<f32>> {
        let values = self.column(name)?;
        Ok(values.into_iter().map(|v| v as f32).collect())
    }

    /// Sampled location of every row, in the request's CRS.
    pub fn coordinates(&self) -> Result<Vec<(f64, f64)>> {
        let x = self.column(LONGITUDE)?;
        let y = self.column(LATITUDE)?;
        Ok(x.into_iter().zip(y).collect())
    }

    fn column(&self, name: &str) -> Result<Vec<f64>> {
        let index = self
            .columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| PipelineError::MissingBand(name.to_string()))?;

        self.rows
            .iter()
            .map(|row| match &row[index] {
                Value::Null => Ok(f64::NAN),
                Value::Number(n) => n
                    .as_f64()
                    .ok_or_else(|| malformed(format!("unrepresentable value {n}"))),
                other => Err(malformed(format!("non-numeric {name} value {other}"))),
            })
            .collect()
    }
}

fn malformed(message: String) -> anyhow::Error {
    PipelineError::Remote {
        status: 200,
        message: format!("malformed getRegion reply: {message}"),
    }
    .into()
}

/// `getRegion` of the composite, restricted to `bands`, at every point of `points`.
pub fn region_request(composite: Node, points: Node, bands: &[String], crs: &Crs, scale: f64) -> Node {
    let images = Node::invoke(
        "ImageCollection.fromImages",
        [("images", Node::Array(vec![composite]))],
    );
    let bands = Node::strings(bands);
    let selected = Node::invoke(
        "Collection.map",
        [
            ("collection", images),
            (
                "baseAlgorithm",
                Node::lambda("image", |image| {
                    Node::invoke("Image.select", [("input", image), ("bandSelectors", bands)])
                }),
            ),
        ],
    );
    let geometry = Node::invoke("Collection.geometry", [("collection", points)]);
    let projection = Node::invoke("Projection", [("crs", Node::constant(crs.as_str()))]);

    Node::invoke(
        "ImageCollection.getRegion",
        [
            ("collection", selected),
            ("geometry", geometry),
            ("scale", Node::constant(scale)),
            ("crs", projection),
        ],
    )
}

/// Fetch the sample table in a single blocking round trip.
pub async fn sample(
    service: &impl ComputeService,
    composite: Node,
    points: Node,
    bands: &[String],
    crs: &Crs,
    scale: f64,
) -> Result<SampleTable> {
    log::info!("Sampling {:?} at scale {} in {}", bands, scale, crs);
    let request = region_request(composite, points, bands, crs, scale);
    let value = service.compute(&Expression::new(&request)).await?;
    let table = SampleTable::from_region(value)?;
    log::debug!("Fetched {} rows with columns {:?}", table.len(), table.columns());
    Ok(table)
}
