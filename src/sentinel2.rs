//! Sentinel-2 surface reflectance composite, assembled as a remote expression.
use crate::config::PipelineConfig;
use crate::earthengine::Node;
use chrono::NaiveDate;

const QA_BAND: &str = "QA60";
const TIME_START: &str = "system:time_start";
const NIR_BAND: &str = "B8";
const RED_BAND: &str = "B4";
pub const NDVI_BAND: &str = "NDVI";

/// Opaque cloud and cirrus flags of the QA60 band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloudMask {
    pub cloud_bit: u32,
    pub cirrus_bit: u32,
}

impl Default for CloudMask {
    fn default() -> Self {
        Self {
            cloud_bit: 10,
            cirrus_bit: 11,
        }
    }
}

impl CloudMask {
    pub fn cloud_flag(&self) -> u32 {
        1 << self.cloud_bit
    }

    pub fn cirrus_flag(&self) -> u32 {
        1 << self.cirrus_bit
    }

    /// A pixel survives only when neither flag is set.
    pub fn keeps(&self, qa: u32) -> bool {
        qa & self.cloud_flag() == 0 && qa & self.cirrus_flag() == 0
    }

    /// `image.updateMask(mask)` with the same rule as [`CloudMask::keeps`],
    /// carrying the acquisition time over.
    pub fn apply(&self, image: Node) -> Node {
        let qa = Node::invoke(
            "Image.select",
            [("input", image.clone()), ("bandSelectors", Node::strings(&[QA_BAND]))],
        );
        let clear = |flag: u32| {
            let bits = Node::invoke(
                "Image.bitwiseAnd",
                [("image1", qa.clone()), ("image2", image_constant(flag))],
            );
            Node::invoke("Image.eq", [("image1", bits), ("image2", image_constant(0))])
        };
        let mask = Node::invoke(
            "Image.and",
            [
                ("image1", clear(self.cloud_flag())),
                ("image2", clear(self.cirrus_flag())),
            ],
        );
        let masked = Node::invoke("Image.updateMask", [("image", image.clone()), ("mask", mask)]);
        copy_time_start(masked, image)
    }
}

fn image_constant(value: u32) -> Node {
    Node::invoke("Image.constant", [("value", Node::constant(value))])
}

fn copy_time_start(target: Node, source: Node) -> Node {
    let time = Node::invoke(
        "Element.get",
        [("object", source), ("property", Node::constant(TIME_START))],
    );
    Node::invoke(
        "Element.set",
        [
            ("object", target),
            ("key", Node::constant(TIME_START)),
            ("value", time),
        ],
    )
}

/// Append `(B8 - B4) / (B8 + B4)` as an `NDVI` band.
pub fn add_ndvi(image: Node) -> Node {
    let ndvi = Node::invoke(
        "Image.normalizedDifference",
        [
            ("input", image.clone()),
            ("bandNames", Node::strings(&[NIR_BAND, RED_BAND])),
        ],
    );
    let ndvi = Node::invoke(
        "Image.rename",
        [("input", ndvi), ("names", Node::strings(&[NDVI_BAND]))],
    );
    let ndvi = copy_time_start(ndvi, image.clone());
    Node::invoke("Image.addBands", [("dstImg", image), ("srcImg", ndvi)])
}

#[derive(Debug, Clone)]
pub struct Compositor {
    pub collection: String,
    pub cloud_property: String,
    pub max_cloud_percentage: f64,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub mask: CloudMask,
}

impl Compositor {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            collection: config.collection.id.clone(),
            cloud_property: config.collection.cloud_property.clone(),
            max_cloud_percentage: config.collection.max_cloud_percentage,
            start: config.start_date,
            end: config.end_date,
            mask: CloudMask::default(),
        }
    }

    /// Median of the masked, NDVI-augmented scenes intersecting `footprint`.
    pub fn composite(&self, footprint: Node) -> Node {
        let collection = Node::invoke(
            "ImageCollection.load",
            [("id", Node::constant(self.collection.as_str()))],
        );

        let bounds = Node::invoke(
            "Filter.intersects",
            [("leftField", Node::constant(".all")), ("rightValue", footprint)],
        );
        let cloudy = Node::invoke(
            "Filter.lessThanOrEquals",
            [
                ("leftField", Node::constant(self.cloud_property.as_str())),
                ("rightValue", Node::constant(self.max_cloud_percentage)),
            ],
        );
        let dates = Node::invoke(
            "Filter.dateRangeContains",
            [
                ("leftValue", date_range(self.start, self.end)),
                ("rightField", Node::constant(TIME_START)),
            ],
        );

        let filtered = [bounds, cloudy, dates]
            .into_iter()
            .fold(collection, |collection, filter| {
                Node::invoke(
                    "Collection.filter",
                    [("collection", collection), ("filter", filter)],
                )
            });

        let mask = self.mask;
        let masked = map_images(filtered, "image", move |image| mask.apply(image));
        let augmented = map_images(masked, "image", add_ndvi);

        Node::invoke("reduce.median", [("collection", augmented)])
    }
}

fn map_images<F>(collection: Node, argument: &str, f: F) -> Node
where
    F: FnOnce(Node) -> Node,
{
    Node::invoke(
        "Collection.map",
        [
            ("collection", collection),
            ("baseAlgorithm", Node::lambda(argument, f)),
        ],
    )
}

fn date_range(start: NaiveDate, end: NaiveDate) -> Node {
    let date = |d: NaiveDate| {
        Node::invoke(
            "Date",
            [("value", Node::constant(d.format("%Y-%m-%d").to_string()))],
        )
    };
    Node::invoke("DateRange", [("start", date(start)), ("end", date(end))])
}
