//! Topology encoding
//!
//! Converts a GeoJSON feature collection into a TopoJSON-style topology:
//! coordinates are quantized onto a fixed grid, every ring becomes an arc
//! stored once (shared rings, forward or reversed, are deduplicated and
//! referenced by index), and arcs are delta-encoded. The result is
//! serialized to msgpack, which is what the HTTP surface ships.
//!
//! Output is deterministic for a given input, so byte equality doubles as
//! change detection in tests.

use std::collections::HashMap;

use geojson::FeatureCollection;
use serde::Serialize;
use thiserror::Error;

/// Quantization grid resolution per axis.
pub const QUANTIZATION: f64 = 100_000.0;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("topology encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
}

/// Inverse of the quantization: `coordinate = value * scale + translate`.
#[derive(Debug, Clone, Serialize)]
pub struct Transform {
    pub scale: [f64; 2],
    pub translate: [f64; 2],
}

#[derive(Debug, Serialize)]
pub struct Topology {
    #[serde(rename = "type")]
    kind: &'static str,
    pub transform: Transform,
    pub objects: Objects,
    /// Delta-encoded quantized arcs; index 0 of each arc is absolute.
    pub arcs: Vec<Vec<[i64; 2]>>,
}

#[derive(Debug, Serialize)]
pub struct Objects {
    pub alerts: GeometryCollection,
}

#[derive(Debug, Serialize)]
pub struct GeometryCollection {
    #[serde(rename = "type")]
    kind: &'static str,
    pub geometries: Vec<TopoGeometry>,
}

/// One event's multi-polygon expressed as arc references. A negative
/// index `~i` means arc `i` traversed in reverse, per the TopoJSON
/// convention.
#[derive(Debug, Serialize)]
pub struct TopoGeometry {
    #[serde(rename = "type")]
    kind: &'static str,
    pub arcs: Vec<Vec<Vec<i64>>>,
    pub properties: TopoProperties,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopoProperties {
    pub id: String,
    pub color: String,
}

impl Topology {
    /// Encode a feature collection of multi-polygon features. Features
    /// with other geometry types are ignored.
    pub fn from_features(collection: &FeatureCollection) -> Self {
        let mut builder = TopologyBuilder::new(collection);
        builder.add_features(collection);
        builder.finish()
    }

    /// The wire form served by the HTTP surface.
    pub fn to_msgpack(&self) -> Result<Vec<u8>, TopologyError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }
}

/// A ring quantized onto the grid; the key used for arc deduplication.
type QuantizedRing = Vec<[i64; 2]>;

struct TopologyBuilder {
    transform: Transform,
    arcs: Vec<QuantizedRing>,
    arc_index: HashMap<QuantizedRing, i64>,
    geometries: Vec<TopoGeometry>,
}

impl TopologyBuilder {
    fn new(collection: &FeatureCollection) -> Self {
        Self {
            transform: fit_transform(collection),
            arcs: Vec::new(),
            arc_index: HashMap::new(),
            geometries: Vec::new(),
        }
    }

    fn add_features(&mut self, collection: &FeatureCollection) {
        for feature in &collection.features {
            let Some(geometry) = &feature.geometry else { continue };
            let geojson::Value::MultiPolygon(polygons) = &geometry.value else { continue };

            let arcs: Vec<Vec<Vec<i64>>> = polygons
                .iter()
                .map(|polygon| {
                    polygon
                        .iter()
                        .filter_map(|ring| self.intern_ring(ring))
                        .map(|arc| vec![arc])
                        .collect()
                })
                .collect();

            let properties = feature.properties.as_ref();
            let string_property = |key: &str| {
                properties
                    .and_then(|props| props.get(key))
                    .and_then(|value| value.as_str())
                    .unwrap_or_default()
                    .to_string()
            };
            self.geometries.push(TopoGeometry {
                kind: "MultiPolygon",
                arcs,
                properties: TopoProperties {
                    id: string_property("id"),
                    color: string_property("color"),
                },
            });
        }
    }

    /// Quantize a ring and return its arc reference, reusing an existing
    /// arc when the same ring was seen before in either direction.
    fn intern_ring(&mut self, ring: &[Vec<f64>]) -> Option<i64> {
        let quantized = self.quantize_ring(ring)?;
        if let Some(&index) = self.arc_index.get(&quantized) {
            return Some(index);
        }
        let mut reversed = quantized.clone();
        reversed.reverse();
        if let Some(&index) = self.arc_index.get(&reversed) {
            // Bitwise complement marks reverse traversal.
            return Some(!index);
        }

        let index = i64::try_from(self.arcs.len()).unwrap_or(i64::MAX);
        self.arcs.push(quantized.clone());
        self.arc_index.insert(quantized, index);
        Some(index)
    }

    fn quantize_ring(&self, ring: &[Vec<f64>]) -> Option<QuantizedRing> {
        let mut quantized: QuantizedRing = Vec::with_capacity(ring.len());
        for position in ring {
            let (x, y) = (*position.first()?, *position.get(1)?);
            let point = [
                quantize(x, self.transform.translate[0], self.transform.scale[0]),
                quantize(y, self.transform.translate[1], self.transform.scale[1]),
            ];
            // Quantization can collapse neighboring points.
            if quantized.last() != Some(&point) {
                quantized.push(point);
            }
        }
        (quantized.len() >= 2).then_some(quantized)
    }

    fn finish(self) -> Topology {
        let arcs = self.arcs.into_iter().map(delta_encode).collect();
        Topology {
            kind: "Topology",
            transform: self.transform,
            objects: Objects {
                alerts: GeometryCollection {
                    kind: "GeometryCollection",
                    geometries: self.geometries,
                },
            },
            arcs,
        }
    }
}

fn quantize(value: f64, translate: f64, scale: f64) -> i64 {
    let quantized = ((value - translate) / scale).round();
    if quantized.is_finite() {
        quantized as i64
    } else {
        0
    }
}

fn delta_encode(ring: QuantizedRing) -> Vec<[i64; 2]> {
    let mut encoded = Vec::with_capacity(ring.len());
    let (mut last_x, mut last_y) = (0, 0);
    for (index, [x, y]) in ring.into_iter().enumerate() {
        if index == 0 {
            encoded.push([x, y]);
        } else {
            encoded.push([x - last_x, y - last_y]);
        }
        (last_x, last_y) = (x, y);
    }
    encoded
}

/// Fit the quantization grid over the collection's bounding box.
fn fit_transform(collection: &FeatureCollection) -> Transform {
    let mut min = [f64::INFINITY, f64::INFINITY];
    let mut max = [f64::NEG_INFINITY, f64::NEG_INFINITY];
    for feature in &collection.features {
        let Some(geometry) = &feature.geometry else { continue };
        let geojson::Value::MultiPolygon(polygons) = &geometry.value else { continue };
        for position in polygons.iter().flatten().flatten() {
            if let (Some(&x), Some(&y)) = (position.first(), position.get(1)) {
                min[0] = min[0].min(x);
                min[1] = min[1].min(y);
                max[0] = max[0].max(x);
                max[1] = max[1].max(y);
            }
        }
    }
    if !min[0].is_finite() {
        return Transform { scale: [1.0, 1.0], translate: [0.0, 0.0] };
    }
    let scale_axis = |span: f64| if span > 0.0 { span / (QUANTIZATION - 1.0) } else { 1.0 };
    Transform {
        scale: [scale_axis(max[0] - min[0]), scale_axis(max[1] - min[1])],
        translate: min,
    }
}
