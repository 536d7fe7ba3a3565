//! Polygon features and GeoJSON FeatureCollection I/O.
//!
//! Only polygonal geometry is modelled: map areas and city footprints are
//! polygons, and vectorized rasters produce polygons.
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::coords::{Crs, Extent};

#[derive(Debug, Error)]
pub enum VectorError {
    #[error("invalid GeoJSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid GeoJSON: {0}")]
    Format(String),
    #[error("feature {index} has unsupported geometry type `{kind}` (expected Polygon or MultiPolygon)")]
    UnsupportedGeometry { index: usize, kind: String },
}

/// Closed ring of (x, y) vertices. The first vertex is repeated at the end.
pub type Ring = Vec<[f64; 2]>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub exterior: Ring,
    pub holes: Vec<Ring>,
}

impl Polygon {
    pub fn new(exterior: Ring, holes: Vec<Ring>) -> Self {
        Self { exterior, holes }
    }

    /// Axis-aligned rectangle, counter-clockwise.
    pub fn rect(e: &Extent) -> Self {
        Self::new(
            vec![
                [e.min_x, e.min_y],
                [e.max_x, e.min_y],
                [e.max_x, e.max_y],
                [e.min_x, e.max_y],
                [e.min_x, e.min_y],
            ],
            Vec::new(),
        )
    }

    pub fn rings(&self) -> impl Iterator<Item = &Ring> {
        std::iter::once(&self.exterior).chain(self.holes.iter())
    }

    /// Enclosed area: exterior minus holes.
    pub fn area(&self) -> f64 {
        signed_area(&self.exterior).abs() - self.holes.iter().map(|h| signed_area(h).abs()).sum::<f64>()
    }
}

/// Shoelace area; positive for counter-clockwise rings.
pub fn signed_area(ring: &[[f64; 2]]) -> f64 {
    ring.windows(2).map(|w| w[0][0] * w[1][1] - w[1][0] * w[0][1]).sum::<f64>() / 2.0
}

/// A (multi)polygon with its attribute table row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Feature {
    pub polygons: Vec<Polygon>,
    pub properties: Map<String, Value>,
}

impl Feature {
    pub fn new(polygons: Vec<Polygon>) -> Self {
        Self { polygons, properties: Map::new() }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// Attribute as a number; numeric strings are accepted.
    pub fn number(&self, field: &str) -> Option<f64> {
        match self.properties.get(field)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Attribute as text; numbers are formatted.
    pub fn text(&self, field: &str) -> Option<String> {
        match self.properties.get(field)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn bounds(&self) -> Option<Extent> {
        Extent::from_points(
            self.polygons
                .iter()
                .flat_map(|p| p.exterior.iter())
                .map(|&[x, y]| (x, y)),
        )
    }

    pub fn area(&self) -> f64 {
        self.polygons.iter().map(Polygon::area).sum()
    }
}

/// A vector layer. GeoJSON without a `crs` member is WGS84.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureCollection {
    pub name: Option<String>,
    pub crs: Crs,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(crs: Crs, features: Vec<Feature>) -> Self {
        Self { name: None, crs, features }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Union of attribute names over all features.
    pub fn field_names(&self) -> BTreeSet<&str> {
        self.features.iter().flat_map(|f| f.properties.keys().map(String::as_str)).collect()
    }

    pub fn bounds(&self) -> Option<Extent> {
        self.features.iter().filter_map(Feature::bounds).reduce(|a, b| {
            Extent::new(a.min_x.min(b.min_x), a.min_y.min(b.min_y), a.max_x.max(b.max_x), a.max_y.max(b.max_y))
        })
    }

    pub fn from_geojson(text: &str) -> Result<Self, VectorError> {
        let root: Value = serde_json::from_str(text)?;
        let kind = root.get("type").and_then(Value::as_str).unwrap_or_default();
        let raw_features: Vec<&Value> = match kind {
            "FeatureCollection" => root
                .get("features")
                .and_then(Value::as_array)
                .ok_or_else(|| VectorError::Format("FeatureCollection without `features` array".into()))?
                .iter()
                .collect(),
            "Feature" => vec![&root],
            other => return Err(VectorError::Format(format!("unexpected root type `{other}`"))),
        };

        let crs = root
            .pointer("/crs/properties/name")
            .and_then(Value::as_str)
            .map(Crs::parse)
            .unwrap_or(Crs::Wgs84);
        let name = root.get("name").and_then(Value::as_str).map(str::to_string);

        let features = raw_features
            .into_iter()
            .enumerate()
            .map(|(index, f)| parse_feature(index, f))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { name, crs, features })
    }

    pub fn to_geojson(&self) -> Result<String, VectorError> {
        let features: Vec<Value> = self
            .features
            .iter()
            .map(|f| {
                let geometry = match f.polygons.as_slice() {
                    [single] => json!({ "type": "Polygon", "coordinates": polygon_coords(single) }),
                    many => json!({
                        "type": "MultiPolygon",
                        "coordinates": many.iter().map(polygon_coords).collect::<Vec<_>>(),
                    }),
                };
                json!({ "type": "Feature", "properties": f.properties, "geometry": geometry })
            })
            .collect();

        let mut root = Map::new();
        root.insert("type".into(), "FeatureCollection".into());
        if let Some(name) = &self.name {
            root.insert("name".into(), name.clone().into());
        }
        if let Some(code) = self.crs.epsg() {
            root.insert(
                "crs".into(),
                json!({ "type": "name", "properties": { "name": format!("urn:ogc:def:crs:EPSG::{code}") } }),
            );
        }
        root.insert("features".into(), Value::Array(features));
        Ok(serde_json::to_string_pretty(&Value::Object(root))?)
    }
}

fn polygon_coords(p: &Polygon) -> Vec<&Ring> {
    p.rings().collect()
}

fn parse_feature(index: usize, value: &Value) -> Result<Feature, VectorError> {
    let properties = match value.get("properties") {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    let polygons = match value.get("geometry") {
        None | Some(Value::Null) => Vec::new(),
        Some(geometry) => {
            let kind = geometry.get("type").and_then(Value::as_str).unwrap_or_default();
            let coords = geometry.get("coordinates").cloned().unwrap_or(Value::Null);
            match kind {
                "Polygon" => vec![parse_polygon(index, coords)?],
                "MultiPolygon" => {
                    let parts: Vec<Value> = serde_json::from_value(coords)?;
                    parts
                        .into_iter()
                        .map(|p| parse_polygon(index, p))
                        .collect::<Result<_, _>>()?
                }
                other => {
                    return Err(VectorError::UnsupportedGeometry { index, kind: other.to_string() });
                }
            }
        }
    };
    Ok(Feature { polygons, properties })
}

fn parse_polygon(index: usize, coords: Value) -> Result<Polygon, VectorError> {
    // Extra ordinates (z, m) are dropped.
    let rings: Vec<Vec<Vec<f64>>> = serde_json::from_value(coords)?;
    let mut rings = rings.into_iter().map(|ring| {
        let mut pts: Ring = ring
            .into_iter()
            .filter(|p| p.len() >= 2)
            .map(|p| [p[0], p[1]])
            .collect();
        if pts.first() != pts.last() {
            if let Some(&first) = pts.first() {
                pts.push(first);
            }
        }
        pts
    });
    let exterior = rings
        .next()
        .filter(|r| r.len() >= 4)
        .ok_or_else(|| VectorError::Format(format!("feature {index} has a polygon without a valid exterior ring")))?;
    Ok(Polygon::new(exterior, rings.filter(|r| r.len() >= 4).collect()))
}
