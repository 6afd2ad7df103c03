//! Canonical geometry types used across all faixa crates.
//!
//! These types provide a bridge between GeoJSON serialization, the staged
//! survey features and the computational geo crate types. Coordinates are
//! WGS 84 longitude/latitude pairs; altitude is dropped on parse.

use serde::{Deserialize, Serialize};

/// Geometry type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryType {
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    GeometryCollection,
}

impl GeometryType {
    /// GeoJSON type name
    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryType::Point => "Point",
            GeometryType::LineString => "LineString",
            GeometryType::Polygon => "Polygon",
            GeometryType::MultiPoint => "MultiPoint",
            GeometryType::MultiLineString => "MultiLineString",
            GeometryType::MultiPolygon => "MultiPolygon",
            GeometryType::GeometryCollection => "GeometryCollection",
        }
    }
}

/// GeoJSON-compatible geometry representation
///
/// This enum directly maps to GeoJSON geometry types with coordinate arrays.
/// It can be serialized/deserialized as GeoJSON and converted to/from `geo` crate types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point {
        coordinates: [f64; 2],
    },
    LineString {
        coordinates: Vec<[f64; 2]>,
    },
    Polygon {
        coordinates: Vec<Vec<[f64; 2]>>,
    },
    MultiPoint {
        coordinates: Vec<[f64; 2]>,
    },
    MultiLineString {
        coordinates: Vec<Vec<[f64; 2]>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<[f64; 2]>>>,
    },
    GeometryCollection {
        geometries: Vec<Geometry>,
    },
}

impl Geometry {
    /// Create a Point geometry
    pub fn point(x: f64, y: f64) -> Self {
        Geometry::Point { coordinates: [x, y] }
    }

    /// Create a LineString geometry
    pub fn line_string(coords: Vec<[f64; 2]>) -> Self {
        Geometry::LineString { coordinates: coords }
    }

    /// Create a Polygon geometry
    pub fn polygon(rings: Vec<Vec<[f64; 2]>>) -> Self {
        Geometry::Polygon { coordinates: rings }
    }

    /// Get the geometry type
    pub fn geometry_type(&self) -> GeometryType {
        match self {
            Geometry::Point { .. } => GeometryType::Point,
            Geometry::LineString { .. } => GeometryType::LineString,
            Geometry::Polygon { .. } => GeometryType::Polygon,
            Geometry::MultiPoint { .. } => GeometryType::MultiPoint,
            Geometry::MultiLineString { .. } => GeometryType::MultiLineString,
            Geometry::MultiPolygon { .. } => GeometryType::MultiPolygon,
            Geometry::GeometryCollection { .. } => GeometryType::GeometryCollection,
        }
    }

    /// Coordinates of a Point geometry
    pub fn as_point(&self) -> Option<[f64; 2]> {
        match self {
            Geometry::Point { coordinates } => Some(*coordinates),
            _ => None,
        }
    }

    /// Path of a line geometry. Multi-part lines are concatenated in order.
    pub fn line_path(&self) -> Option<Vec<[f64; 2]>> {
        match self {
            Geometry::LineString { coordinates } => Some(coordinates.clone()),
            Geometry::MultiLineString { coordinates } => {
                let mut path: Vec<[f64; 2]> = Vec::new();
                for part in coordinates {
                    for coord in part {
                        if path.last() != Some(coord) {
                            path.push(*coord);
                        }
                    }
                }
                Some(path)
            }
            _ => None,
        }
    }

    /// Whether every coordinate is a finite number
    pub fn is_finite(&self) -> bool {
        fn finite(c: &[f64; 2]) -> bool {
            c[0].is_finite() && c[1].is_finite()
        }
        match self {
            Geometry::Point { coordinates } => finite(coordinates),
            Geometry::LineString { coordinates } | Geometry::MultiPoint { coordinates } => {
                coordinates.iter().all(finite)
            }
            Geometry::Polygon { coordinates } | Geometry::MultiLineString { coordinates } => {
                coordinates.iter().flatten().all(finite)
            }
            Geometry::MultiPolygon { coordinates } => coordinates.iter().flatten().flatten().all(finite),
            Geometry::GeometryCollection { geometries } => geometries.iter().all(Geometry::is_finite),
        }
    }

    /// Convert to serde_json::Value (GeoJSON)
    pub fn to_geojson(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
