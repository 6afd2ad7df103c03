//! Geometry models for faixa-geo.
//!
//! Bridges the canonical `faixa-core` geometry, GeoJSON features and the
//! `geo` crate types the operators compute with.

use geo::{Centroid, CoordsIter, Geometry as GeoGeometry};
use geojson::{Feature, FeatureCollection, JsonObject};

pub use faixa_core::models::{Geometry, GeometryType};

fn to_coords(points: &[[f64; 2]]) -> Vec<geo::Coord> {
    points.iter().map(|c| geo::Coord { x: c[0], y: c[1] }).collect()
}

fn to_polygon(rings: &[Vec<[f64; 2]>]) -> geo::Polygon {
    let mut rings = rings.iter().map(|ring| geo::LineString::new(to_coords(ring)));
    let exterior = rings.next().unwrap_or_else(|| geo::LineString::new(vec![]));
    geo::Polygon::new(exterior, rings.collect())
}

fn polygon_rings(polygon: &geo::Polygon) -> Vec<Vec<[f64; 2]>> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(|ring| ring.coords().map(|c| [c.x, c.y]).collect())
        .collect()
}

/// Convert a canonical Geometry to a geo::Geometry
pub fn to_geo_geometry(geom: &Geometry) -> GeoGeometry {
    match geom {
        Geometry::Point { coordinates } => {
            GeoGeometry::Point(geo::Point::new(coordinates[0], coordinates[1]))
        }
        Geometry::LineString { coordinates } => {
            GeoGeometry::LineString(geo::LineString::new(to_coords(coordinates)))
        }
        Geometry::Polygon { coordinates } => GeoGeometry::Polygon(to_polygon(coordinates)),
        Geometry::MultiPoint { coordinates } => GeoGeometry::MultiPoint(geo::MultiPoint::new(
            coordinates.iter().map(|c| geo::Point::new(c[0], c[1])).collect(),
        )),
        Geometry::MultiLineString { coordinates } => {
            GeoGeometry::MultiLineString(geo::MultiLineString::new(
                coordinates.iter().map(|line| geo::LineString::new(to_coords(line))).collect(),
            ))
        }
        Geometry::MultiPolygon { coordinates } => GeoGeometry::MultiPolygon(
            geo::MultiPolygon::new(coordinates.iter().map(|p| to_polygon(p)).collect()),
        ),
        Geometry::GeometryCollection { geometries } => {
            GeoGeometry::GeometryCollection(geometries.iter().map(to_geo_geometry).collect())
        }
    }
}

/// Convert a geo::Geometry to a canonical Geometry
pub fn from_geo_geometry(geom: &GeoGeometry) -> Geometry {
    match geom {
        GeoGeometry::Point(p) => Geometry::Point { coordinates: [p.x(), p.y()] },
        GeoGeometry::Line(l) => Geometry::LineString {
            coordinates: vec![[l.start.x, l.start.y], [l.end.x, l.end.y]],
        },
        GeoGeometry::LineString(ls) => Geometry::LineString {
            coordinates: ls.coords().map(|c| [c.x, c.y]).collect(),
        },
        GeoGeometry::Polygon(p) => Geometry::Polygon { coordinates: polygon_rings(p) },
        GeoGeometry::MultiPoint(mp) => Geometry::MultiPoint {
            coordinates: mp.iter().map(|p| [p.x(), p.y()]).collect(),
        },
        GeoGeometry::MultiLineString(mls) => Geometry::MultiLineString {
            coordinates: mls.iter().map(|ls| ls.coords().map(|c| [c.x, c.y]).collect()).collect(),
        },
        GeoGeometry::MultiPolygon(mp) => {
            Geometry::MultiPolygon { coordinates: mp.iter().map(polygon_rings).collect() }
        }
        GeoGeometry::GeometryCollection(gc) => {
            Geometry::GeometryCollection { geometries: gc.iter().map(from_geo_geometry).collect() }
        }
        GeoGeometry::Rect(r) => Geometry::Polygon { coordinates: polygon_rings(&r.to_polygon()) },
        GeoGeometry::Triangle(t) => {
            Geometry::Polygon { coordinates: polygon_rings(&t.to_polygon()) }
        }
    }
}

/// Explode a geometry into single parts: points, line strings and polygons
pub fn explode(geom: GeoGeometry) -> Vec<GeoGeometry> {
    match geom {
        GeoGeometry::Point(_) | GeoGeometry::LineString(_) | GeoGeometry::Polygon(_) => vec![geom],
        GeoGeometry::Line(l) => vec![GeoGeometry::LineString(l.into())],
        GeoGeometry::Rect(r) => vec![GeoGeometry::Polygon(r.to_polygon())],
        GeoGeometry::Triangle(t) => vec![GeoGeometry::Polygon(t.to_polygon())],
        GeoGeometry::MultiPoint(mp) => mp.into_iter().map(GeoGeometry::Point).collect(),
        GeoGeometry::MultiLineString(mls) => {
            mls.into_iter().map(GeoGeometry::LineString).collect()
        }
        GeoGeometry::MultiPolygon(mp) => mp.into_iter().map(GeoGeometry::Polygon).collect(),
        GeoGeometry::GeometryCollection(gc) => gc.into_iter().flat_map(explode).collect(),
    }
}

/// Single-part geometry with the properties of the feature it came from
#[derive(Debug, Clone)]
pub struct FlatFeature {
    pub geometry: GeoGeometry,
    pub properties: Option<JsonObject>,
    /// Position of the source feature in its collection
    pub source_index: usize,
}

impl FlatFeature {
    pub fn is_point(&self) -> bool {
        matches!(self.geometry, GeoGeometry::Point(_))
    }

    /// Feature carrying this part's geometry and the source properties
    pub fn to_feature(&self) -> Feature {
        to_feature(&self.geometry, self.properties.clone())
    }
}

/// Geometry of a GeoJSON feature, if present and convertible
pub fn feature_geometry(feature: &Feature) -> Option<GeoGeometry> {
    let geometry = feature.geometry.as_ref()?;
    match GeoGeometry::<f64>::try_from(&geometry.value) {
        Ok(geom) => Some(geom),
        Err(e) => {
            tracing::warn!("Skipping feature with unsupported geometry: {}", e);
            None
        }
    }
}

/// Flatten a collection into single-part features; null geometries are skipped
pub fn flatten(collection: Option<&FeatureCollection>) -> Vec<FlatFeature> {
    let Some(collection) = collection else {
        return Vec::new();
    };
    collection
        .features
        .iter()
        .enumerate()
        .filter_map(|(index, feature)| feature_geometry(feature).map(|g| (index, feature, g)))
        .flat_map(|(index, feature, geometry)| {
            explode(geometry).into_iter().map(move |part| FlatFeature {
                geometry: part,
                properties: feature.properties.clone(),
                source_index: index,
            })
        })
        .collect()
}

/// Build a GeoJSON feature from a geo geometry
pub fn to_feature(geom: &GeoGeometry, properties: Option<JsonObject>) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::from(geom))),
        id: None,
        properties,
        foreign_members: None,
    }
}

/// Build a feature collection
pub fn feature_collection(features: Vec<Feature>) -> FeatureCollection {
    FeatureCollection { bbox: None, features, foreign_members: None }
}

/// Position used to associate an arbitrary geometry with its nearest span:
/// the centroid, else the first coordinate
pub fn representative_point(geom: &Geometry) -> Option<[f64; 2]> {
    if !geom.is_finite() {
        return None;
    }
    let shape = to_geo_geometry(geom);
    shape.centroid()
        .map(|p| [p.x(), p.y()])
        .or_else(|| shape.coords_iter().next().map(|c| [c.x, c.y]))
        .filter(|p| p[0].is_finite() && p[1].is_finite())
}

/// Extension trait for Geometry with geo-crate operations
pub trait GeometryExt {
    /// Convert to geo::Geometry
    fn to_geo(&self) -> GeoGeometry;

    /// Wrap as a GeoJSON feature
    fn to_feature(&self, properties: Option<JsonObject>) -> Feature;
}

impl GeometryExt for Geometry {
    fn to_geo(&self) -> GeoGeometry {
        to_geo_geometry(self)
    }

    fn to_feature(&self, properties: Option<JsonObject>) -> Feature {
        to_feature(&self.to_geo(), properties)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_point_roundtrip() {
        let geom = Geometry::point(-47.88, -15.79);
        let back = from_geo_geometry(&to_geo_geometry(&geom));
        assert_eq!(geom, back);
    }

    #[test]
    fn test_polygon_keeps_holes() {
        let geom = Geometry::polygon(vec![
            vec![[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0], [0.0, 0.0]],
            vec![[1.0, 1.0], [2.0, 1.0], [2.0, 2.0], [1.0, 1.0]],
        ]);
        let back = from_geo_geometry(&to_geo_geometry(&geom));
        match back {
            Geometry::Polygon { coordinates } => assert_eq!(coordinates.len(), 2),
            other => panic!("Expected Polygon, got {:?}", other),
        }
    }

    #[test]
    fn test_flatten_explodes_multi_parts_and_skips_null() {
        let collection: FeatureCollection = serde_json::from_value(json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"nome": "a"},
                 "geometry": {"type": "MultiPoint", "coordinates": [[0.0, 0.0], [1.0, 1.0]]}},
                {"type": "Feature", "properties": {"nome": "b"}, "geometry": null}
            ]
        }))
        .unwrap();

        let flat = flatten(Some(&collection));
        assert_eq!(flat.len(), 2);
        assert!(flat.iter().all(FlatFeature::is_point));
        assert_eq!(flat[1].properties.as_ref().unwrap()["nome"], "a");
        assert!(flatten(None).is_empty());
    }

    #[test]
    fn test_representative_point() {
        let square = Geometry::polygon(vec![vec![[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 2.0], [0.0, 0.0]]]);
        let p = representative_point(&square).unwrap();
        assert!((p[0] - 1.0).abs() < 1e-9 && (p[1] - 1.0).abs() < 1e-9);
        assert_eq!(representative_point(&Geometry::point(3.0, 4.0)), Some([3.0, 4.0]));
        assert!(representative_point(&Geometry::point(f64::NAN, 0.0)).is_none());
    }
}
