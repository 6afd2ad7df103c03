//! Spatial operators over GeoJSON feature collections
//!
//! All operators are total over "no data": absent collections, null
//! geometries and empty buffers yield empty results. Only structurally
//! invalid requests (no usable radius) are errors.

use std::collections::BTreeMap;

use faixa_core::fields::coerce_bool;
use faixa_core::{FaixaError, Result};
use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{BooleanOps, Buffer, Coord, CoordsIter, Geometry as GeoGeometry, Intersects, LineString, MultiLineString, MultiPolygon, Point, Polygon};
use geojson::{FeatureCollection, JsonObject};
use serde::Serialize;
use serde_json::Value;

use crate::models::{feature_collection, flatten, to_feature, FlatFeature};
use crate::transform::LocalFrame;

/// Pairwise intersection of every single-part feature of `a` with every one of `b`.
///
/// Each non-empty intersection becomes a feature whose properties are
/// `{"a": <props of a>, "b": <props of b>}`.
pub fn intersect(a: Option<&FeatureCollection>, b: Option<&FeatureCollection>) -> FeatureCollection {
    let left = flatten(a);
    let right = flatten(b);
    let mut results = Vec::new();

    for fa in &left {
        for fb in &right {
            if let Some(geometry) = intersect_parts(&fa.geometry, &fb.geometry) {
                results.push(to_feature(&geometry, Some(pair_properties(fa, fb))));
            }
        }
    }

    feature_collection(results)
}

fn pair_properties(a: &FlatFeature, b: &FlatFeature) -> JsonObject {
    let mut properties = JsonObject::new();
    properties.insert("a".to_string(), a.properties.clone().map(Value::Object).unwrap_or(Value::Null));
    properties.insert("b".to_string(), b.properties.clone().map(Value::Object).unwrap_or(Value::Null));
    properties
}

/// Intersection of two single-part geometries, `None` when empty
pub fn intersect_parts(a: &GeoGeometry, b: &GeoGeometry) -> Option<GeoGeometry> {
    if !is_finite(a) || !is_finite(b) || !a.intersects(b) {
        return None;
    }

    match (a, b) {
        (GeoGeometry::Point(p), other) | (other, GeoGeometry::Point(p)) => {
            other.intersects(p).then_some(GeoGeometry::Point(*p))
        }
        (GeoGeometry::LineString(la), GeoGeometry::LineString(lb)) => line_line(la, lb),
        (GeoGeometry::LineString(line), GeoGeometry::Polygon(poly))
        | (GeoGeometry::Polygon(poly), GeoGeometry::LineString(line)) => line_polygon(line, poly),
        (GeoGeometry::Polygon(pa), GeoGeometry::Polygon(pb)) => {
            collapse_polygons(pa.intersection(pb))
        }
        _ => None,
    }
}

fn line_line(a: &LineString, b: &LineString) -> Option<GeoGeometry> {
    let mut points: Vec<Coord> = Vec::new();
    let mut overlaps: Vec<LineString> = Vec::new();

    for sa in a.lines() {
        for sb in b.lines() {
            match line_intersection(sa, sb) {
                Some(LineIntersection::SinglePoint { intersection, .. }) => {
                    if !points.contains(&intersection) {
                        points.push(intersection);
                    }
                }
                Some(LineIntersection::Collinear { intersection }) => overlaps.push(intersection.into()),
                None => {}
            }
        }
    }

    let mut parts: Vec<GeoGeometry> = Vec::new();
    match overlaps.len() {
        0 => {}
        1 => parts.extend(overlaps.into_iter().map(GeoGeometry::LineString)),
        _ => parts.push(GeoGeometry::MultiLineString(MultiLineString::new(overlaps))),
    }
    match points.len() {
        0 => {}
        1 => parts.push(GeoGeometry::Point(points[0].into())),
        _ => parts.push(GeoGeometry::MultiPoint(points.into_iter().map(Point::from).collect())),
    }

    match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(GeoGeometry::GeometryCollection(parts.into())),
    }
}

fn line_polygon(line: &LineString, polygon: &Polygon) -> Option<GeoGeometry> {
    let clipped = polygon.clip(&MultiLineString::new(vec![line.clone()]), false);
    match clipped.0.len() {
        0 => None,
        1 => clipped.0.into_iter().next().map(GeoGeometry::LineString),
        _ => Some(GeoGeometry::MultiLineString(clipped)),
    }
}

fn collapse_polygons(mp: MultiPolygon) -> Option<GeoGeometry> {
    match mp.0.len() {
        0 => None,
        1 => mp.0.into_iter().next().map(GeoGeometry::Polygon),
        _ => Some(GeoGeometry::MultiPolygon(mp)),
    }
}

fn point_of(feature: &FlatFeature) -> Option<Point> {
    match feature.geometry {
        GeoGeometry::Point(p) => Some(p),
        _ => None,
    }
}

fn is_finite(geom: &GeoGeometry) -> bool {
    geom.coords_iter().all(|c| c.x.is_finite() && c.y.is_finite())
}

/// Point features of `points` lying within `meters` of any feature of `lines`.
///
/// Non-finite or non-positive distances, and inputs that produce no buffer,
/// yield an empty collection. Multi-points are tested part by part.
pub fn within_distance(
    points: Option<&FeatureCollection>,
    lines: Option<&FeatureCollection>,
    meters: f64,
) -> FeatureCollection {
    let targets: Vec<GeoGeometry> = flatten(lines).into_iter().map(|f| f.geometry).collect();
    let candidates: Vec<FlatFeature> = flatten(points).into_iter().filter(FlatFeature::is_point).collect();
    let positions: Vec<Point> = candidates.iter().filter_map(point_of).collect();

    let inside = points_within(&positions, &targets, meters);
    feature_collection(inside.into_iter().map(|i| candidates[i].to_feature()).collect())
}

/// Indices of `points` lying within `meters` of any of `geometries`
pub fn points_within(points: &[Point], geometries: &[GeoGeometry], meters: f64) -> Vec<usize> {
    if !meters.is_finite() || meters <= 0.0 {
        return Vec::new();
    }

    let usable: Vec<&GeoGeometry> = geometries.iter().filter(|g| is_finite(g)).collect();
    let Some(frame) = LocalFrame::around(usable.iter().copied()) else {
        return Vec::new();
    };

    let buffers = metric_buffers(&frame, &usable, meters);
    if buffers.is_empty() {
        return Vec::new();
    }

    points
        .iter()
        .enumerate()
        .filter(|(_, p)| p.x().is_finite() && p.y().is_finite())
        .filter(|(_, p)| {
            let local = Point::from(frame.project(p.0));
            buffers.iter().any(|b| b.intersects(&local))
        })
        .map(|(i, _)| i)
        .collect()
}

/// Buffer every geometry in the local frame; empty buffers are dropped
fn metric_buffers(frame: &LocalFrame, geometries: &[&GeoGeometry], meters: f64) -> Vec<MultiPolygon> {
    geometries
        .iter()
        .map(|g| frame.project_geometry(g).buffer(meters))
        .filter(|mp| !mp.0.is_empty())
        .collect()
}

/// Per-radius structure counts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadiusBand {
    pub raio: f64,
    pub total: usize,
    pub com_protecao: usize,
    pub sem_protecao: usize,
}

/// Flood-proximity banding result
#[derive(Debug, Clone, Serialize)]
pub struct FloodRiskReport {
    pub series: Vec<RadiusBand>,
    /// Buffer polygons per radius, keyed by the radius as text
    pub buffers_por_raio: BTreeMap<String, FeatureCollection>,
    /// Structures inside each radius, tagged with `protegido`
    pub estruturas_por_raio: BTreeMap<String, FeatureCollection>,
}

/// Finite, strictly positive radii in ascending order without repeats
pub fn sanitize_radii(radii: &[f64]) -> Vec<f64> {
    let mut valid: Vec<f64> = radii.iter().copied().filter(|r| r.is_finite() && *r > 0.0).collect();
    valid.sort_by(|a, b| a.total_cmp(b));
    valid.dedup();
    valid
}

/// Whether a structure carries the protective measure named by `attribute`.
///
/// Booleans are taken as-is, numbers count when positive and text uses the
/// boolean vocabulary. Anything else, including an absent attribute, is
/// unprotected.
pub fn is_protected(properties: Option<&JsonObject>, attribute: &str) -> bool {
    match properties.and_then(|p| p.get(attribute)) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v > 0.0),
        Some(Value::String(s)) => coerce_bool(s) == Some(true),
        _ => false,
    }
}

fn radius_key(radius: f64) -> String {
    radius.to_string()
}

/// Count structures within each radius of the flooded areas.
///
/// Radii are cumulative: every radius gets a fresh buffer, so a structure
/// within 100 m is also counted at 250 m.
pub fn risk_bands(
    radii: &[f64],
    flooded: &FeatureCollection,
    structures: &FeatureCollection,
    attribute: &str,
) -> Result<FloodRiskReport> {
    let radii = sanitize_radii(radii);
    if radii.is_empty() {
        return Err(FaixaError::invalid_parameter("raios", "at least one positive radius is required"));
    }

    let areas: Vec<FlatFeature> =
        flatten(Some(flooded)).into_iter().filter(|f| is_finite(&f.geometry)).collect();
    let towers: Vec<FlatFeature> = flatten(Some(structures))
        .into_iter()
        .filter(|f| f.is_point() && is_finite(&f.geometry))
        .collect();
    let frame = LocalFrame::around(areas.iter().chain(towers.iter()).map(|f| &f.geometry));

    let mut report = FloodRiskReport {
        series: Vec::with_capacity(radii.len()),
        buffers_por_raio: BTreeMap::new(),
        estruturas_por_raio: BTreeMap::new(),
    };

    for radius in radii {
        let mut buffer_features = Vec::new();
        let mut inside_features = Vec::new();
        let mut total = 0;
        let mut com_protecao = 0;

        if let Some(frame) = frame.as_ref() {
            let buffers: Vec<(MultiPolygon, &FlatFeature)> = areas
                .iter()
                .map(|area| (frame.project_geometry(&area.geometry).buffer(radius), area))
                .filter(|(mp, _)| !mp.0.is_empty())
                .collect();

            for tower in &towers {
                let Some(position) = point_of(tower) else {
                    continue;
                };
                let local = Point::from(frame.project(position.0));
                if !buffers.iter().any(|(b, _)| b.intersects(&local)) {
                    continue;
                }
                total += 1;
                let protegido = is_protected(tower.properties.as_ref(), attribute);
                if protegido {
                    com_protecao += 1;
                }
                let mut properties = tower.properties.clone().unwrap_or_default();
                properties.insert("protegido".to_string(), Value::Bool(protegido));
                inside_features.push(to_feature(&tower.geometry, Some(properties)));
            }

            for (buffer, area) in buffers {
                let lonlat = frame.unproject_geometry(&GeoGeometry::MultiPolygon(buffer));
                buffer_features.push(to_feature(&lonlat, area.properties.clone()));
            }
        }

        tracing::debug!(radius, total, com_protecao, "Computed flood-proximity band");

        report.series.push(RadiusBand {
            raio: radius,
            total,
            com_protecao,
            sem_protecao: total.saturating_sub(com_protecao),
        });
        report.buffers_por_raio.insert(radius_key(radius), feature_collection(buffer_features));
        report.estruturas_por_raio.insert(radius_key(radius), feature_collection(inside_features));
    }

    Ok(report)
}
