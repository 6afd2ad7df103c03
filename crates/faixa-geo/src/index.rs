//! Nearest-span lookup over span segments
//!
//! Spans are indexed as straight segments between their two structures in a
//! local metric frame, so nearest-neighbor distances are in meters.

use geo::{Coord, Distance, Euclidean, LineLocatePoint, LineString, Point};
use rstar::primitives::{GeomWithData, Line};
use rstar::RTree;

use crate::transform::LocalFrame;

type SpanSegment<K> = GeomWithData<Line<[f64; 2]>, K>;

/// R-tree of span segments keyed by a caller-supplied span key
pub struct SpanIndex<K> {
    frame: Option<LocalFrame>,
    tree: RTree<SpanSegment<K>>,
}

impl<K: Clone> SpanIndex<K> {
    /// Index spans given as `(key, start, end)` longitude/latitude pairs.
    ///
    /// Segments with non-finite ends are left out.
    pub fn build<I>(spans: I) -> Self
    where
        I: IntoIterator<Item = (K, [f64; 2], [f64; 2])>,
    {
        let spans: Vec<(K, [f64; 2], [f64; 2])> = spans
            .into_iter()
            .filter(|(_, a, b)| a.iter().chain(b.iter()).all(|v| v.is_finite()))
            .collect();

        // centered on the mean of all span ends
        let frame = (!spans.is_empty()).then(|| {
            let (lon, lat) = spans.iter().fold((0.0, 0.0), |(x, y), (_, s, e)| {
                (x + s[0] + e[0], y + s[1] + e[1])
            });
            let n = (spans.len() * 2) as f64;
            LocalFrame::new(lon / n, lat / n)
        });

        let segments = match frame {
            Some(frame) => spans
                .into_iter()
                .map(|(key, a, b)| {
                    GeomWithData::new(Line::new(frame.project_point(a), frame.project_point(b)), key)
                })
                .collect(),
            None => Vec::new(),
        };

        Self { frame, tree: RTree::bulk_load(segments) }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Key of the span nearest to a longitude/latitude position, with the distance in meters
    pub fn nearest(&self, position: [f64; 2]) -> Option<(K, f64)> {
        let frame = self.frame?;
        if !position.iter().all(|v| v.is_finite()) {
            return None;
        }
        let query = frame.project_point(position);
        self.tree
            .nearest_neighbor(&query)
            .map(|segment| (segment.data.clone(), segment_distance(segment.geom(), query)))
    }
}

fn segment_distance(line: &Line<[f64; 2]>, p: [f64; 2]) -> f64 {
    let segment = geo::Line::new(Coord { x: line.from[0], y: line.from[1] }, Coord { x: line.to[0], y: line.to[1] });
    Euclidean.distance(&Point::new(p[0], p[1]), &segment)
}

/// Fraction (0..=1) along a path of the point closest to `position`.
///
/// Computed in a local metric frame around the path; `None` when the path is
/// degenerate or any coordinate is non-finite.
pub fn locate_along(path: &[[f64; 2]], position: [f64; 2]) -> Option<f64> {
    if path.len() < 2 || !path.iter().chain(std::iter::once(&position)).flatten().all(|v| v.is_finite()) {
        return None;
    }
    let frame = LocalFrame::new(path[0][0], path[0][1]);
    let line: LineString = path.iter().map(|c| frame.project(Coord { x: c[0], y: c[1] })).collect();
    let point = Point::from(frame.project(Coord { x: position[0], y: position[1] }));
    line.line_locate_point(&point).filter(|f| f.is_finite())
}

/// Distance in meters from a position to a path
pub fn distance_to_path(path: &[[f64; 2]], position: [f64; 2]) -> Option<f64> {
    if path.is_empty() || !path.iter().chain(std::iter::once(&position)).flatten().all(|v| v.is_finite()) {
        return None;
    }
    let frame = LocalFrame::new(position[0], position[1]);
    let point = Point::new(0.0, 0.0);
    if path.len() == 1 {
        let p = frame.project_point(path[0]);
        return Some(Euclidean.distance(&point, &Point::new(p[0], p[1])));
    }
    let line: LineString = path.iter().map(|c| frame.project(Coord { x: c[0], y: c[1] })).collect();
    Some(Euclidean.distance(&point, &line))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans() -> SpanIndex<&'static str> {
        SpanIndex::build(vec![
            ("E1 - E2", [-47.900, -15.800], [-47.899, -15.800]),
            ("E2 - E3", [-47.899, -15.800], [-47.898, -15.800]),
        ])
    }

    #[test]
    fn test_nearest_span() {
        let index = spans();
        assert_eq!(index.len(), 2);

        let (key, distance) = index.nearest([-47.8995, -15.7999]).unwrap();
        assert_eq!(key, "E1 - E2");
        assert!((distance - 11.1).abs() < 0.5, "distance {}", distance);

        let (key, _) = index.nearest([-47.8982, -15.8003]).unwrap();
        assert_eq!(key, "E2 - E3");
    }

    #[test]
    fn test_empty_index_has_no_nearest() {
        let index: SpanIndex<u32> = SpanIndex::build(Vec::new());
        assert!(index.is_empty());
        assert!(index.nearest([0.0, 0.0]).is_none());
    }

    #[test]
    fn test_non_finite_segments_are_skipped() {
        let index = SpanIndex::build(vec![(1, [f64::NAN, 0.0], [1.0, 1.0]), (2, [0.0, 0.0], [0.001, 0.0])]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.nearest([0.0005, 0.0001]).map(|(k, _)| k), Some(2));
    }

    #[test]
    fn test_locate_along_orders_positions() {
        let path = [[-47.900, -15.800], [-47.898, -15.800]];
        let a = locate_along(&path, [-47.8995, -15.8001]).unwrap();
        let b = locate_along(&path, [-47.8985, -15.7999]).unwrap();
        assert!(a < b);
        assert!((a - 0.25).abs() < 0.01);
        assert!(locate_along(&path[..1], [0.0, 0.0]).is_none());
    }

    #[test]
    fn test_distance_to_path_in_meters() {
        let path = [[-47.900, -15.800], [-47.890, -15.800]];
        let d = distance_to_path(&path, [-47.895, -15.79991]).unwrap();
        assert!((d - 10.0).abs() < 0.2, "distance {}", d);
    }
}
