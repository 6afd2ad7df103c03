//! Local metric frame for buffering longitude/latitude geometries
//!
//! Buffers in meters need a planar frame. Corridor surveys span a few tens of
//! kilometers, so an equirectangular projection centered on the data keeps
//! distortion well below survey precision without a CRS database.

use geo::{BoundingRect, Coord, Distance, Haversine, MapCoords, Point};
use geo::Geometry as GeoGeometry;

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Equirectangular projection centered on an origin, in meters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalFrame {
    origin: Coord,
    meters_per_degree_x: f64,
    meters_per_degree_y: f64,
}

impl LocalFrame {
    /// Frame centered on a longitude/latitude origin
    pub fn new(origin_lon: f64, origin_lat: f64) -> Self {
        let meters_per_degree_y = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
        let meters_per_degree_x = meters_per_degree_y * origin_lat.to_radians().cos();
        Self { origin: Coord { x: origin_lon, y: origin_lat }, meters_per_degree_x, meters_per_degree_y }
    }

    /// Frame centered on the bounding box of the given geometries.
    ///
    /// Returns `None` when no geometry has a finite extent.
    pub fn around<'a, I>(geometries: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a GeoGeometry>,
    {
        let mut min = Coord { x: f64::INFINITY, y: f64::INFINITY };
        let mut max = Coord { x: f64::NEG_INFINITY, y: f64::NEG_INFINITY };

        for rect in geometries.into_iter().filter_map(|g| g.bounding_rect()) {
            min.x = min.x.min(rect.min().x);
            min.y = min.y.min(rect.min().y);
            max.x = max.x.max(rect.max().x);
            max.y = max.y.max(rect.max().y);
        }

        let center = Coord { x: (min.x + max.x) / 2.0, y: (min.y + max.y) / 2.0 };
        (center.x.is_finite() && center.y.is_finite()).then(|| Self::new(center.x, center.y))
    }

    pub fn origin(&self) -> [f64; 2] {
        [self.origin.x, self.origin.y]
    }

    /// Longitude/latitude to local meters
    pub fn project(&self, c: Coord) -> Coord {
        Coord {
            x: (c.x - self.origin.x) * self.meters_per_degree_x,
            y: (c.y - self.origin.y) * self.meters_per_degree_y,
        }
    }

    /// Local meters back to longitude/latitude
    pub fn unproject(&self, c: Coord) -> Coord {
        Coord {
            x: c.x / self.meters_per_degree_x + self.origin.x,
            y: c.y / self.meters_per_degree_y + self.origin.y,
        }
    }

    pub fn project_point(&self, p: [f64; 2]) -> [f64; 2] {
        let c = self.project(Coord { x: p[0], y: p[1] });
        [c.x, c.y]
    }

    pub fn project_geometry(&self, geom: &GeoGeometry) -> GeoGeometry {
        geom.map_coords(|c| self.project(c))
    }

    pub fn unproject_geometry(&self, geom: &GeoGeometry) -> GeoGeometry {
        geom.map_coords(|c| self.unproject(c))
    }
}

/// Great-circle distance in meters between two longitude/latitude positions
pub fn geodesic_distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    Haversine.distance(Point::new(a[0], a[1]), Point::new(b[0], b[1]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_unproject_roundtrip() {
        let frame = LocalFrame::new(-47.88, -15.79);
        let c = Coord { x: -47.9, y: -15.75 };
        let back = frame.unproject(frame.project(c));
        assert!((back.x - c.x).abs() < 1e-12);
        assert!((back.y - c.y).abs() < 1e-12);
    }

    #[test]
    fn test_local_distances_match_haversine() {
        let frame = LocalFrame::new(-47.88, -15.79);
        let a = [-47.88, -15.79];
        let b = [-47.87, -15.785];
        let pa = frame.project_point(a);
        let pb = frame.project_point(b);
        let planar = ((pa[0] - pb[0]).powi(2) + (pa[1] - pb[1]).powi(2)).sqrt();
        let geodesic = geodesic_distance(a, b);
        assert!((planar - geodesic).abs() / geodesic < 1e-3, "{} vs {}", planar, geodesic);
    }

    #[test]
    fn test_frame_around_empty_input_is_none() {
        let empty: Vec<GeoGeometry> = Vec::new();
        assert!(LocalFrame::around(&empty).is_none());

        let geoms = vec![GeoGeometry::Point(Point::new(10.0, 20.0))];
        assert_eq!(LocalFrame::around(&geoms).map(|f| f.origin()), Some([10.0, 20.0]));
    }

    #[test]
    fn test_geodesic_distance_one_degree_latitude() {
        let d = geodesic_distance([0.0, 0.0], [0.0, 1.0]);
        assert!((d - 111_195.0).abs() < 10.0, "got {}", d);
    }
}
