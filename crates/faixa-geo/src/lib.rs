//! Faixa Geo - spatial operators for corridor risk analysis
//!
//! Stateless functions over GeoJSON feature collections: pairwise
//! intersection, distance-buffer containment and concentric risk banding,
//! plus the local metric frame and span index used during normalization.

pub mod analysis;
pub mod index;
pub mod models;
pub mod spatial;
pub mod transform;

pub use analysis::{
    analyze_crossings, analyze_flood, CrossingReport, CrossingRequest, CrossingStats,
    FloodRequest,
};
pub use index::{distance_to_path, locate_along, SpanIndex};
pub use models::representative_point;
pub use spatial::{
    intersect, is_protected, points_within, risk_bands, sanitize_radii, within_distance, FloodRiskReport,
    RadiusBand,
};
pub use transform::LocalFrame;
