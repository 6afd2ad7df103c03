//! Vegetation, risk, crossing and treatment records attached to spans.

use serde::{Deserialize, Serialize};

use super::geometry::Geometry;
use super::network::{LineId, ScenarioId, SpanId};

uuid_id!(
    /// Unique identifier for a tree or vegetation element
    TreeId
);

/// Vegetation element keyed by (line, external code)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub id: TreeId,
    pub line_id: LineId,
    pub span_id: Option<SpanId>,
    pub code: String,
    pub geometry: Option<Geometry>,
    pub height_m: Option<f64>,
    pub vegetation_type: Option<String>,
    /// Inside a permanent preservation area (APP). `None` is unknown.
    pub riparian: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeUpsert {
    pub line_id: LineId,
    pub span_id: Option<SpanId>,
    pub code: String,
    pub geometry: Option<Geometry>,
    pub height_m: Option<f64>,
    pub vegetation_type: Option<String>,
    pub riparian: Option<bool>,
}

impl Tree {
    /// Merge an upsert, keeping stored attributes the import does not supply
    pub fn merge(&mut self, upsert: &TreeUpsert) {
        if upsert.span_id.is_some() {
            self.span_id = upsert.span_id;
        }
        if upsert.geometry.is_some() {
            self.geometry = upsert.geometry.clone();
        }
        if upsert.height_m.is_some() {
            self.height_m = upsert.height_m;
        }
        if upsert.vegetation_type.is_some() {
            self.vegetation_type = upsert.vegetation_type.clone();
        }
        if upsert.riparian.is_some() {
            self.riparian = upsert.riparian;
        }
    }
}

/// Where a risk or crossing record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskSource {
    /// Classified upstream, read from a survey CSV
    Survey,
    /// Computed by a spatial operator during normalization
    Spatial,
}

impl RiskSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskSource::Survey => "survey",
            RiskSource::Spatial => "spatial",
        }
    }
}

/// Vegetation clearance risk for a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VegetationRisk {
    pub scenario_id: ScenarioId,
    pub span_id: Option<SpanId>,
    pub tree_id: Option<TreeId>,
    pub clearance_m: Option<f64>,
    pub risk_class: Option<String>,
    pub lateral_distance_m: Option<f64>,
    pub category: Option<String>,
    pub processed_at: Option<String>,
    pub source: RiskSource,
    pub row_number: Option<usize>,
}

impl VegetationRisk {
    /// Severity label: the clearance class, else the category
    pub fn severity(&self) -> Option<&str> {
        self.risk_class.as_deref().or(self.category.as_deref())
    }
}

/// Lateral fall risk (queda lateral): a tree that could reach the conductors when falling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LateralRisk {
    pub scenario_id: ScenarioId,
    pub line_id: LineId,
    pub span_id: Option<SpanId>,
    pub tree_code: Option<String>,
    pub lateral_distance_m: Option<f64>,
    pub fall_height_m: Option<f64>,
    pub risk_class: Option<String>,
    pub geometry: Option<Geometry>,
    pub row_number: usize,
}

/// Intersection or near-intersection of the corridor with a third-party asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crossing {
    pub scenario_id: ScenarioId,
    pub line_id: LineId,
    pub span_id: Option<SpanId>,
    pub crossing_type: Option<String>,
    pub risk_class: Option<String>,
    pub description: Option<String>,
    pub geometry: Option<Geometry>,
    pub source: RiskSource,
}

/// Vegetation management action from the treated-vegetation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Treatment {
    pub scenario_id: ScenarioId,
    pub line_id: LineId,
    pub span_id: Option<SpanId>,
    pub treatment_type: Option<String>,
    pub executed_at: Option<String>,
    pub geometry: Option<Geometry>,
    pub origin: String,
}

/// Risk facts gathered per span for the risk simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanRiskInputs {
    pub span_id: SpanId,
    pub span_code: String,
    pub vegetation_classes: Vec<Option<String>>,
    pub lateral_risks: usize,
    pub crossing_classes: Vec<Option<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_prefers_class_over_category() {
        let mut risk = VegetationRisk {
            scenario_id: ScenarioId::new(),
            span_id: None,
            tree_id: None,
            clearance_m: Some(2.0),
            risk_class: None,
            lateral_distance_m: None,
            category: Some("media".to_string()),
            processed_at: None,
            source: RiskSource::Survey,
            row_number: Some(1),
        };
        assert_eq!(risk.severity(), Some("media"));
        risk.risk_class = Some("alta".to_string());
        assert_eq!(risk.severity(), Some("alta"));
    }

    #[test]
    fn test_tree_merge_keeps_unknown_riparian() {
        let line_id = LineId::new();
        let mut tree = Tree {
            id: TreeId::new(),
            line_id,
            span_id: None,
            code: "T1".to_string(),
            geometry: None,
            height_m: Some(12.0),
            vegetation_type: None,
            riparian: Some(true),
        };
        tree.merge(&TreeUpsert {
            line_id,
            span_id: None,
            code: "T1".to_string(),
            geometry: None,
            height_m: None,
            vegetation_type: Some("eucalipto".to_string()),
            riparian: None,
        });
        assert_eq!(tree.riparian, Some(true));
        assert_eq!(tree.height_m, Some(12.0));
        assert_eq!(tree.vegetation_type.as_deref(), Some("eucalipto"));
    }
}
