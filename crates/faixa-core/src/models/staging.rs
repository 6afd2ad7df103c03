use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::geometry::{Geometry, GeometryType};

/// Staging area for KML placemarks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KmlLayer {
    Line,
    Structure,
    Treated,
}

impl KmlLayer {
    /// Geometry types kept when staging this layer. `None` keeps everything.
    pub fn allowed_geometries(&self) -> Option<&'static [GeometryType]> {
        match self {
            KmlLayer::Line => Some(&[GeometryType::LineString, GeometryType::MultiLineString]),
            KmlLayer::Structure => Some(&[GeometryType::Point]),
            KmlLayer::Treated => None,
        }
    }

    /// Whether a feature with this geometry belongs in the layer
    pub fn accepts(&self, geometry: Option<&Geometry>) -> bool {
        match self.allowed_geometries() {
            None => true,
            Some(allowed) => geometry.is_some_and(|g| allowed.contains(&g.geometry_type())),
        }
    }

    pub fn table_name(&self) -> &'static str {
        match self {
            KmlLayer::Line => "stg_kml_linha",
            KmlLayer::Structure => "stg_kml_estrutura",
            KmlLayer::Treated => "stg_kml_tratado",
        }
    }
}

/// Staging area for CSV rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CsvTable {
    Vegetation,
    VegetationRisk,
    LateralRisk,
    Crossings,
}

impl CsvTable {
    pub fn table_name(&self) -> &'static str {
        match self {
            CsvTable::Vegetation => "stg_csv_vegetacao",
            CsvTable::VegetationRisk => "stg_csv_risco_vegetacao",
            CsvTable::LateralRisk => "stg_csv_queda_lateral",
            CsvTable::Crossings => "stg_csv_cruzamentos",
        }
    }
}

/// Raw KML placemark as staged for a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedFeature {
    /// 1-based position within the staged layer
    pub order: usize,
    pub source_file: String,
    /// Display name: the `name` property, else the placemark id
    pub name: Option<String>,
    pub properties: BTreeMap<String, String>,
    pub geometry: Option<Geometry>,
}

/// Raw CSV record as staged for a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedRow {
    /// 1-based data row number (header excluded)
    pub row_number: usize,
    pub source_file: String,
    pub values: BTreeMap<String, String>,
}

impl StagedFeature {
    /// Context string for error messages, e.g. `estruturas.kml#3 (E7)`
    pub fn context(&self) -> String {
        match &self.name {
            Some(name) => format!("{}#{} ({})", self.source_file, self.order, name),
            None => format!("{}#{}", self.source_file, self.order),
        }
    }
}

impl StagedRow {
    pub fn context(&self) -> String {
        format!("{} row {}", self.source_file, self.row_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_geometry_filters() {
        let point = Geometry::point(0.0, 0.0);
        let line = Geometry::line_string(vec![[0.0, 0.0], [1.0, 1.0]]);

        assert!(KmlLayer::Structure.accepts(Some(&point)));
        assert!(!KmlLayer::Structure.accepts(Some(&line)));
        assert!(KmlLayer::Line.accepts(Some(&line)));
        assert!(!KmlLayer::Line.accepts(None));
        assert!(KmlLayer::Treated.accepts(None));
    }

    #[test]
    fn test_feature_context() {
        let feature = StagedFeature {
            order: 3,
            source_file: "estruturas.kml".to_string(),
            name: Some("E7".to_string()),
            properties: BTreeMap::new(),
            geometry: None,
        };
        assert_eq!(feature.context(), "estruturas.kml#3 (E7)");
    }
}
