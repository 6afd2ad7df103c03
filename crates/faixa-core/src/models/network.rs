//! Transmission network records: lines, scenarios, structures and spans.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::geometry::Geometry;

uuid_id!(
    /// Unique identifier for a transmission line
    LineId
);

uuid_id!(
    /// Unique identifier for a survey scenario
    ScenarioId
);

uuid_id!(
    /// Unique identifier for a structure (tower or pole)
    StructureId
);

uuid_id!(
    /// Unique identifier for a span between two structures
    SpanId
);

/// Transmission line (linha), keyed by its externally assigned code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub id: LineId,
    pub code: String,
    pub name: Option<String>,
    pub concessionaire: Option<String>,
    pub region: Option<String>,
    pub voltage_kv: Option<f64>,
    pub geometry: Option<Geometry>,
}

/// Values supplied by an import for a line. `None` never overwrites stored metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineUpsert {
    pub code: String,
    pub name: Option<String>,
    pub concessionaire: Option<String>,
    pub region: Option<String>,
    pub voltage_kv: Option<f64>,
    pub geometry: Option<Geometry>,
}

impl Line {
    /// Merge an upsert into an existing line without discarding stored metadata
    pub fn merge(&mut self, upsert: &LineUpsert) {
        if upsert.name.is_some() {
            self.name = upsert.name.clone();
        }
        if upsert.concessionaire.is_some() {
            self.concessionaire = upsert.concessionaire.clone();
        }
        if upsert.region.is_some() {
            self.region = upsert.region.clone();
        }
        if upsert.voltage_kv.is_some() {
            self.voltage_kv = upsert.voltage_kv;
        }
        if upsert.geometry.is_some() {
            self.geometry = upsert.geometry.clone();
        }
    }
}

/// Kind of survey snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioType {
    /// Survey taken before vegetation management
    #[default]
    PreManejo,
    /// Survey taken after vegetation management
    PosManejo,
    Simulado,
}

impl ScenarioType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioType::PreManejo => "pre_manejo",
            ScenarioType::PosManejo => "pos_manejo",
            ScenarioType::Simulado => "simulado",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "pre_manejo" | "pre" => Some(ScenarioType::PreManejo),
            "pos_manejo" | "pos" => Some(ScenarioType::PosManejo),
            "simulado" => Some(ScenarioType::Simulado),
            _ => None,
        }
    }
}

impl fmt::Display for ScenarioType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    #[default]
    Ativo,
    Arquivado,
}

impl ScenarioStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioStatus::Ativo => "ativo",
            ScenarioStatus::Arquivado => "arquivado",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "ativo" => Some(ScenarioStatus::Ativo),
            "arquivado" => Some(ScenarioStatus::Arquivado),
            _ => None,
        }
    }
}

impl fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Survey snapshot (cenario) of a line, keyed by (line, description)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: ScenarioId,
    pub line_id: LineId,
    pub description: String,
    pub reference_date: Option<NaiveDate>,
    pub scenario_type: ScenarioType,
    pub status: ScenarioStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioUpsert {
    pub line_id: LineId,
    pub description: String,
    pub reference_date: Option<NaiveDate>,
    pub scenario_type: ScenarioType,
    pub status: ScenarioStatus,
}

/// Tower or pole belonging to a line, keyed by (line, code)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    pub id: StructureId,
    pub line_id: LineId,
    pub code: String,
    pub structure_type: Option<String>,
    pub circuits: Option<f64>,
    pub height_m: Option<f64>,
    pub longitude: f64,
    pub latitude: f64,
    /// Position of the staged feature inside its source file
    pub stage_order: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructureUpsert {
    pub line_id: LineId,
    pub code: String,
    pub structure_type: Option<String>,
    pub circuits: Option<f64>,
    pub height_m: Option<f64>,
    pub longitude: f64,
    pub latitude: f64,
    pub stage_order: usize,
}

impl Structure {
    /// Merge an upsert, keeping stored attributes the import does not supply
    pub fn merge(&mut self, upsert: &StructureUpsert) {
        if upsert.structure_type.is_some() {
            self.structure_type = upsert.structure_type.clone();
        }
        if upsert.circuits.is_some() {
            self.circuits = upsert.circuits;
        }
        if upsert.height_m.is_some() {
            self.height_m = upsert.height_m;
        }
        self.longitude = upsert.longitude;
        self.latitude = upsert.latitude;
        self.stage_order = upsert.stage_order;
    }

    pub fn position(&self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }
}

/// Segment between two consecutive structures, generated per scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub id: SpanId,
    pub line_id: LineId,
    pub scenario_id: ScenarioId,
    pub start_structure: StructureId,
    pub end_structure: StructureId,
    /// "<start code> - <end code>"
    pub code: String,
    pub start_code: String,
    pub end_code: String,
    pub length_m: f64,
    pub geometry: Geometry,
}

/// Span derived by the normalizer, before it receives an identifier
#[derive(Debug, Clone, PartialEq)]
pub struct NewSpan {
    pub start_structure: StructureId,
    pub end_structure: StructureId,
    pub code: String,
    pub start_code: String,
    pub end_code: String,
    pub length_m: f64,
    pub geometry: Geometry,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_merge_is_non_destructive() {
        let mut line = Line {
            id: LineId::new(),
            code: "LT-01".to_string(),
            name: Some("Linha Norte".to_string()),
            concessionaire: Some("Eletro".to_string()),
            region: None,
            voltage_kv: Some(230.0),
            geometry: None,
        };
        line.merge(&LineUpsert {
            code: "LT-01".to_string(),
            region: Some("Sul".to_string()),
            ..Default::default()
        });
        assert_eq!(line.name.as_deref(), Some("Linha Norte"));
        assert_eq!(line.region.as_deref(), Some("Sul"));
        assert_eq!(line.voltage_kv, Some(230.0));
    }

    #[test]
    fn test_scenario_type_round_trip_names() {
        assert_eq!(ScenarioType::parse("POS_MANEJO"), Some(ScenarioType::PosManejo));
        assert_eq!(ScenarioType::default().as_str(), "pre_manejo");
        assert_eq!(ScenarioStatus::parse("arquivado"), Some(ScenarioStatus::Arquivado));
        assert!(ScenarioType::parse("outro").is_none());
    }

    #[test]
    fn test_ids_parse_from_strings() {
        let id = LineId::new();
        let parsed: LineId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
