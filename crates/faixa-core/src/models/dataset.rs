use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use super::network::{LineId, ScenarioId};

uuid_id!(
    /// Unique identifier for a dataset (one import attempt)
    DatasetId
);

/// Lifecycle of a dataset import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetStatus {
    Pending,
    Staged,
    Completed,
    Failed,
}

impl DatasetStatus {
    /// Whether moving from `self` to `next` is a forward transition.
    ///
    /// `pending -> staged -> completed`, and `pending | staged -> failed`.
    /// Terminal states never move.
    pub fn can_transition_to(&self, next: DatasetStatus) -> bool {
        matches!(
            (self, next),
            (DatasetStatus::Pending, DatasetStatus::Staged)
                | (DatasetStatus::Staged, DatasetStatus::Completed)
                | (DatasetStatus::Pending, DatasetStatus::Failed)
                | (DatasetStatus::Staged, DatasetStatus::Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DatasetStatus::Completed | DatasetStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetStatus::Pending => "pending",
            DatasetStatus::Staged => "staged",
            DatasetStatus::Completed => "completed",
            DatasetStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(DatasetStatus::Pending),
            "staged" => Some(DatasetStatus::Staged),
            "completed" => Some(DatasetStatus::Completed),
            "failed" => Some(DatasetStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for DatasetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic role of a file inside a dataset directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileRole {
    LineKml,
    StructureKml,
    TreatedKml,
    VegetationCsv,
    VegetationRiskCsv,
    LateralRiskCsv,
    CrossingsCsv,
}

impl FileRole {
    /// All roles in resolution order
    pub const ALL: [FileRole; 7] = [
        FileRole::LineKml,
        FileRole::StructureKml,
        FileRole::TreatedKml,
        FileRole::VegetationCsv,
        FileRole::VegetationRiskCsv,
        FileRole::LateralRiskCsv,
        FileRole::CrossingsCsv,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileRole::LineKml => "lineKml",
            FileRole::StructureKml => "structureKml",
            FileRole::TreatedKml => "treatedKml",
            FileRole::VegetationCsv => "vegetationCsv",
            FileRole::VegetationRiskCsv => "vegetationRiskCsv",
            FileRole::LateralRiskCsv => "lateralRiskCsv",
            FileRole::CrossingsCsv => "crossingsCsv",
        }
    }
}

impl fmt::Display for FileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved mapping from file role to absolute path. Absent roles are simply missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetFiles(pub BTreeMap<FileRole, PathBuf>);

impl DatasetFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, role: FileRole) -> Option<&Path> {
        self.0.get(&role).map(PathBuf::as_path)
    }

    pub fn insert(&mut self, role: FileRole, path: PathBuf) {
        self.0.insert(role, path);
    }

    pub fn contains(&self, role: FileRole) -> bool {
        self.0.contains_key(&role)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FileRole, &Path)> {
        self.0.iter().map(|(role, path)| (*role, path.as_path()))
    }
}

/// Rows staged per category for one dataset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageCounters {
    pub line_features: usize,
    pub structure_features: usize,
    pub treated_features: usize,
    pub vegetation_rows: usize,
    pub vegetation_risk_rows: usize,
    pub lateral_risk_rows: usize,
    pub crossing_rows: usize,
}

impl StageCounters {
    pub fn total(&self) -> usize {
        self.line_features
            + self.structure_features
            + self.treated_features
            + self.vegetation_rows
            + self.vegetation_risk_rows
            + self.lateral_risk_rows
            + self.crossing_rows
    }
}

/// Outcome of normalizing one dataset into the domain tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationSummary {
    #[serde(rename = "linhaId")]
    pub line_id: LineId,
    #[serde(rename = "cenarioId")]
    pub scenario_id: ScenarioId,
    #[serde(rename = "estruturasUpserted")]
    pub structures_upserted: usize,
    #[serde(rename = "vaosGerados")]
    pub spans_generated: usize,
    #[serde(rename = "arvoresUpsertadas")]
    pub trees_upserted: usize,
    #[serde(rename = "riscosVegetacao")]
    pub vegetation_risks: usize,
    #[serde(rename = "riscosQuedaLateral")]
    pub lateral_risks: usize,
    #[serde(rename = "cruzamentosRegistrados")]
    pub crossings_recorded: usize,
    #[serde(rename = "tratamentosRegistrados")]
    pub treatments_recorded: usize,
}

/// Persisted record of an import attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: DatasetId,

    /// "<line code> - <scenario description>"
    pub label: String,

    pub line_code: String,

    pub scenario_hint: String,

    pub source_path: PathBuf,

    pub created_by: String,

    pub files: DatasetFiles,

    pub status: DatasetStatus,

    pub stage: StageCounters,

    pub normalize: Option<NormalizationSummary>,

    pub error: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl DatasetRecord {
    /// Create a pending record for a new import
    pub fn pending(
        line_code: impl Into<String>,
        scenario_hint: impl Into<String>,
        source_path: PathBuf,
        created_by: impl Into<String>,
        files: DatasetFiles,
    ) -> Self {
        let line_code = line_code.into();
        let scenario_hint = scenario_hint.into();
        let now = Utc::now();
        Self {
            id: DatasetId::new(),
            label: format!("{} - {}", line_code, scenario_hint),
            line_code,
            scenario_hint,
            source_path,
            created_by: created_by.into(),
            files,
            status: DatasetStatus::Pending,
            stage: StageCounters::default(),
            normalize: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fields written when a dataset changes status
#[derive(Debug, Clone, Default)]
pub struct DatasetUpdate {
    pub stage: Option<StageCounters>,
    pub normalize: Option<NormalizationSummary>,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        assert!(DatasetStatus::Pending.can_transition_to(DatasetStatus::Staged));
        assert!(DatasetStatus::Staged.can_transition_to(DatasetStatus::Completed));
        assert!(DatasetStatus::Pending.can_transition_to(DatasetStatus::Failed));
        assert!(DatasetStatus::Staged.can_transition_to(DatasetStatus::Failed));
    }

    #[test]
    fn test_no_backward_or_terminal_transitions() {
        assert!(!DatasetStatus::Staged.can_transition_to(DatasetStatus::Pending));
        assert!(!DatasetStatus::Completed.can_transition_to(DatasetStatus::Failed));
        assert!(!DatasetStatus::Failed.can_transition_to(DatasetStatus::Completed));
        assert!(!DatasetStatus::Pending.can_transition_to(DatasetStatus::Completed));
    }

    #[test]
    fn test_stage_counters_serialize_camel_case() {
        let counters = StageCounters { line_features: 1, crossing_rows: 4, ..Default::default() };
        let json = serde_json::to_value(counters).unwrap();
        assert_eq!(json["lineFeatures"], 1);
        assert_eq!(json["crossingRows"], 4);
        assert_eq!(counters.total(), 5);
    }

    #[test]
    fn test_pending_record_label() {
        let record = DatasetRecord::pending(
            "LT-500",
            "Levantamento 2024",
            PathBuf::from("/data/lt500"),
            "etl",
            DatasetFiles::new(),
        );
        assert_eq!(record.label, "LT-500 - Levantamento 2024");
        assert_eq!(record.status, DatasetStatus::Pending);
        assert!(record.normalize.is_none());
    }
}
