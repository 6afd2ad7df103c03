use faixa_core::config::ConfigSource;
use faixa_core::models::DatasetFiles;
use faixa_etl::{ImportPreview, ImportReport, SimulationReport};
use serde::Serialize;
use std::collections::BTreeMap;

/// Output for import command
#[derive(Debug, Serialize)]
pub struct ImportOutput {
    #[serde(flatten)]
    pub report: ImportReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulation: Option<SimulationReport>,
}

/// Output for import --dry-run
#[derive(Debug, Serialize)]
pub struct DryRunOutput {
    pub dry_run: bool,
    #[serde(flatten)]
    pub preview: ImportPreview,
}

/// Output for resolve command
#[derive(Debug, Serialize)]
pub struct ResolveOutput {
    pub directory: String,
    pub files: DatasetFiles,
    /// Roles with no matching file
    pub missing: Vec<String>,
}

/// Output for config command
pub type ConfigOutput = BTreeMap<String, ConfigEntry>;

#[derive(Debug, Serialize)]
pub struct ConfigEntry {
    pub value: String,
    pub source: ConfigSource,
}
