use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use faixa_core::models::{FileRole, LineId, ScenarioId, ScenarioStatus, ScenarioType, SpanId};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Faixa - transmission corridor survey ingestion and spatial risk
#[derive(Parser, Debug)]
#[command(name = "faixa")]
#[command(about = "Transmission corridor survey ingestion and spatial-risk analysis", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Output results in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Storage backend to use (memory or postgres)
    #[arg(long, global = true, default_value = "memory")]
    pub storage: StorageBackend,

    /// Configuration file (defaults to ./faixa.toml when present)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StorageBackend {
    /// In-memory storage, discarded when the process exits
    Memory,
    /// PostgreSQL/PostGIS persistent storage
    Postgres,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import a survey dataset directory
    Import(ImportArgs),

    /// Show which file fills each role in a dataset directory
    Resolve(ResolveArgs),

    /// Run a standalone spatial analysis over a JSON payload
    Analyze(AnalyzeArgs),

    /// Simulate treating spans of an imported scenario
    Simulate(SimulateArgs),

    /// Show the layered configuration and where each value comes from
    Config,
}

/// Explicit files per role, relative to the dataset directory unless absolute
#[derive(Args, Debug, Default, Clone)]
pub struct FileOverrideArgs {
    #[arg(long, value_name = "PATH")]
    pub file_line_kml: Option<PathBuf>,

    #[arg(long, value_name = "PATH")]
    pub file_structure_kml: Option<PathBuf>,

    #[arg(long, value_name = "PATH")]
    pub file_treated_kml: Option<PathBuf>,

    #[arg(long, value_name = "PATH")]
    pub file_vegetation_csv: Option<PathBuf>,

    #[arg(long, value_name = "PATH")]
    pub file_vegetation_risk_csv: Option<PathBuf>,

    #[arg(long, value_name = "PATH")]
    pub file_lateral_risk_csv: Option<PathBuf>,

    #[arg(long, value_name = "PATH")]
    pub file_crossings_csv: Option<PathBuf>,
}

impl FileOverrideArgs {
    pub fn overrides(&self) -> BTreeMap<FileRole, PathBuf> {
        [
            (FileRole::LineKml, &self.file_line_kml),
            (FileRole::StructureKml, &self.file_structure_kml),
            (FileRole::TreatedKml, &self.file_treated_kml),
            (FileRole::VegetationCsv, &self.file_vegetation_csv),
            (FileRole::VegetationRiskCsv, &self.file_vegetation_risk_csv),
            (FileRole::LateralRiskCsv, &self.file_lateral_risk_csv),
            (FileRole::CrossingsCsv, &self.file_crossings_csv),
        ]
        .into_iter()
        .filter_map(|(role, path)| path.clone().map(|p| (role, p)))
        .collect()
    }
}

#[derive(Parser, Debug)]
pub struct ImportArgs {
    /// Dataset directory holding the survey KML and CSV files
    pub path: PathBuf,

    /// Line code (natural key of the transmission line)
    #[arg(long)]
    pub line_code: String,

    /// Scenario description (natural key of the scenario within the line)
    #[arg(long = "scenario", value_name = "DESCRIPTION")]
    pub scenario: String,

    #[arg(long)]
    pub line_name: Option<String>,

    #[arg(long)]
    pub concessionaire: Option<String>,

    #[arg(long)]
    pub region: Option<String>,

    /// Nominal voltage in kV
    #[arg(long)]
    pub voltage_kv: Option<f64>,

    /// Scenario type (pre_manejo, pos_manejo, simulado)
    #[arg(long, default_value = "pre_manejo", value_parser = parse_scenario_type)]
    pub scenario_type: ScenarioType,

    /// Scenario status (ativo, arquivado)
    #[arg(long, default_value = "ativo", value_parser = parse_scenario_status)]
    pub scenario_status: ScenarioStatus,

    /// Reference date of the survey (YYYY-MM-DD)
    #[arg(long)]
    pub scenario_date: Option<NaiveDate>,

    #[arg(long, default_value = "etl")]
    pub created_by: String,

    #[command(flatten)]
    pub files: FileOverrideArgs,

    /// GeoJSON layer intersected with the line, as KIND=PATH (repeatable)
    #[arg(long = "crossing-layer", value_name = "KIND=PATH", value_parser = parse_crossing_layer)]
    pub crossing_layers: Vec<(String, PathBuf)>,

    /// Radius in meters for computed vegetation risk
    #[arg(long)]
    pub clearance_m: Option<f64>,

    /// Resolve and parse the files, print what would be staged, touch no storage
    #[arg(long)]
    pub dry_run: bool,

    /// Simulate treating the N riskiest spans right after the import
    #[arg(long, value_name = "N")]
    pub simulate_top_n: Option<usize>,
}

#[derive(Parser, Debug)]
pub struct ResolveArgs {
    /// Dataset directory
    pub path: PathBuf,

    #[command(flatten)]
    pub files: FileOverrideArgs,
}

#[derive(Parser, Debug)]
pub struct AnalyzeArgs {
    #[command(subcommand)]
    pub command: AnalyzeCommand,
}

#[derive(Subcommand, Debug)]
pub enum AnalyzeCommand {
    /// Crossings of and proximity to transmission and MT lines
    Crossings(CrossingsArgs),

    /// Structure counts within radii of flooded areas
    Flood(FloodArgs),
}

#[derive(Parser, Debug)]
pub struct CrossingsArgs {
    /// JSON payload with `travessias`, `linhas_transmissao` and `circuitos_mt`
    pub payload: PathBuf,

    /// Proximity buffer in meters, replacing the payload's `buffer_m`
    #[arg(long)]
    pub buffer_m: Option<f64>,
}

#[derive(Parser, Debug)]
pub struct FloodArgs {
    /// JSON payload with `areas_alagadas`, `estruturas` and optional `raios`
    pub payload: PathBuf,

    /// Radii in meters, replacing the payload's `raios` (e.g. 100,250,500)
    #[arg(long, value_delimiter = ',')]
    pub radii: Vec<f64>,

    /// Structure attribute marking anti-landing protection
    #[arg(long)]
    pub attribute: Option<String>,
}

#[derive(Parser, Debug)]
pub struct SimulateArgs {
    #[arg(long)]
    pub line_id: LineId,

    #[arg(long)]
    pub scenario_id: ScenarioId,

    /// Span to treat (repeatable); takes precedence over --top-n
    #[arg(long = "span-id")]
    pub span_ids: Vec<SpanId>,

    /// Treat the N riskiest spans
    #[arg(long)]
    pub top_n: Option<usize>,
}

fn parse_scenario_type(value: &str) -> Result<ScenarioType, String> {
    ScenarioType::parse(value)
        .ok_or_else(|| format!("unknown scenario type '{}' (pre_manejo, pos_manejo, simulado)", value))
}

fn parse_scenario_status(value: &str) -> Result<ScenarioStatus, String> {
    ScenarioStatus::parse(value).ok_or_else(|| format!("unknown scenario status '{}' (ativo, arquivado)", value))
}

fn parse_crossing_layer(value: &str) -> Result<(String, PathBuf), String> {
    match value.split_once('=') {
        Some((kind, path)) if !kind.trim().is_empty() && !path.trim().is_empty() => {
            Ok((kind.trim().to_string(), PathBuf::from(path.trim())))
        }
        _ => Err(format!("expected KIND=PATH, got '{}'", value)),
    }
}
