//! Import orchestrator
//!
//! The only layer that owns a transaction: resolves the dataset, then
//! inserts the dataset record, stages, normalizes and marks it completed in
//! one unit of work. Any failure rolls that unit back and records the failed
//! attempt in a separate transaction before the error is returned.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::NaiveDate;
use faixa_core::config::LayeredConfig;
use faixa_core::models::{
    DatasetFiles, DatasetId, DatasetRecord, DatasetStatus, DatasetUpdate, FileRole, LineUpsert,
    NormalizationSummary, ScenarioStatus, ScenarioType, StageCounters,
};
use faixa_core::{FaixaError, Result};
use faixa_store::{ImportStore, ImportTransaction, MemoryStore};
use serde::Serialize;
use tracing::instrument;

use crate::normalize::{normalize, CrossingLayer, NormalizeOptions};
use crate::resolver::{resolve_dataset_dir, resolve_files};
use crate::staging::stage;

/// What to import and how to label it
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub dataset_path: PathBuf,
    pub line_code: String,
    pub line_name: Option<String>,
    pub concessionaire: Option<String>,
    pub region: Option<String>,
    pub voltage_kv: Option<f64>,
    pub scenario_description: String,
    pub scenario_type: ScenarioType,
    pub scenario_status: ScenarioStatus,
    pub scenario_date: Option<NaiveDate>,
    pub created_by: String,
    /// Explicit files per role, relative to the dataset directory unless absolute
    pub file_overrides: BTreeMap<FileRole, PathBuf>,
    /// `(crossing type, GeoJSON file)` pairs intersected with the line
    pub crossing_layers: Vec<(String, PathBuf)>,
}

impl ImportOptions {
    pub fn new(
        dataset_path: impl Into<PathBuf>,
        line_code: impl Into<String>,
        scenario_description: impl Into<String>,
    ) -> Self {
        Self {
            dataset_path: dataset_path.into(),
            line_code: line_code.into(),
            line_name: None,
            concessionaire: None,
            region: None,
            voltage_kv: None,
            scenario_description: scenario_description.into(),
            scenario_type: ScenarioType::default(),
            scenario_status: ScenarioStatus::default(),
            scenario_date: None,
            created_by: "etl".to_string(),
            file_overrides: BTreeMap::new(),
            crossing_layers: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.line_code.trim().is_empty() {
            return Err(FaixaError::invalid_parameter("line_code", "cannot be empty"));
        }
        if self.scenario_description.trim().is_empty() {
            return Err(FaixaError::invalid_parameter("scenario_description", "cannot be empty"));
        }
        if let Some(kv) = self.voltage_kv {
            if !kv.is_finite() || kv <= 0.0 {
                return Err(FaixaError::invalid_parameter(
                    "voltage_kv",
                    format!("expected a positive number, got {}", kv),
                ));
            }
        }
        if let Some((kind, _)) = self.crossing_layers.iter().find(|(kind, _)| kind.trim().is_empty()) {
            return Err(FaixaError::invalid_parameter(
                "crossing_layers",
                format!("crossing layer without a type: {:?}", kind),
            ));
        }
        Ok(())
    }

    /// Normalization settings: these options plus the configured radius and aliases.
    /// Crossing layer files are read here.
    pub fn normalize_options(&self, config: &LayeredConfig) -> Result<NormalizeOptions> {
        let crossing_layers = self
            .crossing_layers
            .iter()
            .map(|(kind, path)| CrossingLayer::read(kind.trim(), path))
            .collect::<Result<Vec<_>>>()?;

        Ok(NormalizeOptions {
            line: LineUpsert {
                code: self.line_code.trim().to_string(),
                name: self.line_name.clone(),
                concessionaire: self.concessionaire.clone(),
                region: self.region.clone(),
                voltage_kv: self.voltage_kv,
                geometry: None,
            },
            scenario_description: self.scenario_description.trim().to_string(),
            scenario_type: self.scenario_type,
            scenario_status: self.scenario_status,
            scenario_date: self.scenario_date,
            clearance_m: config.clearance_m.value,
            aliases: config.aliases.value.clone(),
            crossing_layers,
        })
    }
}

/// Outcome of a successful import
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    #[serde(rename = "datasetId")]
    pub dataset_id: DatasetId,
    #[serde(rename = "stageCounters")]
    pub stage: StageCounters,
    #[serde(rename = "normalizationSummary")]
    pub normalize: NormalizationSummary,
}

/// Files and counters a dry run would stage
#[derive(Debug, Clone, Serialize)]
pub struct ImportPreview {
    pub files: DatasetFiles,
    #[serde(rename = "stageCounters")]
    pub stage: StageCounters,
}

/// Import a dataset directory as one atomic unit of work
#[instrument(
    skip(store, options, config),
    fields(path = %options.dataset_path.display(), line = %options.line_code)
)]
pub async fn run_import<S: ImportStore>(
    store: &S,
    options: &ImportOptions,
    config: &LayeredConfig,
) -> Result<ImportReport> {
    options.validate()?;
    let dir = resolve_dataset_dir(&options.dataset_path)?;
    let files = resolve_files(&dir, &options.file_overrides)?;

    let record = DatasetRecord::pending(
        options.line_code.trim(),
        options.scenario_description.trim(),
        dir,
        options.created_by.clone(),
        files,
    );
    tracing::info!(dataset_id = %record.id, files = record.files.0.len(), "Starting import");

    let mut tx = store.begin().await?;
    let outcome = match import_in(&mut tx, &record, options, config).await {
        Ok(result) => tx.commit().await.map(|_| result),
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(dataset_id = %record.id, "Rollback failed: {}", rollback_err);
            }
            Err(err)
        }
    };

    match outcome {
        Ok((stage, normalize)) => {
            tracing::info!(
                dataset_id = %record.id,
                staged = stage.total(),
                structures = normalize.structures_upserted,
                spans = normalize.spans_generated,
                vegetation_risks = normalize.vegetation_risks,
                "Import completed"
            );
            Ok(ImportReport { dataset_id: record.id, stage, normalize })
        }
        Err(err) => {
            record_failure(store, &record, &err).await;
            Err(err)
        }
    }
}

/// Everything that must land together
async fn import_in<T: ImportTransaction>(
    tx: &mut T,
    record: &DatasetRecord,
    options: &ImportOptions,
    config: &LayeredConfig,
) -> Result<(StageCounters, NormalizationSummary)> {
    tx.insert_dataset(record).await?;

    let counters = stage(tx, record.id, &record.files).await?;
    tx.update_dataset_status(
        record.id,
        DatasetStatus::Staged,
        &DatasetUpdate { stage: Some(counters), ..Default::default() },
    )
    .await?;

    let normalize_options = options.normalize_options(config)?;
    let summary = normalize(tx, record.id, &normalize_options).await?;

    tx.update_dataset_status(
        record.id,
        DatasetStatus::Completed,
        &DatasetUpdate { stage: Some(counters), normalize: Some(summary.clone()), error: None },
    )
    .await?;

    Ok((counters, summary))
}

/// Write the failed attempt in its own transaction. The original error is
/// what the caller sees, so a failure here is only logged.
async fn record_failure<S: ImportStore>(store: &S, record: &DatasetRecord, err: &FaixaError) {
    tracing::error!(dataset_id = %record.id, "Import failed: {}", err);

    let result = async {
        let mut tx = store.begin().await?;
        tx.insert_dataset(record).await?;
        tx.update_dataset_status(
            record.id,
            DatasetStatus::Failed,
            &DatasetUpdate { error: Some(err.to_string()), ..Default::default() },
        )
        .await?;
        tx.commit().await
    }
    .await;

    if let Err(record_err) = result {
        tracing::error!(dataset_id = %record.id, "Could not record the failed import: {}", record_err);
    }
}

/// Resolve and stage a dataset against a throwaway in-memory store
pub async fn preview_import(options: &ImportOptions) -> Result<ImportPreview> {
    options.validate()?;
    let dir = resolve_dataset_dir(&options.dataset_path)?;
    let files = resolve_files(&dir, &options.file_overrides)?;
    let record = DatasetRecord::pending(
        options.line_code.trim(),
        options.scenario_description.trim(),
        dir,
        options.created_by.clone(),
        files.clone(),
    );

    let store = MemoryStore::new();
    let mut tx = store.begin().await?;
    tx.insert_dataset(&record).await?;
    let counters = stage(&mut tx, record.id, &files).await?;
    tx.rollback().await?;

    Ok(ImportPreview { files, stage: counters })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_blank_identifiers() {
        let options = ImportOptions::new("/data", "  ", "Levantamento");
        assert!(matches!(options.validate(), Err(FaixaError::InvalidParameter { .. })));

        let options = ImportOptions::new("/data", "LT-01", "");
        assert!(matches!(options.validate(), Err(FaixaError::InvalidParameter { .. })));

        let mut options = ImportOptions::new("/data", "LT-01", "Levantamento");
        assert!(options.validate().is_ok());
        options.voltage_kv = Some(-230.0);
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_defaults() {
        let options = ImportOptions::new("/data", "LT-01", "Levantamento");
        assert_eq!(options.scenario_type, ScenarioType::PreManejo);
        assert_eq!(options.scenario_status, ScenarioStatus::Ativo);
        assert_eq!(options.created_by, "etl");
    }

    #[test]
    fn test_normalize_options_take_configured_clearance() {
        let mut config = LayeredConfig::with_defaults();
        config.clearance_m.value = 7.5;
        let mut options = ImportOptions::new("/data", " LT-01 ", "Levantamento");
        options.voltage_kv = Some(500.0);

        let normalize = options.normalize_options(&config).unwrap();
        assert_eq!(normalize.clearance_m, 7.5);
        assert_eq!(normalize.line.code, "LT-01");
        assert_eq!(normalize.line.voltage_kv, Some(500.0));
        assert!(normalize.line.geometry.is_none());
    }

    #[test]
    fn test_missing_crossing_layer_is_parse_error() {
        let mut options = ImportOptions::new("/data", "LT-01", "Levantamento");
        options.crossing_layers.push(("rodovia".to_string(), PathBuf::from("/nao/existe.geojson")));
        let err = options.normalize_options(&LayeredConfig::with_defaults()).unwrap_err();
        assert!(matches!(err, FaixaError::Parse { .. }));
    }
}
