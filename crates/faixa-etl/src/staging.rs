//! Staging loader
//!
//! Parses every resolved file and inserts its raw rows and placemarks into
//! the staging areas of the caller's transaction. The loader never commits
//! or rolls back; the first parse or insert failure is returned as is.

use std::path::Path;

use faixa_core::formats::{read_csv, read_kml};
use faixa_core::models::{
    CsvTable, DatasetFiles, DatasetId, FileRole, KmlLayer, StageCounters, StagedFeature, StagedRow,
};
use faixa_core::Result;
use faixa_store::ImportTransaction;
use tracing::instrument;

/// Stage every resolved file of a dataset
#[instrument(skip(tx, files), fields(files = files.0.len()))]
pub async fn stage<T: ImportTransaction>(
    tx: &mut T,
    dataset_id: DatasetId,
    files: &DatasetFiles,
) -> Result<StageCounters> {
    let mut counters = StageCounters::default();

    if let Some(path) = files.get(FileRole::LineKml) {
        counters.line_features = stage_kml(tx, dataset_id, KmlLayer::Line, path).await?;
    }

    match (files.get(FileRole::StructureKml), files.get(FileRole::LineKml)) {
        (Some(path), _) => {
            counters.structure_features = stage_kml(tx, dataset_id, KmlLayer::Structure, path).await?;
        }
        // towers often ship inside the line file
        (None, Some(line_path)) => {
            counters.structure_features =
                stage_kml(tx, dataset_id, KmlLayer::Structure, line_path).await?;
        }
        (None, None) => {}
    }

    if let Some(path) = files.get(FileRole::TreatedKml) {
        counters.treated_features = stage_kml(tx, dataset_id, KmlLayer::Treated, path).await?;
    }

    if let Some(path) = files.get(FileRole::VegetationCsv) {
        counters.vegetation_rows = stage_csv(tx, dataset_id, CsvTable::Vegetation, path).await?;
    }

    if let Some(path) = files.get(FileRole::VegetationRiskCsv) {
        counters.vegetation_risk_rows =
            stage_csv(tx, dataset_id, CsvTable::VegetationRisk, path).await?;

        if !files.contains(FileRole::VegetationCsv) {
            counters.vegetation_rows = tx
                .copy_staged_rows(dataset_id, CsvTable::VegetationRisk, CsvTable::Vegetation)
                .await?;
        }
    }

    if let Some(path) = files.get(FileRole::LateralRiskCsv) {
        counters.lateral_risk_rows = stage_csv(tx, dataset_id, CsvTable::LateralRisk, path).await?;
    }

    if let Some(path) = files.get(FileRole::CrossingsCsv) {
        counters.crossing_rows = stage_csv(tx, dataset_id, CsvTable::Crossings, path).await?;
    }

    tracing::debug!(total = counters.total(), "Staging finished");
    Ok(counters)
}

/// Parse a KML file and stage the placemarks its layer accepts
async fn stage_kml<T: ImportTransaction>(
    tx: &mut T,
    dataset_id: DatasetId,
    layer: KmlLayer,
    path: &Path,
) -> Result<usize> {
    let document = read_kml(path)?;
    let parsed = document.features.len();

    let features: Vec<StagedFeature> = document
        .features
        .into_iter()
        .filter(|feature| layer.accepts(feature.geometry.as_ref()))
        .enumerate()
        .map(|(i, feature)| StagedFeature {
            order: i + 1,
            source_file: document.file.clone(),
            name: feature.name,
            properties: feature.properties,
            geometry: feature.geometry,
        })
        .collect();

    if features.len() < parsed {
        tracing::warn!(
            file = %document.file,
            layer = layer.table_name(),
            skipped = parsed - features.len(),
            "Placemarks skipped by the layer geometry filter"
        );
    }

    let staged = tx.stage_features(dataset_id, layer, &features).await?;
    tracing::debug!(file = %document.file, layer = layer.table_name(), staged, "Staged KML layer");
    Ok(staged)
}

/// Parse a CSV file and stage every data row
async fn stage_csv<T: ImportTransaction>(
    tx: &mut T,
    dataset_id: DatasetId,
    table: CsvTable,
    path: &Path,
) -> Result<usize> {
    let document = read_csv(path)?;

    let rows: Vec<StagedRow> = document
        .rows
        .into_iter()
        .map(|row| StagedRow {
            row_number: row.number,
            source_file: document.file.clone(),
            values: row.values,
        })
        .collect();

    let staged = tx.stage_rows(dataset_id, table, &rows).await?;
    tracing::debug!(file = %document.file, table = table.table_name(), staged, "Staged CSV table");
    Ok(staged)
}
