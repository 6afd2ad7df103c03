//! Staging rules exercised through a memory transaction

use std::collections::BTreeMap;
use std::fs;

use faixa_core::models::{CsvTable, DatasetFiles, DatasetRecord, FileRole, KmlLayer};
use faixa_etl::{resolve_files, stage};
use faixa_store::{ImportStore, ImportTransaction, MemoryStore};
use tempfile::TempDir;

const MIXED_KML: &str = r#"<kml><Document>
    <Placemark><name>Eixo</name><LineString><coordinates>-47.0,-15.0 -47.01,-15.0</coordinates></LineString></Placemark>
    <Placemark><name>T1</name><Point><coordinates>-47.0,-15.0</coordinates></Point></Placemark>
    <Placemark><name>Area</name><Polygon><outerBoundaryIs><LinearRing><coordinates>
        -47.0,-15.0 -47.001,-15.0 -47.001,-15.001 -47.0,-15.0
    </coordinates></LinearRing></outerBoundaryIs></Polygon></Placemark>
</Document></kml>"#;

#[tokio::test]
async fn test_risk_rows_copied_into_vegetation_when_absent() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("clearance.csv"), "tree_id,classe_risco\nA1,alta\nA2,media\nA3,baixa\n").unwrap();

    let files = resolve_files(dir.path(), &BTreeMap::new()).unwrap();
    assert!(files.contains(FileRole::VegetationRiskCsv));
    assert!(!files.contains(FileRole::VegetationCsv));

    let store = MemoryStore::new();
    let mut tx = store.begin().await.unwrap();
    let record = DatasetRecord::pending("LT", "c", dir.path().to_path_buf(), "test", files.clone());
    tx.insert_dataset(&record).await.unwrap();

    let counters = stage(&mut tx, record.id, &files).await.unwrap();
    assert_eq!(counters.vegetation_risk_rows, 3);
    assert_eq!(counters.vegetation_rows, 3);

    let copied = tx.staged_rows(record.id, CsvTable::Vegetation).await.unwrap();
    assert_eq!(copied.len(), 3);
    assert_eq!(copied[0].row_number, 1);
    assert_eq!(copied[0].source_file, "clearance.csv");
    assert_eq!(copied[2].values["tree_id"], "A3");
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_layer_geometry_filters_and_order() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("levantamento.kml"), MIXED_KML).unwrap();
    let path = dir.path().join("levantamento.kml");

    let mut files = DatasetFiles::new();
    files.insert(FileRole::LineKml, path.clone());
    files.insert(FileRole::StructureKml, path.clone());
    files.insert(FileRole::TreatedKml, path);

    let store = MemoryStore::new();
    let mut tx = store.begin().await.unwrap();
    let record = DatasetRecord::pending("LT", "c", dir.path().to_path_buf(), "test", files.clone());
    tx.insert_dataset(&record).await.unwrap();

    let counters = stage(&mut tx, record.id, &files).await.unwrap();
    assert_eq!(counters.line_features, 1);
    assert_eq!(counters.structure_features, 1);
    assert_eq!(counters.treated_features, 3);
    assert_eq!(counters.total(), 5);

    let treated = tx.staged_features(record.id, KmlLayer::Treated).await.unwrap();
    let names: Vec<_> = treated.iter().map(|f| f.name.as_deref().unwrap()).collect();
    assert_eq!(names, vec!["Eixo", "T1", "Area"]);
    assert_eq!(treated[2].order, 3);

    let structures = tx.staged_features(record.id, KmlLayer::Structure).await.unwrap();
    assert_eq!(structures[0].order, 1);
    assert_eq!(structures[0].name.as_deref(), Some("T1"));
    tx.commit().await.unwrap();

    assert_eq!(store.staged_count(record.id), 5);
}

#[tokio::test]
async fn test_missing_file_aborts_staging() {
    let dir = TempDir::new().unwrap();
    let mut files = DatasetFiles::new();
    files.insert(FileRole::CrossingsCsv, dir.path().join("cruzamentos.csv"));

    let store = MemoryStore::new();
    let mut tx = store.begin().await.unwrap();
    let record = DatasetRecord::pending("LT", "c", dir.path().to_path_buf(), "test", files.clone());
    tx.insert_dataset(&record).await.unwrap();

    assert!(stage(&mut tx, record.id, &files).await.is_err());
    tx.rollback().await.unwrap();
    assert!(store.datasets().is_empty());
}

#[tokio::test]
async fn test_staged_row_numbers_skip_blank_lines() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cruzamentos.csv");
    fs::write(&path, "tipo,descricao\nrodovia,BR-040\n\nduto,tubo 5\" aco\n").unwrap();
    let mut files = DatasetFiles::new();
    files.insert(FileRole::CrossingsCsv, path);

    let store = MemoryStore::new();
    let mut tx = store.begin().await.unwrap();
    let record = DatasetRecord::pending("LT", "c", dir.path().to_path_buf(), "test", files.clone());
    tx.insert_dataset(&record).await.unwrap();

    let counters = stage(&mut tx, record.id, &files).await.unwrap();
    assert_eq!(counters.crossing_rows, 2);

    let rows = tx.staged_rows(record.id, CsvTable::Crossings).await.unwrap();
    let numbers: Vec<usize> = rows.iter().map(|r| r.row_number).collect();
    assert_eq!(numbers, vec![1, 3]);
    assert_eq!(rows[1].values["descricao"], "tubo 5\" aco");
    tx.rollback().await.unwrap();
}
