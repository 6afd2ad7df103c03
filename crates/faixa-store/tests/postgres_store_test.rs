//! Tests against a live PostGIS database.
//!
//! Run with `DATABASE_URL=postgres://... cargo test -p faixa-store -- --ignored`.

use faixa_core::models::{
    CsvTable, DatasetFiles, DatasetRecord, DatasetStatus, DatasetUpdate, Geometry, LineUpsert,
    NewSpan, ScenarioStatus, ScenarioType, ScenarioUpsert, StagedRow, StructureUpsert,
};
use faixa_store::{ImportStore, ImportTransaction, PostgresConfig, PostgresStore, RiskReader};
use std::collections::BTreeMap;
use std::path::PathBuf;

async fn connect() -> PostgresStore {
    let config = PostgresConfig::from_env().expect("DATABASE_URL must be set");
    PostgresStore::new(config).await.expect("database must be reachable")
}

fn unique_code(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4().simple())
}

#[tokio::test]
#[ignore]
async fn test_migrations_applied() {
    let store = connect().await;
    assert!(!store.has_pending_migrations().await.unwrap());
}

#[tokio::test]
#[ignore]
async fn test_rollback_leaves_no_dataset() {
    let store = connect().await;
    let record = DatasetRecord::pending("LT-X", "rollback", PathBuf::from("/tmp"), "test", DatasetFiles::new());

    let mut tx = store.begin().await.unwrap();
    tx.insert_dataset(&record).await.unwrap();
    tx.stage_rows(
        record.id,
        CsvTable::Vegetation,
        &[StagedRow {
            row_number: 1,
            source_file: "vegetacao.csv".to_string(),
            values: BTreeMap::from([("tree_id".to_string(), "A1".to_string())]),
        }],
    )
    .await
    .unwrap();
    tx.rollback().await.unwrap();

    assert!(store.dataset(record.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn test_dataset_lifecycle_and_spans() {
    let store = connect().await;
    let code = unique_code("LT");
    let record = DatasetRecord::pending(&code, "cenario", PathBuf::from("/tmp"), "test", DatasetFiles::new());

    let mut tx = store.begin().await.unwrap();
    tx.insert_dataset(&record).await.unwrap();
    tx.update_dataset_status(record.id, DatasetStatus::Staged, &DatasetUpdate::default()).await.unwrap();

    let line = tx.upsert_line(&LineUpsert { code: code.clone(), ..Default::default() }).await.unwrap();
    let scenario = tx
        .upsert_scenario(&ScenarioUpsert {
            line_id: line.id,
            description: "cenario".to_string(),
            reference_date: None,
            scenario_type: ScenarioType::PreManejo,
            status: ScenarioStatus::Ativo,
        })
        .await
        .unwrap();

    let mut structures = Vec::new();
    for (i, name) in ["E1", "E2"].iter().enumerate() {
        structures.push(
            tx.upsert_structure(&StructureUpsert {
                line_id: line.id,
                code: name.to_string(),
                structure_type: None,
                circuits: None,
                height_m: None,
                longitude: -47.9 + i as f64 * 0.001,
                latitude: -15.8,
                stage_order: i + 1,
            })
            .await
            .unwrap(),
        );
    }

    let span = NewSpan {
        start_structure: structures[0].id,
        end_structure: structures[1].id,
        code: "E1 - E2".to_string(),
        start_code: "E1".to_string(),
        end_code: "E2".to_string(),
        length_m: 107.0,
        geometry: Geometry::line_string(vec![structures[0].position(), structures[1].position()]),
    };
    tx.replace_spans(line.id, scenario.id, &[span.clone()]).await.unwrap();
    tx.replace_spans(line.id, scenario.id, &[span]).await.unwrap();

    tx.update_dataset_status(record.id, DatasetStatus::Completed, &DatasetUpdate::default())
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let stored = store.dataset(record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DatasetStatus::Completed);

    let inputs = store.span_risk_inputs(line.id, scenario.id).await.unwrap();
    assert_eq!(inputs.len(), 1);
    assert_eq!(inputs[0].span_code, "E1 - E2");
    assert!(inputs[0].vegetation_classes.is_empty());
}
