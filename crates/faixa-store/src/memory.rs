//! In-memory storage implementation for development and testing.
//!
//! This implementation uses `RwLock::unwrap()` intentionally. Lock poisoning
//! only occurs when another thread panicked while holding the lock, which is
//! an unrecoverable state. For production workloads, use the PostgreSQL backend.
//!
//! A transaction works on a snapshot taken at `begin` and journals the keys it
//! writes. `commit` copies only those keys onto the live state, so transactions
//! on different datasets and lines merge. A commit fails with a conflict when
//! another transaction committed a different record under a natural key this
//! one created.

use async_trait::async_trait;
use faixa_core::error::{FaixaError, Result};
use faixa_core::models::{
    Crossing, CsvTable, DatasetId, DatasetRecord, DatasetStatus, DatasetUpdate, KmlLayer,
    LateralRisk, Line, LineId, LineUpsert, NewSpan, Scenario, ScenarioId, ScenarioUpsert, Span,
    SpanId, SpanRiskInputs, StagedFeature, StagedRow, Structure, StructureId, StructureUpsert,
    Treatment, Tree, TreeId, TreeUpsert, VegetationRisk,
};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use crate::ports::{ImportStore, ImportTransaction, RiskReader};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    datasets: HashMap<DatasetId, DatasetRecord>,
    staged_features: HashMap<(DatasetId, KmlLayer), Vec<StagedFeature>>,
    staged_rows: HashMap<(DatasetId, CsvTable), Vec<StagedRow>>,
    lines: HashMap<String, Line>,
    scenarios: HashMap<(LineId, String), Scenario>,
    structures: HashMap<(LineId, String), Structure>,
    spans: Vec<Span>,
    trees: HashMap<(LineId, String), Tree>,
    vegetation_risks: Vec<VegetationRisk>,
    lateral_risks: Vec<LateralRisk>,
    crossings: Vec<Crossing>,
    treatments: Vec<Treatment>,
}

impl MemoryState {
    fn detach_spans(&mut self, removed: &HashSet<SpanId>) {
        if removed.is_empty() {
            return;
        }
        let detach = |span_id: &mut Option<SpanId>| {
            if span_id.is_some_and(|id| removed.contains(&id)) {
                *span_id = None;
            }
        };
        self.trees.values_mut().for_each(|t| detach(&mut t.span_id));
        self.vegetation_risks.iter_mut().for_each(|r| detach(&mut r.span_id));
        self.lateral_risks.iter_mut().for_each(|r| detach(&mut r.span_id));
        self.crossings.iter_mut().for_each(|c| detach(&mut c.span_id));
        self.treatments.iter_mut().for_each(|t| detach(&mut t.span_id));
    }
}

/// Key written by a transaction, replayed onto the live state at commit
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Written {
    Dataset(DatasetId),
    StagedFeatures(DatasetId, KmlLayer),
    StagedRows(DatasetId, CsvTable),
    Line(String),
    Scenario(LineId, String),
    Structure(LineId, String),
    Tree(LineId, String),
    Spans(ScenarioId),
    VegetationRisks(ScenarioId),
    LateralRisks(ScenarioId),
    Crossings(ScenarioId),
    Treatments(ScenarioId),
}

fn copy_entry<K: Hash + Eq + Clone, V: Clone>(from: &HashMap<K, V>, to: &mut HashMap<K, V>, key: &K) {
    match from.get(key) {
        Some(value) => {
            to.insert(key.clone(), value.clone());
        }
        None => {
            to.remove(key);
        }
    }
}

fn copy_scenario_rows<T: Clone>(
    from: &[T],
    to: &mut Vec<T>,
    scenario_id: ScenarioId,
    scenario_of: impl Fn(&T) -> ScenarioId,
) {
    to.retain(|row| scenario_of(row) != scenario_id);
    to.extend(from.iter().filter(|row| scenario_of(row) == scenario_id).cloned());
}

/// True when both sides hold a record under `key` with different identities
fn diverged<K: Hash + Eq, V, I: PartialEq>(
    working: &HashMap<K, V>,
    live: &HashMap<K, V>,
    key: &K,
    id_of: impl Fn(&V) -> I,
) -> bool {
    matches!((working.get(key), live.get(key)), (Some(a), Some(b)) if id_of(a) != id_of(b))
}

/// In-memory implementation of the storage ports
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// All dataset records, oldest first
    pub fn datasets(&self) -> Vec<DatasetRecord> {
        let state = self.state.read().unwrap();
        let mut datasets: Vec<DatasetRecord> = state.datasets.values().cloned().collect();
        datasets.sort_by_key(|d| d.created_at);
        datasets
    }

    /// All lines, by code
    pub fn lines(&self) -> Vec<Line> {
        let state = self.state.read().unwrap();
        let mut lines: Vec<Line> = state.lines.values().cloned().collect();
        lines.sort_by(|a, b| a.code.cmp(&b.code));
        lines
    }

    /// Scenarios of a line, by description
    pub fn scenarios(&self, line_id: LineId) -> Vec<Scenario> {
        let state = self.state.read().unwrap();
        let mut scenarios: Vec<Scenario> =
            state.scenarios.values().filter(|s| s.line_id == line_id).cloned().collect();
        scenarios.sort_by(|a, b| a.description.cmp(&b.description));
        scenarios
    }

    /// Structures of a line in line order
    pub fn structures(&self, line_id: LineId) -> Vec<Structure> {
        let state = self.state.read().unwrap();
        let mut structures: Vec<Structure> =
            state.structures.values().filter(|s| s.line_id == line_id).cloned().collect();
        structures.sort_by(|a, b| a.stage_order.cmp(&b.stage_order).then_with(|| a.code.cmp(&b.code)));
        structures
    }

    /// Spans of a scenario in line order
    pub fn spans(&self, scenario_id: ScenarioId) -> Vec<Span> {
        let state = self.state.read().unwrap();
        state.spans.iter().filter(|s| s.scenario_id == scenario_id).cloned().collect()
    }

    /// Trees of a line, by code
    pub fn trees(&self, line_id: LineId) -> Vec<Tree> {
        let state = self.state.read().unwrap();
        let mut trees: Vec<Tree> =
            state.trees.values().filter(|t| t.line_id == line_id).cloned().collect();
        trees.sort_by(|a, b| a.code.cmp(&b.code));
        trees
    }

    pub fn vegetation_risks(&self, scenario_id: ScenarioId) -> Vec<VegetationRisk> {
        let state = self.state.read().unwrap();
        state.vegetation_risks.iter().filter(|r| r.scenario_id == scenario_id).cloned().collect()
    }

    pub fn lateral_risks(&self, scenario_id: ScenarioId) -> Vec<LateralRisk> {
        let state = self.state.read().unwrap();
        state.lateral_risks.iter().filter(|r| r.scenario_id == scenario_id).cloned().collect()
    }

    pub fn crossings(&self, scenario_id: ScenarioId) -> Vec<Crossing> {
        let state = self.state.read().unwrap();
        state.crossings.iter().filter(|c| c.scenario_id == scenario_id).cloned().collect()
    }

    pub fn treatments(&self, scenario_id: ScenarioId) -> Vec<Treatment> {
        let state = self.state.read().unwrap();
        state.treatments.iter().filter(|t| t.scenario_id == scenario_id).cloned().collect()
    }

    /// Number of staged rows and features held for a dataset
    pub fn staged_count(&self, dataset_id: DatasetId) -> usize {
        let state = self.state.read().unwrap();
        let features: usize = state
            .staged_features
            .iter()
            .filter(|((id, _), _)| *id == dataset_id)
            .map(|(_, v)| v.len())
            .sum();
        let rows: usize = state
            .staged_rows
            .iter()
            .filter(|((id, _), _)| *id == dataset_id)
            .map(|(_, v)| v.len())
            .sum();
        features + rows
    }
}

#[async_trait]
impl ImportStore for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx> {
        Ok(MemoryTransaction {
            working: self.state.read().unwrap().clone(),
            written: HashSet::new(),
            store: self.clone(),
        })
    }
}

/// Transaction for MemoryStore, working on a private copy of the state
pub struct MemoryTransaction {
    working: MemoryState,
    written: HashSet<Written>,
    store: MemoryStore,
}

impl MemoryTransaction {
    fn conflict(&self, live: &MemoryState) -> Option<String> {
        let working = &self.working;
        self.written.iter().find_map(|key| {
            let clash = match key {
                Written::Line(code) => diverged(&working.lines, &live.lines, code, |l| l.id),
                Written::Scenario(line_id, description) => {
                    let key = (*line_id, description.clone());
                    diverged(&working.scenarios, &live.scenarios, &key, |s| s.id)
                }
                Written::Structure(line_id, code) => {
                    let key = (*line_id, code.clone());
                    diverged(&working.structures, &live.structures, &key, |s| s.id)
                }
                Written::Tree(line_id, code) => {
                    let key = (*line_id, code.clone());
                    diverged(&working.trees, &live.trees, &key, |t| t.id)
                }
                _ => false,
            };
            clash.then(|| format!("{:?} was created by a concurrent transaction", key))
        })
    }

    /// Copy every written key onto `live`; spans go first so their detach runs
    /// before trees and risk rows are copied over
    fn replay(&self, live: &mut MemoryState) {
        let working = &self.working;
        for key in &self.written {
            if let Written::Spans(scenario_id) = key {
                let kept: HashSet<SpanId> = working
                    .spans
                    .iter()
                    .filter(|s| s.scenario_id == *scenario_id)
                    .map(|s| s.id)
                    .collect();
                let removed: HashSet<SpanId> = live
                    .spans
                    .iter()
                    .filter(|s| s.scenario_id == *scenario_id && !kept.contains(&s.id))
                    .map(|s| s.id)
                    .collect();
                copy_scenario_rows(&working.spans, &mut live.spans, *scenario_id, |s| s.scenario_id);
                live.detach_spans(&removed);
            }
        }

        for key in &self.written {
            match key {
                Written::Dataset(id) => copy_entry(&working.datasets, &mut live.datasets, id),
                Written::StagedFeatures(id, layer) => {
                    copy_entry(&working.staged_features, &mut live.staged_features, &(*id, *layer))
                }
                Written::StagedRows(id, table) => {
                    copy_entry(&working.staged_rows, &mut live.staged_rows, &(*id, *table))
                }
                Written::Line(code) => copy_entry(&working.lines, &mut live.lines, code),
                Written::Scenario(line_id, description) => copy_entry(
                    &working.scenarios,
                    &mut live.scenarios,
                    &(*line_id, description.clone()),
                ),
                Written::Structure(line_id, code) => copy_entry(
                    &working.structures,
                    &mut live.structures,
                    &(*line_id, code.clone()),
                ),
                Written::Tree(line_id, code) => {
                    copy_entry(&working.trees, &mut live.trees, &(*line_id, code.clone()))
                }
                Written::Spans(_) => {}
                Written::VegetationRisks(id) => copy_scenario_rows(
                    &working.vegetation_risks,
                    &mut live.vegetation_risks,
                    *id,
                    |r| r.scenario_id,
                ),
                Written::LateralRisks(id) => {
                    copy_scenario_rows(&working.lateral_risks, &mut live.lateral_risks, *id, |r| r.scenario_id)
                }
                Written::Crossings(id) => {
                    copy_scenario_rows(&working.crossings, &mut live.crossings, *id, |c| c.scenario_id)
                }
                Written::Treatments(id) => {
                    copy_scenario_rows(&working.treatments, &mut live.treatments, *id, |t| t.scenario_id)
                }
            }
        }
    }

    fn apply(self) -> Result<()> {
        let mut live = self.store.state.write().unwrap();
        if let Some(reason) = self.conflict(&live) {
            return Err(FaixaError::persistence("commit", reason));
        }
        self.replay(&mut live);
        Ok(())
    }

    fn structure_on_line(&self, id: StructureId, line_id: LineId) -> bool {
        self.working.structures.values().any(|s| s.id == id && s.line_id == line_id)
    }
}

#[async_trait]
impl ImportTransaction for MemoryTransaction {
    async fn insert_dataset(&mut self, record: &DatasetRecord) -> Result<()> {
        if self.working.datasets.contains_key(&record.id) {
            return Err(FaixaError::persistence(
                "insert dataset",
                format!("dataset {} already exists", record.id),
            ));
        }
        self.working.datasets.insert(record.id, record.clone());
        self.written.insert(Written::Dataset(record.id));
        Ok(())
    }

    async fn update_dataset_status(
        &mut self,
        id: DatasetId,
        status: DatasetStatus,
        update: &DatasetUpdate,
    ) -> Result<()> {
        let record = self
            .working
            .datasets
            .get_mut(&id)
            .ok_or_else(|| FaixaError::persistence("update dataset", format!("dataset {} not found", id)))?;

        if !record.status.can_transition_to(status) {
            return Err(FaixaError::persistence(
                "update dataset",
                format!("cannot move dataset {} from {} to {}", id, record.status, status),
            ));
        }

        record.status = status;
        if let Some(stage) = update.stage {
            record.stage = stage;
        }
        if let Some(summary) = &update.normalize {
            record.normalize = Some(summary.clone());
        }
        if let Some(error) = &update.error {
            record.error = Some(error.clone());
        }
        record.updated_at = chrono::Utc::now();
        self.written.insert(Written::Dataset(id));
        Ok(())
    }

    async fn stage_features(
        &mut self,
        dataset_id: DatasetId,
        layer: KmlLayer,
        features: &[StagedFeature],
    ) -> Result<usize> {
        self.working.staged_features.entry((dataset_id, layer)).or_default().extend_from_slice(features);
        self.written.insert(Written::StagedFeatures(dataset_id, layer));
        Ok(features.len())
    }

    async fn stage_rows(
        &mut self,
        dataset_id: DatasetId,
        table: CsvTable,
        rows: &[StagedRow],
    ) -> Result<usize> {
        self.working.staged_rows.entry((dataset_id, table)).or_default().extend_from_slice(rows);
        self.written.insert(Written::StagedRows(dataset_id, table));
        Ok(rows.len())
    }

    async fn copy_staged_rows(
        &mut self,
        dataset_id: DatasetId,
        from: CsvTable,
        to: CsvTable,
    ) -> Result<usize> {
        let rows = self.working.staged_rows.get(&(dataset_id, from)).cloned().unwrap_or_default();
        let copied = rows.len();
        self.working.staged_rows.entry((dataset_id, to)).or_default().extend(rows);
        self.written.insert(Written::StagedRows(dataset_id, to));
        Ok(copied)
    }

    async fn staged_features(
        &mut self,
        dataset_id: DatasetId,
        layer: KmlLayer,
    ) -> Result<Vec<StagedFeature>> {
        let mut features =
            self.working.staged_features.get(&(dataset_id, layer)).cloned().unwrap_or_default();
        features.sort_by_key(|f| f.order);
        Ok(features)
    }

    async fn staged_rows(
        &mut self,
        dataset_id: DatasetId,
        table: CsvTable,
    ) -> Result<Vec<StagedRow>> {
        let mut rows = self.working.staged_rows.get(&(dataset_id, table)).cloned().unwrap_or_default();
        rows.sort_by_key(|r| r.row_number);
        Ok(rows)
    }

    async fn upsert_line(&mut self, upsert: &LineUpsert) -> Result<Line> {
        let line = self.working.lines.entry(upsert.code.clone()).or_insert_with(|| Line {
            id: LineId::new(),
            code: upsert.code.clone(),
            name: None,
            concessionaire: None,
            region: None,
            voltage_kv: None,
            geometry: None,
        });
        line.merge(upsert);
        let line = line.clone();
        self.written.insert(Written::Line(line.code.clone()));
        Ok(line)
    }

    async fn upsert_scenario(&mut self, upsert: &ScenarioUpsert) -> Result<Scenario> {
        let scenario = self
            .working
            .scenarios
            .entry((upsert.line_id, upsert.description.clone()))
            .or_insert_with(|| Scenario {
                id: ScenarioId::new(),
                line_id: upsert.line_id,
                description: upsert.description.clone(),
                reference_date: None,
                scenario_type: upsert.scenario_type,
                status: upsert.status,
            });
        scenario.scenario_type = upsert.scenario_type;
        scenario.status = upsert.status;
        if upsert.reference_date.is_some() {
            scenario.reference_date = upsert.reference_date;
        }
        let scenario = scenario.clone();
        self.written.insert(Written::Scenario(scenario.line_id, scenario.description.clone()));
        Ok(scenario)
    }

    async fn upsert_structure(&mut self, upsert: &StructureUpsert) -> Result<Structure> {
        let structure = self
            .working
            .structures
            .entry((upsert.line_id, upsert.code.clone()))
            .or_insert_with(|| Structure {
                id: StructureId::new(),
                line_id: upsert.line_id,
                code: upsert.code.clone(),
                structure_type: None,
                circuits: None,
                height_m: None,
                longitude: upsert.longitude,
                latitude: upsert.latitude,
                stage_order: upsert.stage_order,
            });
        structure.merge(upsert);
        let structure = structure.clone();
        self.written.insert(Written::Structure(structure.line_id, structure.code.clone()));
        Ok(structure)
    }

    async fn replace_spans(
        &mut self,
        line_id: LineId,
        scenario_id: ScenarioId,
        spans: &[NewSpan],
    ) -> Result<Vec<Span>> {
        let mut codes = HashSet::new();
        for span in spans {
            if !self.structure_on_line(span.start_structure, line_id)
                || !self.structure_on_line(span.end_structure, line_id)
            {
                return Err(FaixaError::persistence(
                    "insert span",
                    format!("span {} references a structure outside line {}", span.code, line_id),
                ));
            }
            if !codes.insert(span.code.as_str()) {
                return Err(FaixaError::persistence(
                    "insert span",
                    format!("duplicate span code {} in scenario {}", span.code, scenario_id),
                ));
            }
        }

        let removed: HashSet<SpanId> = self
            .working
            .spans
            .iter()
            .filter(|s| s.scenario_id == scenario_id)
            .map(|s| s.id)
            .collect();
        self.working.spans.retain(|s| s.scenario_id != scenario_id);
        self.working.detach_spans(&removed);

        let inserted: Vec<Span> = spans
            .iter()
            .map(|span| Span {
                id: SpanId::new(),
                line_id,
                scenario_id,
                start_structure: span.start_structure,
                end_structure: span.end_structure,
                code: span.code.clone(),
                start_code: span.start_code.clone(),
                end_code: span.end_code.clone(),
                length_m: span.length_m,
                geometry: span.geometry.clone(),
            })
            .collect();
        self.working.spans.extend(inserted.iter().cloned());
        self.written.insert(Written::Spans(scenario_id));
        Ok(inserted)
    }

    async fn upsert_tree(&mut self, upsert: &TreeUpsert) -> Result<Tree> {
        let tree = self
            .working
            .trees
            .entry((upsert.line_id, upsert.code.clone()))
            .or_insert_with(|| Tree {
                id: TreeId::new(),
                line_id: upsert.line_id,
                span_id: None,
                code: upsert.code.clone(),
                geometry: None,
                height_m: None,
                vegetation_type: None,
                riparian: None,
            });
        tree.merge(upsert);
        let tree = tree.clone();
        self.written.insert(Written::Tree(tree.line_id, tree.code.clone()));
        Ok(tree)
    }

    async fn replace_vegetation_risks(
        &mut self,
        scenario_id: ScenarioId,
        risks: &[VegetationRisk],
    ) -> Result<usize> {
        self.working.vegetation_risks.retain(|r| r.scenario_id != scenario_id);
        self.working.vegetation_risks.extend(risks.iter().cloned());
        self.written.insert(Written::VegetationRisks(scenario_id));
        Ok(risks.len())
    }

    async fn replace_lateral_risks(
        &mut self,
        scenario_id: ScenarioId,
        risks: &[LateralRisk],
    ) -> Result<usize> {
        self.working.lateral_risks.retain(|r| r.scenario_id != scenario_id);
        self.working.lateral_risks.extend(risks.iter().cloned());
        self.written.insert(Written::LateralRisks(scenario_id));
        Ok(risks.len())
    }

    async fn replace_crossings(
        &mut self,
        scenario_id: ScenarioId,
        crossings: &[Crossing],
    ) -> Result<usize> {
        self.working.crossings.retain(|c| c.scenario_id != scenario_id);
        self.working.crossings.extend(crossings.iter().cloned());
        self.written.insert(Written::Crossings(scenario_id));
        Ok(crossings.len())
    }

    async fn replace_treatments(
        &mut self,
        scenario_id: ScenarioId,
        treatments: &[Treatment],
    ) -> Result<usize> {
        self.working.treatments.retain(|t| t.scenario_id != scenario_id);
        self.working.treatments.extend(treatments.iter().cloned());
        self.written.insert(Written::Treatments(scenario_id));
        Ok(treatments.len())
    }

    async fn commit(self) -> Result<()> {
        self.apply()
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl RiskReader for MemoryStore {
    async fn dataset(&self, id: DatasetId) -> Result<Option<DatasetRecord>> {
        let state = self.state.read().unwrap();
        Ok(state.datasets.get(&id).cloned())
    }

    async fn span_risk_inputs(
        &self,
        line_id: LineId,
        scenario_id: ScenarioId,
    ) -> Result<Vec<SpanRiskInputs>> {
        let state = self.state.read().unwrap();
        Ok(state
            .spans
            .iter()
            .filter(|s| s.line_id == line_id && s.scenario_id == scenario_id)
            .map(|span| SpanRiskInputs {
                span_id: span.id,
                span_code: span.code.clone(),
                vegetation_classes: state
                    .vegetation_risks
                    .iter()
                    .filter(|r| r.scenario_id == scenario_id && r.span_id == Some(span.id))
                    .map(|r| r.severity().map(str::to_string))
                    .collect(),
                lateral_risks: state
                    .lateral_risks
                    .iter()
                    .filter(|r| r.scenario_id == scenario_id && r.span_id == Some(span.id))
                    .count(),
                crossing_classes: state
                    .crossings
                    .iter()
                    .filter(|c| c.scenario_id == scenario_id && c.span_id == Some(span.id))
                    .map(|c| c.risk_class.clone())
                    .collect(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faixa_core::models::{DatasetFiles, Geometry, RiskSource, ScenarioStatus, ScenarioType};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn pending_record() -> DatasetRecord {
        DatasetRecord::pending("LT-01", "Levantamento 2024", PathBuf::from("/dados"), "etl", DatasetFiles::new())
    }

    fn row(n: usize) -> StagedRow {
        StagedRow {
            row_number: n,
            source_file: "vegetacao.csv".to_string(),
            values: BTreeMap::from([("tree_id".to_string(), format!("A{}", n))]),
        }
    }

    async fn line_with_structures(tx: &mut MemoryTransaction) -> (Line, Scenario, Vec<Structure>) {
        let line = tx
            .upsert_line(&LineUpsert { code: "LT-01".to_string(), ..Default::default() })
            .await
            .unwrap();
        let scenario = tx
            .upsert_scenario(&ScenarioUpsert {
                line_id: line.id,
                description: "Levantamento 2024".to_string(),
                reference_date: None,
                scenario_type: ScenarioType::PreManejo,
                status: ScenarioStatus::Ativo,
            })
            .await
            .unwrap();
        let mut structures = Vec::new();
        for (i, code) in ["E1", "E2", "E3"].iter().enumerate() {
            let s = tx
                .upsert_structure(&StructureUpsert {
                    line_id: line.id,
                    code: code.to_string(),
                    structure_type: None,
                    circuits: None,
                    height_m: None,
                    longitude: -47.9 + i as f64 * 0.001,
                    latitude: -15.8,
                    stage_order: i + 1,
                })
                .await
                .unwrap();
            structures.push(s);
        }
        (line, scenario, structures)
    }

    fn new_span(a: &Structure, b: &Structure) -> NewSpan {
        NewSpan {
            start_structure: a.id,
            end_structure: b.id,
            code: format!("{} - {}", a.code, b.code),
            start_code: a.code.clone(),
            end_code: b.code.clone(),
            length_m: 107.0,
            geometry: Geometry::line_string(vec![a.position(), b.position()]),
        }
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = MemoryStore::new();
        let record = pending_record();

        let mut tx = store.begin().await.unwrap();
        tx.insert_dataset(&record).await.unwrap();
        tx.stage_rows(record.id, CsvTable::Vegetation, &[row(1), row(2)]).await.unwrap();
        tx.rollback().await.unwrap();

        assert!(store.datasets().is_empty());
        assert_eq!(store.staged_count(record.id), 0);
        assert!(store.dataset(record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_writes_are_invisible_until_commit() {
        let store = MemoryStore::new();
        let record = pending_record();

        let mut tx = store.begin().await.unwrap();
        tx.insert_dataset(&record).await.unwrap();
        assert!(store.datasets().is_empty());

        tx.commit().await.unwrap();
        assert_eq!(store.datasets().len(), 1);
    }

    #[tokio::test]
    async fn test_status_transitions_are_forward_only() {
        let store = MemoryStore::new();
        let record = pending_record();

        let mut tx = store.begin().await.unwrap();
        tx.insert_dataset(&record).await.unwrap();
        tx.update_dataset_status(record.id, DatasetStatus::Staged, &DatasetUpdate::default())
            .await
            .unwrap();
        let err = tx
            .update_dataset_status(record.id, DatasetStatus::Pending, &DatasetUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FaixaError::Persistence { .. }));

        tx.update_dataset_status(
            record.id,
            DatasetStatus::Failed,
            &DatasetUpdate { error: Some("boom".to_string()), ..Default::default() },
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let stored = store.dataset(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DatasetStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_copy_staged_rows() {
        let store = MemoryStore::new();
        let id = DatasetId::new();
        let mut tx = store.begin().await.unwrap();
        tx.stage_rows(id, CsvTable::VegetationRisk, &[row(2), row(1)]).await.unwrap();

        let copied = tx.copy_staged_rows(id, CsvTable::VegetationRisk, CsvTable::Vegetation).await.unwrap();
        assert_eq!(copied, 2);

        let rows = tx.staged_rows(id, CsvTable::Vegetation).await.unwrap();
        assert_eq!(rows.iter().map(|r| r.row_number).collect::<Vec<_>>(), vec![1, 2]);
        assert!(tx.staged_rows(id, CsvTable::Crossings).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upserts_are_keyed_by_natural_identifiers() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let (line, scenario, structures) = line_with_structures(&mut tx).await;

        let again = tx
            .upsert_line(&LineUpsert {
                code: "LT-01".to_string(),
                voltage_kv: Some(500.0),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(again.id, line.id);

        let same = tx
            .upsert_scenario(&ScenarioUpsert {
                line_id: line.id,
                description: "Levantamento 2024".to_string(),
                reference_date: None,
                scenario_type: ScenarioType::PosManejo,
                status: ScenarioStatus::Ativo,
            })
            .await
            .unwrap();
        assert_eq!(same.id, scenario.id);
        assert_eq!(same.scenario_type, ScenarioType::PosManejo);

        let moved = tx
            .upsert_structure(&StructureUpsert {
                line_id: line.id,
                code: "E1".to_string(),
                structure_type: Some("autoportante".to_string()),
                circuits: None,
                height_m: None,
                longitude: -47.95,
                latitude: -15.8,
                stage_order: 1,
            })
            .await
            .unwrap();
        assert_eq!(moved.id, structures[0].id);
        tx.commit().await.unwrap();

        assert_eq!(store.lines().len(), 1);
        assert_eq!(store.lines()[0].voltage_kv, Some(500.0));
        assert_eq!(store.structures(line.id).len(), 3);
        assert_eq!(store.structures(line.id)[0].longitude, -47.95);
    }

    #[tokio::test]
    async fn test_replace_spans_detaches_old_references() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let (line, scenario, s) = line_with_structures(&mut tx).await;

        let first = tx
            .replace_spans(line.id, scenario.id, &[new_span(&s[0], &s[1]), new_span(&s[1], &s[2])])
            .await
            .unwrap();
        tx.upsert_tree(&TreeUpsert {
            line_id: line.id,
            span_id: Some(first[0].id),
            code: "A1".to_string(),
            geometry: None,
            height_m: Some(12.0),
            vegetation_type: None,
            riparian: None,
        })
        .await
        .unwrap();

        let second = tx
            .replace_spans(line.id, scenario.id, &[new_span(&s[0], &s[1]), new_span(&s[1], &s[2])])
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.spans(scenario.id).len(), 2);
        assert_ne!(first[0].id, second[0].id);
        assert_eq!(store.trees(line.id)[0].span_id, None);
    }

    #[tokio::test]
    async fn test_span_must_reference_line_structures() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let (_, scenario, s) = line_with_structures(&mut tx).await;

        let other_line = LineId::new();
        let err = tx.replace_spans(other_line, scenario.id, &[new_span(&s[0], &s[1])]).await.unwrap_err();
        assert!(matches!(err, FaixaError::Persistence { .. }));

        let (line, _, _) = line_with_structures(&mut tx).await;
        let err = tx
            .replace_spans(line.id, scenario.id, &[new_span(&s[0], &s[1]), new_span(&s[0], &s[1])])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("duplicate span code"));
    }

    #[tokio::test]
    async fn test_span_risk_inputs() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let (line, scenario, s) = line_with_structures(&mut tx).await;
        let spans = tx
            .replace_spans(line.id, scenario.id, &[new_span(&s[0], &s[1]), new_span(&s[1], &s[2])])
            .await
            .unwrap();

        let risk = |class: &str| VegetationRisk {
            scenario_id: scenario.id,
            span_id: Some(spans[0].id),
            tree_id: None,
            clearance_m: None,
            risk_class: Some(class.to_string()),
            lateral_distance_m: None,
            category: None,
            processed_at: None,
            source: RiskSource::Survey,
            row_number: None,
        };
        tx.replace_vegetation_risks(scenario.id, &[risk("alta"), risk("baixa")]).await.unwrap();
        tx.replace_crossings(
            scenario.id,
            &[Crossing {
                scenario_id: scenario.id,
                line_id: line.id,
                span_id: Some(spans[1].id),
                crossing_type: Some("rodovia".to_string()),
                risk_class: Some("critico".to_string()),
                description: None,
                geometry: None,
                source: RiskSource::Survey,
            }],
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let inputs = store.span_risk_inputs(line.id, scenario.id).await.unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].span_code, "E1 - E2");
        assert_eq!(inputs[0].vegetation_classes.len(), 2);
        assert_eq!(inputs[1].crossing_classes, vec![Some("critico".to_string())]);
        assert_eq!(inputs[1].lateral_risks, 0);
    }

    #[tokio::test]
    async fn test_overlapping_transactions_both_commit() {
        let store = MemoryStore::new();
        let first = pending_record();
        let second = pending_record();

        let mut tx1 = store.begin().await.unwrap();
        let mut tx2 = store.begin().await.unwrap();
        tx1.insert_dataset(&first).await.unwrap();
        tx2.insert_dataset(&second).await.unwrap();
        tx1.stage_rows(first.id, CsvTable::Vegetation, &[row(1)]).await.unwrap();
        tx2.stage_rows(second.id, CsvTable::Vegetation, &[row(1), row(2)]).await.unwrap();
        tx1.commit().await.unwrap();
        tx2.commit().await.unwrap();

        assert_eq!(store.datasets().len(), 2);
        assert_eq!(store.staged_count(first.id), 1);
        assert_eq!(store.staged_count(second.id), 2);
    }

    #[tokio::test]
    async fn test_rollback_does_not_undo_a_concurrent_commit() {
        let store = MemoryStore::new();
        let kept = pending_record();
        let discarded = pending_record();

        let mut tx1 = store.begin().await.unwrap();
        let mut tx2 = store.begin().await.unwrap();
        tx1.insert_dataset(&kept).await.unwrap();
        tx2.insert_dataset(&discarded).await.unwrap();
        tx1.commit().await.unwrap();
        tx2.rollback().await.unwrap();

        let datasets = store.datasets();
        assert_eq!(datasets.len(), 1);
        assert_eq!(datasets[0].id, kept.id);
    }

    #[tokio::test]
    async fn test_concurrent_imports_of_different_lines_merge() {
        let store = MemoryStore::new();

        let import = |code: &'static str| {
            let store = store.clone();
            tokio::spawn(async move {
                let mut tx = store.begin().await.unwrap();
                let record = pending_record();
                tx.insert_dataset(&record).await.unwrap();
                let line = tx
                    .upsert_line(&LineUpsert { code: code.to_string(), ..Default::default() })
                    .await
                    .unwrap();
                let scenario = tx
                    .upsert_scenario(&ScenarioUpsert {
                        line_id: line.id,
                        description: "Levantamento 2024".to_string(),
                        reference_date: None,
                        scenario_type: ScenarioType::PreManejo,
                        status: ScenarioStatus::Ativo,
                    })
                    .await
                    .unwrap();
                let mut structures = Vec::new();
                for (i, structure) in ["E1", "E2"].iter().enumerate() {
                    let s = tx
                        .upsert_structure(&StructureUpsert {
                            line_id: line.id,
                            code: structure.to_string(),
                            structure_type: None,
                            circuits: None,
                            height_m: None,
                            longitude: -47.9 + i as f64 * 0.001,
                            latitude: -15.8,
                            stage_order: i + 1,
                        })
                        .await
                        .unwrap();
                    structures.push(s);
                }
                tx.replace_spans(line.id, scenario.id, &[new_span(&structures[0], &structures[1])])
                    .await
                    .unwrap();
                tokio::task::yield_now().await;
                tx.commit().await.unwrap();
                (line, scenario)
            })
        };

        let (a, b) = tokio::join!(import("LT-A"), import("LT-B"));
        let (line_a, scenario_a) = a.unwrap();
        let (line_b, scenario_b) = b.unwrap();

        assert_eq!(store.datasets().len(), 2);
        assert_eq!(store.lines().len(), 2);
        assert_eq!(store.structures(line_a.id).len(), 2);
        assert_eq!(store.structures(line_b.id).len(), 2);
        assert_eq!(store.spans(scenario_a.id).len(), 1);
        assert_eq!(store.spans(scenario_b.id).len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_creation_of_same_line_conflicts() {
        let store = MemoryStore::new();
        let upsert = LineUpsert { code: "LT-01".to_string(), ..Default::default() };

        let mut tx1 = store.begin().await.unwrap();
        let mut tx2 = store.begin().await.unwrap();
        let line = tx1.upsert_line(&upsert).await.unwrap();
        tx2.upsert_line(&upsert).await.unwrap();
        tx1.commit().await.unwrap();

        let err = tx2.commit().await.unwrap_err();
        assert!(matches!(err, FaixaError::Persistence { .. }));
        let lines = store.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].id, line.id);
    }

    #[tokio::test]
    async fn test_replacing_spans_detaches_committed_references() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let (line, scenario, s) = line_with_structures(&mut tx).await;
        let spans = tx.replace_spans(line.id, scenario.id, &[new_span(&s[0], &s[1])]).await.unwrap();
        let tree = tx
            .upsert_tree(&TreeUpsert {
                line_id: line.id,
                span_id: Some(spans[0].id),
                code: "A1".to_string(),
                geometry: None,
                height_m: None,
                vegetation_type: None,
                riparian: None,
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx1 = store.begin().await.unwrap();
        let other = store.begin().await.unwrap();
        tx1.replace_spans(line.id, scenario.id, &[new_span(&s[1], &s[2])]).await.unwrap();
        tx1.commit().await.unwrap();
        other.commit().await.unwrap();

        let current = store.spans(scenario.id);
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].code, "E2 - E3");
        let trees = store.trees(line.id);
        assert_eq!(trees[0].id, tree.id);
        assert_eq!(trees[0].span_id, None);
    }
}
