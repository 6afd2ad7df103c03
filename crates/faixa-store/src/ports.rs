use async_trait::async_trait;
use faixa_core::error::Result;
use faixa_core::models::{
    Crossing, CsvTable, DatasetId, DatasetRecord, DatasetStatus, DatasetUpdate, KmlLayer,
    LateralRisk, Line, LineId, LineUpsert, NewSpan, Scenario, ScenarioId, ScenarioUpsert, Span,
    SpanRiskInputs, StagedFeature, StagedRow, Structure, StructureUpsert, Treatment, Tree,
    TreeUpsert, VegetationRisk,
};

/// Port for opening an import unit of work
#[async_trait]
pub trait ImportStore: Send + Sync {
    type Tx: ImportTransaction;

    /// Begin a transaction. Nothing written through it is visible to other
    /// readers until `commit`.
    async fn begin(&self) -> Result<Self::Tx>;
}

/// Unit of work threaded through staging and normalization.
///
/// Implementations never commit on their own; the import orchestrator owns
/// `commit` and `rollback`.
#[async_trait]
pub trait ImportTransaction: Send {
    /// Insert a dataset record with its current status
    async fn insert_dataset(&mut self, record: &DatasetRecord) -> Result<()>;

    /// Move a dataset to a new status, writing the supplied counters or error.
    ///
    /// Backward transitions are rejected.
    async fn update_dataset_status(
        &mut self,
        id: DatasetId,
        status: DatasetStatus,
        update: &DatasetUpdate,
    ) -> Result<()>;

    /// Stage KML features for a dataset, returning the number stored
    async fn stage_features(
        &mut self,
        dataset_id: DatasetId,
        layer: KmlLayer,
        features: &[StagedFeature],
    ) -> Result<usize>;

    /// Stage CSV rows for a dataset, returning the number stored
    async fn stage_rows(
        &mut self,
        dataset_id: DatasetId,
        table: CsvTable,
        rows: &[StagedRow],
    ) -> Result<usize>;

    /// Copy every staged row of one CSV table into another for the same dataset
    async fn copy_staged_rows(
        &mut self,
        dataset_id: DatasetId,
        from: CsvTable,
        to: CsvTable,
    ) -> Result<usize>;

    /// Staged features of a layer, in staging order
    async fn staged_features(
        &mut self,
        dataset_id: DatasetId,
        layer: KmlLayer,
    ) -> Result<Vec<StagedFeature>>;

    /// Staged rows of a table, in row order
    async fn staged_rows(&mut self, dataset_id: DatasetId, table: CsvTable)
        -> Result<Vec<StagedRow>>;

    /// Insert or update a line by code. Absent metadata keeps stored values.
    async fn upsert_line(&mut self, line: &LineUpsert) -> Result<Line>;

    /// Insert or update a scenario by (line, description)
    async fn upsert_scenario(&mut self, scenario: &ScenarioUpsert) -> Result<Scenario>;

    /// Insert or update a structure by (line, code)
    async fn upsert_structure(&mut self, structure: &StructureUpsert) -> Result<Structure>;

    /// Delete the scenario's spans and insert the given ones.
    ///
    /// References to deleted spans from trees and risk records are cleared.
    async fn replace_spans(
        &mut self,
        line_id: LineId,
        scenario_id: ScenarioId,
        spans: &[NewSpan],
    ) -> Result<Vec<Span>>;

    /// Insert or update a tree by (line, code)
    async fn upsert_tree(&mut self, tree: &TreeUpsert) -> Result<Tree>;

    /// Delete the scenario's vegetation risks and insert the given ones
    async fn replace_vegetation_risks(
        &mut self,
        scenario_id: ScenarioId,
        risks: &[VegetationRisk],
    ) -> Result<usize>;

    /// Delete the scenario's lateral fall risks and insert the given ones
    async fn replace_lateral_risks(
        &mut self,
        scenario_id: ScenarioId,
        risks: &[LateralRisk],
    ) -> Result<usize>;

    /// Delete the scenario's crossings and insert the given ones
    async fn replace_crossings(
        &mut self,
        scenario_id: ScenarioId,
        crossings: &[Crossing],
    ) -> Result<usize>;

    /// Delete the scenario's treatments and insert the given ones
    async fn replace_treatments(
        &mut self,
        scenario_id: ScenarioId,
        treatments: &[Treatment],
    ) -> Result<usize>;

    /// Make every write of this transaction durable
    async fn commit(self) -> Result<()>;

    /// Discard every write of this transaction
    async fn rollback(self) -> Result<()>;
}

/// Read-only queries outside any import
#[async_trait]
pub trait RiskReader: Send + Sync {
    /// Get a dataset record by ID
    async fn dataset(&self, id: DatasetId) -> Result<Option<DatasetRecord>>;

    /// Risk facts for every span of a line in a scenario, in line order
    async fn span_risk_inputs(
        &self,
        line_id: LineId,
        scenario_id: ScenarioId,
    ) -> Result<Vec<SpanRiskInputs>>;
}
