//! PostgreSQL/PostGIS storage adapter implementation

pub mod config;
pub mod migrations;
pub mod transaction;

pub use config::{ConfigError, MigrationConfig, PoolConfig, PostgresConfig};
pub use migrations::{MigrationError, MigrationManager, MigrationStatus};
pub use transaction::PostgresTransaction;

use async_trait::async_trait;
use faixa_core::error::{FaixaError, Result};
use faixa_core::models::{
    DatasetFiles, DatasetId, DatasetRecord, DatasetStatus, LineId, NormalizationSummary,
    ScenarioId, SpanId, SpanRiskInputs, StageCounters,
};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::path::PathBuf;

use crate::ports::{ImportStore, RiskReader};

/// PostgreSQL storage adapter
pub struct PostgresStore {
    pool: PgPool,
    config: PostgresConfig,
}

impl PostgresStore {
    /// Connect with the given configuration, running migrations when
    /// `config.migrations.auto_run` is set
    pub async fn new(config: PostgresConfig) -> Result<Self> {
        config.validate().map_err(|e| FaixaError::ConfigInvalid {
            key: "database_url".to_string(),
            reason: e.to_string(),
        })?;

        let pool = PgPoolOptions::new()
            .min_connections(config.pool.min_connections)
            .max_connections(config.pool.max_connections)
            .acquire_timeout(config.pool.acquire_timeout)
            .idle_timeout(config.pool.idle_timeout)
            .max_lifetime(config.pool.max_lifetime)
            .connect(&config.database_url)
            .await
            .map_err(|e| FaixaError::persistence("connect", e))?;

        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| FaixaError::persistence("connection test", e))?;

        let store = Self { pool, config };
        if store.config.migrations.auto_run {
            store.run_migrations().await?;
        }

        tracing::debug!("Connected to PostgreSQL");
        Ok(store)
    }

    /// Run all pending migrations
    pub async fn run_migrations(&self) -> Result<()> {
        let manager = MigrationManager::new(self.pool.clone());
        manager.run_migrations().await.map_err(|e| FaixaError::persistence("migrate", e))
    }

    /// Check if there are pending migrations
    pub async fn has_pending_migrations(&self) -> Result<bool> {
        let manager = MigrationManager::new(self.pool.clone());
        manager
            .has_pending_migrations()
            .await
            .map_err(|e| FaixaError::persistence("migration status", e))
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &PostgresConfig {
        &self.config
    }
}

#[async_trait]
impl ImportStore for PostgresStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> Result<Self::Tx> {
        let tx = self.pool.begin().await.map_err(|e| FaixaError::persistence("begin", e))?;
        Ok(PostgresTransaction::new(tx, self.config.transaction_timeout))
    }
}

#[async_trait]
impl RiskReader for PostgresStore {
    async fn dataset(&self, id: DatasetId) -> Result<Option<DatasetRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, label, line_code, scenario_hint, source_path, created_by, files, status,
                   stage_counters, normalize_summary, error, created_at, updated_at
            FROM datasets
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FaixaError::persistence("read dataset", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: String = row.get("status");
        let files: DatasetFiles = serde_json::from_value(row.get("files"))
            .map_err(|e| FaixaError::Serialization(e.to_string()))?;
        let stage: StageCounters = serde_json::from_value(row.get("stage_counters"))
            .map_err(|e| FaixaError::Serialization(e.to_string()))?;
        let normalize: Option<NormalizationSummary> = row
            .get::<Option<serde_json::Value>, _>("normalize_summary")
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| FaixaError::Serialization(e.to_string()))?;

        Ok(Some(DatasetRecord {
            id,
            label: row.get("label"),
            line_code: row.get("line_code"),
            scenario_hint: row.get("scenario_hint"),
            source_path: PathBuf::from(row.get::<String, _>("source_path")),
            created_by: row.get("created_by"),
            files,
            status: DatasetStatus::parse(&status).ok_or_else(|| {
                FaixaError::persistence("read dataset", format!("unknown status {}", status))
            })?,
            stage,
            normalize,
            error: row.get("error"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }))
    }

    async fn span_risk_inputs(
        &self,
        line_id: LineId,
        scenario_id: ScenarioId,
    ) -> Result<Vec<SpanRiskInputs>> {
        let rows = sqlx::query(
            r#"
            SELECT v.id, v.codigo,
                   COALESCE((SELECT array_agg(COALESCE(r.classe_risco, r.categoria))
                             FROM riscos_vegetacao r
                             WHERE r.vao_id = v.id AND r.cenario_id = $2), '{}') AS vegetacao,
                   (SELECT COUNT(*) FROM riscos_queda_lateral q
                    WHERE q.vao_id = v.id AND q.cenario_id = $2) AS quedas,
                   COALESCE((SELECT array_agg(c.classe_risco)
                             FROM cruzamentos c
                             WHERE c.vao_id = v.id AND c.cenario_id = $2), '{}') AS cruzamentos
            FROM vaos v
            JOIN estruturas e ON e.id = v.estrutura_ini
            WHERE v.linha_id = $1 AND v.cenario_id = $2
            ORDER BY e.ordem, v.codigo
            "#,
        )
        .bind(line_id.0)
        .bind(scenario_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| FaixaError::persistence("read span risks", e))?;

        Ok(rows
            .iter()
            .map(|row| SpanRiskInputs {
                span_id: SpanId(row.get("id")),
                span_code: row.get("codigo"),
                vegetation_classes: row.get::<Vec<Option<String>>, _>("vegetacao"),
                lateral_risks: row.get::<i64, _>("quedas") as usize,
                crossing_classes: row.get::<Vec<Option<String>>, _>("cruzamentos"),
            })
            .collect())
    }
}
