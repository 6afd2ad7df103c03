//! Import unit of work over a PostgreSQL transaction

use async_trait::async_trait;
use faixa_core::error::{FaixaError, Result};
use faixa_core::models::{
    Crossing, CsvTable, DatasetId, DatasetRecord, DatasetStatus, DatasetUpdate, Geometry,
    KmlLayer, LateralRisk, Line, LineId, LineUpsert, NewSpan, Scenario, ScenarioId,
    ScenarioStatus, ScenarioType, ScenarioUpsert, Span, SpanId, StagedFeature, StagedRow,
    Structure, StructureId, StructureUpsert, Treatment, Tree, TreeId, TreeUpsert, VegetationRisk,
};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Postgres, Row, Transaction as SqlxTransaction};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::timeout;

use crate::ports::ImportTransaction;

/// GeoJSON text bound to `ST_GeomFromGeoJSON`
pub(crate) fn geometry_param(geometry: Option<&Geometry>) -> Option<String> {
    geometry.map(|g| g.to_geojson().to_string())
}

/// Parse `ST_AsGeoJSON` output back into a geometry
pub(crate) fn parse_geometry(json: Option<String>, operation: &str) -> Result<Option<Geometry>> {
    json.map(|text| {
        serde_json::from_str::<Geometry>(&text)
            .map_err(|e| FaixaError::persistence(operation, format!("invalid stored geometry: {}", e)))
    })
    .transpose()
}

fn line_from_row(row: &PgRow) -> Result<Line> {
    Ok(Line {
        id: LineId(row.get("id")),
        code: row.get("codigo"),
        name: row.get("nome"),
        concessionaire: row.get("concessionaria"),
        region: row.get("regiao"),
        voltage_kv: row.get("tensao_kv"),
        geometry: parse_geometry(row.get("geom_json"), "read line")?,
    })
}

fn scenario_from_row(row: &PgRow) -> Result<Scenario> {
    let tipo: String = row.get("tipo");
    let status: String = row.get("status");
    Ok(Scenario {
        id: ScenarioId(row.get("id")),
        line_id: LineId(row.get("linha_id")),
        description: row.get("descricao"),
        reference_date: row.get("data_referencia"),
        scenario_type: ScenarioType::parse(&tipo).ok_or_else(|| {
            FaixaError::persistence("read scenario", format!("unknown scenario type {}", tipo))
        })?,
        status: ScenarioStatus::parse(&status).ok_or_else(|| {
            FaixaError::persistence("read scenario", format!("unknown scenario status {}", status))
        })?,
    })
}

fn structure_from_row(row: &PgRow) -> Structure {
    Structure {
        id: StructureId(row.get("id")),
        line_id: LineId(row.get("linha_id")),
        code: row.get("codigo"),
        structure_type: row.get("tipo"),
        circuits: row.get("n_circuitos"),
        height_m: row.get("altura_m"),
        longitude: row.get("lon"),
        latitude: row.get("lat"),
        stage_order: row.get::<i64, _>("ordem") as usize,
    }
}

fn tree_from_row(row: &PgRow) -> Result<Tree> {
    Ok(Tree {
        id: TreeId(row.get("id")),
        line_id: LineId(row.get("linha_id")),
        span_id: row.get::<Option<uuid::Uuid>, _>("vao_id").map(SpanId),
        code: row.get("codigo"),
        geometry: parse_geometry(row.get("geom_json"), "read tree")?,
        height_m: row.get("altura_m"),
        vegetation_type: row.get("tipo_vegetacao"),
        riparian: row.get("em_app"),
    })
}

/// Transaction wrapper implementing the import unit of work
pub struct PostgresTransaction {
    inner: Option<SqlxTransaction<'static, Postgres>>,
    timeout_duration: Duration,
}

impl PostgresTransaction {
    pub(crate) fn new(tx: SqlxTransaction<'static, Postgres>, timeout_duration: Duration) -> Self {
        Self { inner: Some(tx), timeout_duration }
    }

    /// Connection of the open transaction
    fn conn(&mut self) -> Result<&mut PgConnection> {
        self.inner
            .as_deref_mut()
            .ok_or_else(|| FaixaError::persistence("transaction", "transaction already completed"))
    }

    async fn delete_for_scenario(&mut self, table: &str, scenario_id: ScenarioId) -> Result<()> {
        sqlx::query(&format!("DELETE FROM {} WHERE cenario_id = $1", table))
            .bind(scenario_id.0)
            .execute(self.conn()?)
            .await
            .map_err(|e| FaixaError::persistence(format!("clear {}", table), e))?;
        Ok(())
    }
}

impl Drop for PostgresTransaction {
    fn drop(&mut self) {
        if self.inner.is_some() {
            // sqlx rolls the transaction back when the connection is returned
            tracing::warn!("Import transaction dropped without commit; rolling back");
        }
    }
}

#[async_trait]
impl ImportTransaction for PostgresTransaction {
    async fn insert_dataset(&mut self, record: &DatasetRecord) -> Result<()> {
        let files = serde_json::to_value(&record.files)
            .map_err(|e| FaixaError::Serialization(e.to_string()))?;
        let stage = serde_json::to_value(record.stage)
            .map_err(|e| FaixaError::Serialization(e.to_string()))?;
        let normalize = record
            .normalize
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| FaixaError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO datasets (id, label, line_code, scenario_hint, source_path, created_by,
                                  files, status, stage_counters, normalize_summary, error,
                                  created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(record.id.0)
        .bind(&record.label)
        .bind(&record.line_code)
        .bind(&record.scenario_hint)
        .bind(record.source_path.to_string_lossy().to_string())
        .bind(&record.created_by)
        .bind(files)
        .bind(record.status.as_str())
        .bind(stage)
        .bind(normalize)
        .bind(&record.error)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(self.conn()?)
        .await
        .map_err(|e| FaixaError::persistence("insert dataset", e))?;

        Ok(())
    }

    async fn update_dataset_status(
        &mut self,
        id: DatasetId,
        status: DatasetStatus,
        update: &DatasetUpdate,
    ) -> Result<()> {
        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM datasets WHERE id = $1 FOR UPDATE")
                .bind(id.0)
                .fetch_optional(self.conn()?)
                .await
                .map_err(|e| FaixaError::persistence("update dataset", e))?;

        let current = current
            .as_deref()
            .and_then(DatasetStatus::parse)
            .ok_or_else(|| FaixaError::persistence("update dataset", format!("dataset {} not found", id)))?;

        if !current.can_transition_to(status) {
            return Err(FaixaError::persistence(
                "update dataset",
                format!("cannot move dataset {} from {} to {}", id, current, status),
            ));
        }

        let stage = update
            .stage
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| FaixaError::Serialization(e.to_string()))?;
        let normalize = update
            .normalize
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| FaixaError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            UPDATE datasets
            SET status = $2,
                stage_counters = COALESCE($3, stage_counters),
                normalize_summary = COALESCE($4, normalize_summary),
                error = COALESCE($5, error),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(status.as_str())
        .bind(stage)
        .bind(normalize)
        .bind(&update.error)
        .execute(self.conn()?)
        .await
        .map_err(|e| FaixaError::persistence("update dataset", e))?;

        Ok(())
    }

    async fn stage_features(
        &mut self,
        dataset_id: DatasetId,
        layer: KmlLayer,
        features: &[StagedFeature],
    ) -> Result<usize> {
        let statement = format!(
            r#"
            INSERT INTO {} (dataset_id, feature_order, source_file, name, properties, geom)
            VALUES ($1, $2, $3, $4, $5, ST_SetSRID(ST_GeomFromGeoJSON($6::text), 4326))
            "#,
            layer.table_name()
        );

        for feature in features {
            let properties = serde_json::to_value(&feature.properties)
                .map_err(|e| FaixaError::Serialization(e.to_string()))?;
            sqlx::query(&statement)
                .bind(dataset_id.0)
                .bind(feature.order as i64)
                .bind(&feature.source_file)
                .bind(&feature.name)
                .bind(properties)
                .bind(geometry_param(feature.geometry.as_ref()))
                .execute(self.conn()?)
                .await
                .map_err(|e| FaixaError::persistence(format!("stage {}", feature.context()), e))?;
        }

        Ok(features.len())
    }

    async fn stage_rows(
        &mut self,
        dataset_id: DatasetId,
        table: CsvTable,
        rows: &[StagedRow],
    ) -> Result<usize> {
        let statement = format!(
            "INSERT INTO {} (dataset_id, row_number, source_file, data) VALUES ($1, $2, $3, $4)",
            table.table_name()
        );

        for row in rows {
            let data = serde_json::to_value(&row.values)
                .map_err(|e| FaixaError::Serialization(e.to_string()))?;
            sqlx::query(&statement)
                .bind(dataset_id.0)
                .bind(row.row_number as i64)
                .bind(&row.source_file)
                .bind(data)
                .execute(self.conn()?)
                .await
                .map_err(|e| FaixaError::persistence(format!("stage {}", row.context()), e))?;
        }

        Ok(rows.len())
    }

    async fn copy_staged_rows(
        &mut self,
        dataset_id: DatasetId,
        from: CsvTable,
        to: CsvTable,
    ) -> Result<usize> {
        let statement = format!(
            r#"
            INSERT INTO {} (dataset_id, row_number, source_file, data)
            SELECT dataset_id, row_number, source_file, data FROM {} WHERE dataset_id = $1
            "#,
            to.table_name(),
            from.table_name()
        );

        let result = sqlx::query(&statement)
            .bind(dataset_id.0)
            .execute(self.conn()?)
            .await
            .map_err(|e| FaixaError::persistence(format!("copy {}", from.table_name()), e))?;

        Ok(result.rows_affected() as usize)
    }

    async fn staged_features(
        &mut self,
        dataset_id: DatasetId,
        layer: KmlLayer,
    ) -> Result<Vec<StagedFeature>> {
        let statement = format!(
            r#"
            SELECT feature_order, source_file, name, properties, ST_AsGeoJSON(geom) AS geom_json
            FROM {} WHERE dataset_id = $1 ORDER BY feature_order, id
            "#,
            layer.table_name()
        );

        let rows = sqlx::query(&statement)
            .bind(dataset_id.0)
            .fetch_all(self.conn()?)
            .await
            .map_err(|e| FaixaError::persistence(format!("read {}", layer.table_name()), e))?;

        rows.iter()
            .map(|row| {
                let properties: BTreeMap<String, String> =
                    serde_json::from_value(row.get("properties"))
                        .map_err(|e| FaixaError::Serialization(e.to_string()))?;
                Ok(StagedFeature {
                    order: row.get::<i64, _>("feature_order") as usize,
                    source_file: row.get("source_file"),
                    name: row.get("name"),
                    properties,
                    geometry: parse_geometry(row.get("geom_json"), "read staged feature")?,
                })
            })
            .collect()
    }

    async fn staged_rows(
        &mut self,
        dataset_id: DatasetId,
        table: CsvTable,
    ) -> Result<Vec<StagedRow>> {
        let statement = format!(
            "SELECT row_number, source_file, data FROM {} WHERE dataset_id = $1 ORDER BY row_number, id",
            table.table_name()
        );

        let rows = sqlx::query(&statement)
            .bind(dataset_id.0)
            .fetch_all(self.conn()?)
            .await
            .map_err(|e| FaixaError::persistence(format!("read {}", table.table_name()), e))?;

        rows.iter()
            .map(|row| {
                let values: BTreeMap<String, String> = serde_json::from_value(row.get("data"))
                    .map_err(|e| FaixaError::Serialization(e.to_string()))?;
                Ok(StagedRow {
                    row_number: row.get::<i64, _>("row_number") as usize,
                    source_file: row.get("source_file"),
                    values,
                })
            })
            .collect()
    }

    async fn upsert_line(&mut self, line: &LineUpsert) -> Result<Line> {
        let row = sqlx::query(
            r#"
            INSERT INTO linhas (id, codigo, nome, concessionaria, regiao, tensao_kv, geom)
            VALUES ($1, $2, $3, $4, $5, $6, ST_SetSRID(ST_GeomFromGeoJSON($7::text), 4326))
            ON CONFLICT (codigo) DO UPDATE
            SET nome = COALESCE(EXCLUDED.nome, linhas.nome),
                concessionaria = COALESCE(EXCLUDED.concessionaria, linhas.concessionaria),
                regiao = COALESCE(EXCLUDED.regiao, linhas.regiao),
                tensao_kv = COALESCE(EXCLUDED.tensao_kv, linhas.tensao_kv),
                geom = COALESCE(EXCLUDED.geom, linhas.geom),
                updated_at = now()
            RETURNING id, codigo, nome, concessionaria, regiao, tensao_kv,
                      ST_AsGeoJSON(geom) AS geom_json
            "#,
        )
        .bind(LineId::new().0)
        .bind(&line.code)
        .bind(&line.name)
        .bind(&line.concessionaire)
        .bind(&line.region)
        .bind(line.voltage_kv)
        .bind(geometry_param(line.geometry.as_ref()))
        .fetch_one(self.conn()?)
        .await
        .map_err(|e| FaixaError::persistence(format!("upsert line {}", line.code), e))?;

        line_from_row(&row)
    }

    async fn upsert_scenario(&mut self, scenario: &ScenarioUpsert) -> Result<Scenario> {
        let row = sqlx::query(
            r#"
            INSERT INTO cenarios (id, linha_id, descricao, data_referencia, tipo, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (linha_id, descricao) DO UPDATE
            SET data_referencia = COALESCE(EXCLUDED.data_referencia, cenarios.data_referencia),
                tipo = EXCLUDED.tipo,
                status = EXCLUDED.status
            RETURNING id, linha_id, descricao, data_referencia, tipo, status
            "#,
        )
        .bind(ScenarioId::new().0)
        .bind(scenario.line_id.0)
        .bind(&scenario.description)
        .bind(scenario.reference_date)
        .bind(scenario.scenario_type.as_str())
        .bind(scenario.status.as_str())
        .fetch_one(self.conn()?)
        .await
        .map_err(|e| FaixaError::persistence(format!("upsert scenario {}", scenario.description), e))?;

        scenario_from_row(&row)
    }

    async fn upsert_structure(&mut self, structure: &StructureUpsert) -> Result<Structure> {
        let row = sqlx::query(
            r#"
            INSERT INTO estruturas (id, linha_id, codigo, tipo, n_circuitos, altura_m, ordem, geom)
            VALUES ($1, $2, $3, $4, $5, $6, $7, ST_SetSRID(ST_MakePoint($8, $9), 4326))
            ON CONFLICT (linha_id, codigo) DO UPDATE
            SET tipo = COALESCE(EXCLUDED.tipo, estruturas.tipo),
                n_circuitos = COALESCE(EXCLUDED.n_circuitos, estruturas.n_circuitos),
                altura_m = COALESCE(EXCLUDED.altura_m, estruturas.altura_m),
                ordem = EXCLUDED.ordem,
                geom = EXCLUDED.geom
            RETURNING id, linha_id, codigo, tipo, n_circuitos, altura_m, ordem,
                      ST_X(geom) AS lon, ST_Y(geom) AS lat
            "#,
        )
        .bind(StructureId::new().0)
        .bind(structure.line_id.0)
        .bind(&structure.code)
        .bind(&structure.structure_type)
        .bind(structure.circuits)
        .bind(structure.height_m)
        .bind(structure.stage_order as i64)
        .bind(structure.longitude)
        .bind(structure.latitude)
        .fetch_one(self.conn()?)
        .await
        .map_err(|e| FaixaError::persistence(format!("upsert structure {}", structure.code), e))?;

        Ok(structure_from_row(&row))
    }

    async fn replace_spans(
        &mut self,
        line_id: LineId,
        scenario_id: ScenarioId,
        spans: &[NewSpan],
    ) -> Result<Vec<Span>> {
        self.delete_for_scenario("vaos", scenario_id).await?;

        let mut inserted = Vec::with_capacity(spans.len());
        for span in spans {
            let id = SpanId::new();
            let result = sqlx::query(
                r#"
                INSERT INTO vaos (id, linha_id, cenario_id, estrutura_ini, estrutura_fim, codigo,
                                  codigo_ini, codigo_fim, comprimento_m, geom)
                SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9,
                       ST_SetSRID(ST_GeomFromGeoJSON($10::text), 4326)
                WHERE EXISTS (SELECT 1 FROM estruturas WHERE id = $4 AND linha_id = $2)
                  AND EXISTS (SELECT 1 FROM estruturas WHERE id = $5 AND linha_id = $2)
                "#,
            )
            .bind(id.0)
            .bind(line_id.0)
            .bind(scenario_id.0)
            .bind(span.start_structure.0)
            .bind(span.end_structure.0)
            .bind(&span.code)
            .bind(&span.start_code)
            .bind(&span.end_code)
            .bind(span.length_m)
            .bind(geometry_param(Some(&span.geometry)))
            .execute(self.conn()?)
            .await
            .map_err(|e| FaixaError::persistence(format!("insert span {}", span.code), e))?;

            if result.rows_affected() == 0 {
                return Err(FaixaError::persistence(
                    "insert span",
                    format!("span {} references a structure outside line {}", span.code, line_id),
                ));
            }

            inserted.push(Span {
                id,
                line_id,
                scenario_id,
                start_structure: span.start_structure,
                end_structure: span.end_structure,
                code: span.code.clone(),
                start_code: span.start_code.clone(),
                end_code: span.end_code.clone(),
                length_m: span.length_m,
                geometry: span.geometry.clone(),
            });
        }

        Ok(inserted)
    }

    async fn upsert_tree(&mut self, tree: &TreeUpsert) -> Result<Tree> {
        let row = sqlx::query(
            r#"
            INSERT INTO arvores (id, linha_id, vao_id, codigo, tipo_vegetacao, altura_m, em_app, geom)
            VALUES ($1, $2, $3, $4, $5, $6, $7, ST_SetSRID(ST_GeomFromGeoJSON($8::text), 4326))
            ON CONFLICT (linha_id, codigo) DO UPDATE
            SET vao_id = COALESCE(EXCLUDED.vao_id, arvores.vao_id),
                tipo_vegetacao = COALESCE(EXCLUDED.tipo_vegetacao, arvores.tipo_vegetacao),
                altura_m = COALESCE(EXCLUDED.altura_m, arvores.altura_m),
                em_app = COALESCE(EXCLUDED.em_app, arvores.em_app),
                geom = COALESCE(EXCLUDED.geom, arvores.geom)
            RETURNING id, linha_id, vao_id, codigo, tipo_vegetacao, altura_m, em_app,
                      ST_AsGeoJSON(geom) AS geom_json
            "#,
        )
        .bind(TreeId::new().0)
        .bind(tree.line_id.0)
        .bind(tree.span_id.map(|id| id.0))
        .bind(&tree.code)
        .bind(&tree.vegetation_type)
        .bind(tree.height_m)
        .bind(tree.riparian)
        .bind(geometry_param(tree.geometry.as_ref()))
        .fetch_one(self.conn()?)
        .await
        .map_err(|e| FaixaError::persistence(format!("upsert tree {}", tree.code), e))?;

        tree_from_row(&row)
    }

    async fn replace_vegetation_risks(
        &mut self,
        scenario_id: ScenarioId,
        risks: &[VegetationRisk],
    ) -> Result<usize> {
        self.delete_for_scenario("riscos_vegetacao", scenario_id).await?;

        for risk in risks {
            sqlx::query(
                r#"
                INSERT INTO riscos_vegetacao (cenario_id, vao_id, arvore_id, dist_min_cabo_m,
                                              classe_risco, distancia_lateral_m, categoria,
                                              data_processamento, origem, linha_csv)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(risk.scenario_id.0)
            .bind(risk.span_id.map(|id| id.0))
            .bind(risk.tree_id.map(|id| id.0))
            .bind(risk.clearance_m)
            .bind(&risk.risk_class)
            .bind(risk.lateral_distance_m)
            .bind(&risk.category)
            .bind(&risk.processed_at)
            .bind(risk.source.as_str())
            .bind(risk.row_number.map(|n| n as i64))
            .execute(self.conn()?)
            .await
            .map_err(|e| FaixaError::persistence("insert vegetation risk", e))?;
        }

        Ok(risks.len())
    }

    async fn replace_lateral_risks(
        &mut self,
        scenario_id: ScenarioId,
        risks: &[LateralRisk],
    ) -> Result<usize> {
        self.delete_for_scenario("riscos_queda_lateral", scenario_id).await?;

        for risk in risks {
            sqlx::query(
                r#"
                INSERT INTO riscos_queda_lateral (cenario_id, linha_id, vao_id, arvore_codigo,
                                                  distancia_lateral_m, altura_queda_m, classe_risco,
                                                  geom, linha_csv)
                VALUES ($1, $2, $3, $4, $5, $6, $7,
                        ST_SetSRID(ST_GeomFromGeoJSON($8::text), 4326), $9)
                "#,
            )
            .bind(risk.scenario_id.0)
            .bind(risk.line_id.0)
            .bind(risk.span_id.map(|id| id.0))
            .bind(&risk.tree_code)
            .bind(risk.lateral_distance_m)
            .bind(risk.fall_height_m)
            .bind(&risk.risk_class)
            .bind(geometry_param(risk.geometry.as_ref()))
            .bind(risk.row_number as i64)
            .execute(self.conn()?)
            .await
            .map_err(|e| FaixaError::persistence("insert lateral risk", e))?;
        }

        Ok(risks.len())
    }

    async fn replace_crossings(
        &mut self,
        scenario_id: ScenarioId,
        crossings: &[Crossing],
    ) -> Result<usize> {
        self.delete_for_scenario("cruzamentos", scenario_id).await?;

        for crossing in crossings {
            sqlx::query(
                r#"
                INSERT INTO cruzamentos (cenario_id, linha_id, vao_id, tipo, classe_risco, descricao,
                                         geom, origem)
                VALUES ($1, $2, $3, $4, $5, $6,
                        ST_SetSRID(ST_GeomFromGeoJSON($7::text), 4326), $8)
                "#,
            )
            .bind(crossing.scenario_id.0)
            .bind(crossing.line_id.0)
            .bind(crossing.span_id.map(|id| id.0))
            .bind(&crossing.crossing_type)
            .bind(&crossing.risk_class)
            .bind(&crossing.description)
            .bind(geometry_param(crossing.geometry.as_ref()))
            .bind(crossing.source.as_str())
            .execute(self.conn()?)
            .await
            .map_err(|e| FaixaError::persistence("insert crossing", e))?;
        }

        Ok(crossings.len())
    }

    async fn replace_treatments(
        &mut self,
        scenario_id: ScenarioId,
        treatments: &[Treatment],
    ) -> Result<usize> {
        self.delete_for_scenario("tratamentos", scenario_id).await?;

        for treatment in treatments {
            sqlx::query(
                r#"
                INSERT INTO tratamentos (cenario_id, linha_id, vao_id, tipo_servico, data_execucao,
                                         geom, origem)
                VALUES ($1, $2, $3, $4, $5, ST_SetSRID(ST_GeomFromGeoJSON($6::text), 4326), $7)
                "#,
            )
            .bind(treatment.scenario_id.0)
            .bind(treatment.line_id.0)
            .bind(treatment.span_id.map(|id| id.0))
            .bind(&treatment.treatment_type)
            .bind(&treatment.executed_at)
            .bind(geometry_param(treatment.geometry.as_ref()))
            .bind(&treatment.origin)
            .execute(self.conn()?)
            .await
            .map_err(|e| FaixaError::persistence("insert treatment", e))?;
        }

        Ok(treatments.len())
    }

    async fn commit(mut self) -> Result<()> {
        let tx = self
            .inner
            .take()
            .ok_or_else(|| FaixaError::persistence("commit", "transaction already completed"))?;

        match timeout(self.timeout_duration, tx.commit()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(FaixaError::persistence("commit", e)),
            Err(_) => Err(FaixaError::persistence(
                "commit",
                format!("timeout after {}s", self.timeout_duration.as_secs()),
            )),
        }
    }

    async fn rollback(mut self) -> Result<()> {
        let tx = self
            .inner
            .take()
            .ok_or_else(|| FaixaError::persistence("rollback", "transaction already completed"))?;

        match timeout(self.timeout_duration, tx.rollback()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(FaixaError::persistence("rollback", e)),
            Err(_) => Err(FaixaError::persistence(
                "rollback",
                format!("timeout after {}s", self.timeout_duration.as_secs()),
            )),
        }
    }
}
