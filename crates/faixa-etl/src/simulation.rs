//! Risk simulation
//!
//! Scores each span of a scenario from its vegetation risks, lateral fall
//! risks and crossings, then reports how much of the line's total risk a
//! selection of spans would remove if treated.

use std::collections::HashSet;

use faixa_core::models::{LineId, ScenarioId, SpanId, SpanRiskInputs};
use faixa_core::{FaixaError, Result};
use faixa_store::RiskReader;
use serde::Serialize;

/// Which spans to treat
#[derive(Debug, Clone)]
pub struct SimulationRequest {
    pub line_id: LineId,
    pub scenario_id: ScenarioId,
    /// Explicit selection; takes precedence over `top_n`
    pub span_ids: Vec<SpanId>,
    /// The `n` riskiest spans with a non-zero score
    pub top_n: Option<usize>,
}

impl SimulationRequest {
    pub fn new(line_id: LineId, scenario_id: ScenarioId) -> Self {
        Self { line_id, scenario_id, span_ids: Vec::new(), top_n: None }
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_n == Some(0) {
            return Err(FaixaError::invalid_parameter("top_n", "must be at least 1"));
        }
        Ok(())
    }
}

/// Score breakdown of one span
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpanScore {
    pub span_id: SpanId,
    pub span_code: String,
    pub vegetation: usize,
    pub lateral: usize,
    pub crossings: usize,
}

impl SpanScore {
    pub fn from_inputs(inputs: &SpanRiskInputs) -> Self {
        Self {
            span_id: inputs.span_id,
            span_code: inputs.span_code.clone(),
            vegetation: inputs.vegetation_classes.iter().map(|c| vegetation_weight(c.as_deref())).sum(),
            lateral: inputs.lateral_risks,
            crossings: inputs.crossing_classes.iter().map(|c| crossing_weight(c.as_deref())).sum(),
        }
    }

    pub fn total(&self) -> usize {
        self.vegetation + self.lateral + self.crossings
    }
}

/// Weight of a vegetation risk class: critical or high 3, alert or medium 2, anything else 1
pub fn vegetation_weight(class: Option<&str>) -> usize {
    let class = class.map(|c| c.trim().to_lowercase()).unwrap_or_default();
    if class.starts_with("crit") || class.starts_with("alta") {
        3
    } else if class.starts_with("alert") || class.starts_with("med") {
        2
    } else {
        1
    }
}

/// Weight of a crossing risk class: critical 2, alert 1, anything else 0
pub fn crossing_weight(class: Option<&str>) -> usize {
    let class = class.map(|c| c.trim().to_lowercase()).unwrap_or_default();
    if class.starts_with("crit") {
        2
    } else if class.starts_with("alert") {
        1
    } else {
        0
    }
}

/// Selected span in the report
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedSpan {
    pub vao_id: SpanId,
    pub codigo_vao: String,
    pub risco_estimado: usize,
}

/// Before/after risk of treating the selected spans
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub linha_id: LineId,
    pub cenario_id: ScenarioId,
    pub total_vaos: usize,
    pub total_vaos_selecionados: usize,
    pub risco_atual: usize,
    pub risco_pos_tratamento: usize,
    pub reducao_absoluta: usize,
    pub reducao_percentual: f64,
    pub selecionados: Vec<SelectedSpan>,
}

/// Run the simulation against persisted risk records
pub async fn simulate<R: RiskReader + ?Sized>(
    reader: &R,
    request: &SimulationRequest,
) -> Result<SimulationReport> {
    request.validate()?;
    let inputs = reader.span_risk_inputs(request.line_id, request.scenario_id).await?;
    tracing::debug!(spans = inputs.len(), "Loaded span risk inputs");
    Ok(score_spans(request, &inputs))
}

/// Score spans and compute the report for the requested selection
pub fn score_spans(request: &SimulationRequest, inputs: &[SpanRiskInputs]) -> SimulationReport {
    let scores: Vec<SpanScore> = inputs.iter().map(SpanScore::from_inputs).collect();
    let current: usize = scores.iter().map(SpanScore::total).sum();

    let selected: Vec<&SpanScore> = if !request.span_ids.is_empty() {
        let wanted: HashSet<SpanId> = request.span_ids.iter().copied().collect();
        let selected: Vec<&SpanScore> = scores.iter().filter(|s| wanted.contains(&s.span_id)).collect();
        if selected.len() < wanted.len() {
            tracing::warn!(
                requested = wanted.len(),
                found = selected.len(),
                "Some selected spans do not belong to the scenario"
            );
        }
        selected
    } else if let Some(n) = request.top_n {
        let mut ranked: Vec<&SpanScore> = scores.iter().filter(|s| s.total() > 0).collect();
        ranked.sort_by(|a, b| b.total().cmp(&a.total()));
        ranked.truncate(n.max(1));
        ranked
    } else {
        scores.iter().collect()
    };

    let selected_risk: usize = selected.iter().map(|s| s.total()).sum();
    let after = current.saturating_sub(selected_risk);
    let reduction = current - after;

    SimulationReport {
        linha_id: request.line_id,
        cenario_id: request.scenario_id,
        total_vaos: scores.len(),
        total_vaos_selecionados: selected.len(),
        risco_atual: current,
        risco_pos_tratamento: after,
        reducao_absoluta: reduction,
        reducao_percentual: if current > 0 { reduction as f64 / current as f64 * 100.0 } else { 0.0 },
        selecionados: selected
            .iter()
            .map(|s| SelectedSpan {
                vao_id: s.span_id,
                codigo_vao: s.span_code.clone(),
                risco_estimado: s.total(),
            })
            .collect(),
    }
}
