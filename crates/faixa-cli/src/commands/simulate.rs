//! Simulate command implementation

use crate::cli::{SimulateArgs, StorageBackend};
use crate::output::OutputWriter;
use crate::storage::Storage;
use anyhow::Result;
use faixa_core::config::LayeredConfig;
use faixa_core::FaixaError;
use faixa_etl::{simulate, SimulationReport, SimulationRequest};
use tabled::Tabled;

#[derive(Tabled)]
struct SelectedRow {
    #[tabled(rename = "Span")]
    code: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Risk")]
    risk: usize,
}

pub async fn execute(
    args: SimulateArgs,
    backend: StorageBackend,
    config: LayeredConfig,
    output: &OutputWriter,
) -> Result<()> {
    if backend == StorageBackend::Memory {
        return Err(FaixaError::invalid_parameter(
            "storage",
            "simulate reads persisted risk records; use --storage postgres, \
             or run `faixa import --simulate-top-n N` to simulate right after an import",
        )
        .into());
    }

    let mut request = SimulationRequest::new(args.line_id, args.scenario_id);
    request.span_ids = args.span_ids;
    request.top_n = args.top_n;
    request.validate()?;

    let storage = Storage::open(backend, &config).await?;
    let report = simulate(storage.reader(), &request).await?;

    if output.is_json() {
        return output.result(report);
    }

    print_report(&report, output);
    Ok(())
}

pub(super) fn print_report(report: &SimulationReport, output: &OutputWriter) {
    output.section("Treatment Simulation");
    output.kv("Spans", report.total_vaos);
    output.kv("Selected", report.total_vaos_selecionados);
    output.kv("Current risk", report.risco_atual);
    output.kv("Risk after treatment", report.risco_pos_tratamento);
    output.kv(
        "Reduction",
        format!("{} ({:.1}%)", report.reducao_absoluta, report.reducao_percentual),
    );

    let rows: Vec<SelectedRow> = report
        .selecionados
        .iter()
        .map(|s| SelectedRow { code: s.codigo_vao.clone(), id: s.vao_id.to_string(), risk: s.risco_estimado })
        .collect();
    output.table(rows);
}
