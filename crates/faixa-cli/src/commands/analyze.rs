//! Analyze command implementation

use crate::cli::{AnalyzeArgs, AnalyzeCommand, CrossingsArgs, FloodArgs};
use crate::output::OutputWriter;
use anyhow::{Context, Result};
use faixa_core::config::LayeredConfig;
use faixa_core::FaixaError;
use faixa_geo::{analyze_crossings, analyze_flood, CrossingRequest, FloodRequest};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tabled::Tabled;

#[derive(Tabled)]
struct StatRow {
    #[tabled(rename = "Statistic")]
    name: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled)]
struct BandRow {
    #[tabled(rename = "Radius (m)")]
    raio: f64,
    #[tabled(rename = "Structures")]
    total: usize,
    #[tabled(rename = "Protected")]
    com_protecao: usize,
    #[tabled(rename = "Unprotected")]
    sem_protecao: usize,
}

pub fn execute(args: AnalyzeArgs, config: LayeredConfig, output: &OutputWriter) -> Result<()> {
    match args.command {
        AnalyzeCommand::Crossings(args) => crossings(args, &config, output),
        AnalyzeCommand::Flood(args) => flood(args, &config, output),
    }
}

/// Read a JSON payload; malformed JSON is the caller's error
fn read_payload(path: &Path) -> Result<Value> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read payload {}", path.display()))?;
    let payload = serde_json::from_str(&content)
        .map_err(|e| FaixaError::parse(path.display().to_string(), e.to_string()))?;
    Ok(payload)
}

fn crossings(args: CrossingsArgs, config: &LayeredConfig, output: &OutputWriter) -> Result<()> {
    let payload = read_payload(&args.payload)?;
    let mut request = CrossingRequest::from_payload(&payload)?;
    if args.buffer_m.is_some() {
        request.buffer_m = args.buffer_m;
    }

    let report = analyze_crossings(&request, config.buffer_m.value)?;

    if output.is_json() {
        return output.result(report);
    }

    let stats = &report.estatisticas;
    output.section("Crossing Analysis");
    output.table(vec![
        StatRow { name: "Crossing features", value: stats.total_travessias.to_string() },
        StatRow { name: "Transmission crossings", value: stats.cruzamentos_transmissao.to_string() },
        StatRow { name: "MT crossings", value: stats.cruzamentos_mt.to_string() },
        StatRow { name: "Near transmission", value: stats.proximas_transmissao.to_string() },
        StatRow { name: "Near MT", value: stats.proximas_mt.to_string() },
        StatRow { name: "Buffer", value: format!("{} m", stats.buffer_m) },
    ]);
    Ok(())
}

fn flood(args: FloodArgs, config: &LayeredConfig, output: &OutputWriter) -> Result<()> {
    let payload = read_payload(&args.payload)?;
    let mut request = FloodRequest::from_payload(&payload)?;
    if !args.radii.is_empty() {
        request.raios = Some(args.radii);
    }
    if let Some(attribute) = args.attribute.filter(|a| !a.trim().is_empty()) {
        request.atributo_protecao = Some(attribute.trim().to_string());
    }

    let report = analyze_flood(&request, &config.risk_radii.value, &config.protection_attribute.value)?;

    if output.is_json() {
        return output.result(report);
    }

    output.section("Flood Proximity");
    output.kv(
        "Protection attribute",
        request.atributo_protecao.as_deref().unwrap_or(&config.protection_attribute.value),
    );
    let rows: Vec<BandRow> = report
        .series
        .iter()
        .map(|band| BandRow {
            raio: band.raio,
            total: band.total,
            com_protecao: band.com_protecao,
            sem_protecao: band.sem_protecao,
        })
        .collect();
    output.table(rows);
    Ok(())
}
