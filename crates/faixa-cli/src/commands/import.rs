//! Import command implementation

use crate::cli::{ImportArgs, StorageBackend};
use crate::output::OutputWriter;
use crate::output_types::{DryRunOutput, ImportOutput};
use crate::progress::{create_spinner, finish_error, finish_success};
use crate::storage::Storage;
use anyhow::Result;
use faixa_core::config::{CliConfigOverrides, LayeredConfig};
use faixa_core::models::{NormalizationSummary, StageCounters};
use faixa_etl::{preview_import, simulate, ImportOptions, SimulationRequest};
use tabled::Tabled;

use super::simulate::print_report;

#[derive(Tabled)]
struct CountRow {
    #[tabled(rename = "Item")]
    item: &'static str,
    #[tabled(rename = "Count")]
    count: usize,
}

fn import_options(args: &ImportArgs) -> ImportOptions {
    let mut options = ImportOptions::new(&args.path, args.line_code.clone(), args.scenario.clone());
    options.line_name = args.line_name.clone();
    options.concessionaire = args.concessionaire.clone();
    options.region = args.region.clone();
    options.voltage_kv = args.voltage_kv;
    options.scenario_type = args.scenario_type;
    options.scenario_status = args.scenario_status;
    options.scenario_date = args.scenario_date;
    options.created_by = args.created_by.clone();
    options.file_overrides = args.files.overrides();
    options.crossing_layers = args.crossing_layers.clone();
    options
}

pub async fn execute(
    args: ImportArgs,
    backend: StorageBackend,
    mut config: LayeredConfig,
    output: &OutputWriter,
) -> Result<()> {
    config.update_from_cli(CliConfigOverrides { clearance_m: args.clearance_m, ..Default::default() });
    let options = import_options(&args);

    if args.dry_run {
        let preview = preview_import(&options).await?;
        if output.is_json() {
            return output.result(DryRunOutput { dry_run: true, preview });
        }

        output.section("Dry Run");
        output.kv("Dataset", options.dataset_path.display());
        for (role, path) in preview.files.iter() {
            output.kv(role, path.display());
        }
        output.table(stage_rows(&preview.stage));
        output.info("Nothing was written; run without --dry-run to import");
        return Ok(());
    }

    let storage = Storage::open(backend, &config).await?;
    if !storage.is_persistent() {
        output.warning("Using in-memory storage: imported records are discarded when the command exits");
    }

    let spinner = create_spinner(&format!("Importing {}", options.dataset_path.display()), !output.is_json());
    let report = match storage.import(&options, &config).await {
        Ok(report) => {
            finish_success(&spinner, "Import completed");
            report
        }
        Err(err) => {
            finish_error(&spinner, "Import failed");
            return Err(err.into());
        }
    };

    let simulation = match args.simulate_top_n {
        Some(n) => {
            let mut request = SimulationRequest::new(report.normalize.line_id, report.normalize.scenario_id);
            request.top_n = Some(n);
            Some(simulate(storage.reader(), &request).await?)
        }
        None => None,
    };

    if output.is_json() {
        return output.result(ImportOutput { report, simulation });
    }

    output.section("Import");
    output.kv("Dataset", report.dataset_id);
    output.kv("Line", format!("{} ({})", options.line_code.trim(), report.normalize.line_id));
    output.kv("Scenario", format!("{} ({})", options.scenario_description.trim(), report.normalize.scenario_id));

    output.section("Staged");
    output.table(stage_rows(&report.stage));

    output.section("Normalized");
    output.table(summary_rows(&report.normalize));

    if let Some(simulation) = simulation {
        print_report(&simulation, output);
    }

    Ok(())
}

fn stage_rows(counters: &StageCounters) -> Vec<CountRow> {
    vec![
        CountRow { item: "Line features", count: counters.line_features },
        CountRow { item: "Structure features", count: counters.structure_features },
        CountRow { item: "Treated features", count: counters.treated_features },
        CountRow { item: "Vegetation rows", count: counters.vegetation_rows },
        CountRow { item: "Vegetation risk rows", count: counters.vegetation_risk_rows },
        CountRow { item: "Lateral risk rows", count: counters.lateral_risk_rows },
        CountRow { item: "Crossing rows", count: counters.crossing_rows },
    ]
}

fn summary_rows(summary: &NormalizationSummary) -> Vec<CountRow> {
    vec![
        CountRow { item: "Structures", count: summary.structures_upserted },
        CountRow { item: "Spans", count: summary.spans_generated },
        CountRow { item: "Trees", count: summary.trees_upserted },
        CountRow { item: "Vegetation risks", count: summary.vegetation_risks },
        CountRow { item: "Lateral fall risks", count: summary.lateral_risks },
        CountRow { item: "Crossings", count: summary.crossings_recorded },
        CountRow { item: "Treatments", count: summary.treatments_recorded },
    ]
}
