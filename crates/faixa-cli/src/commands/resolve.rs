//! Resolve command implementation

use crate::cli::ResolveArgs;
use crate::output::OutputWriter;
use crate::output_types::ResolveOutput;
use anyhow::Result;
use faixa_core::models::FileRole;
use faixa_etl::{resolve_dataset_dir, resolve_files};
use tabled::Tabled;

#[derive(Tabled)]
struct RoleRow {
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "File")]
    file: String,
}

pub fn execute(args: ResolveArgs, output: &OutputWriter) -> Result<()> {
    let dir = resolve_dataset_dir(&args.path)?;
    let files = resolve_files(&dir, &args.files.overrides())?;

    let missing: Vec<String> = FileRole::ALL
        .iter()
        .filter(|role| !files.contains(**role))
        .map(|role| role.to_string())
        .collect();

    if output.is_json() {
        return output.result(ResolveOutput { directory: dir.display().to_string(), files, missing });
    }

    output.section("Dataset Files");
    output.kv("Directory", dir.display());

    let rows: Vec<RoleRow> = FileRole::ALL
        .iter()
        .map(|role| RoleRow {
            role: role.to_string(),
            file: files
                .get(*role)
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    output.table(rows);

    if files.is_empty() {
        output.warning("No survey files matched any role");
    } else if !missing.is_empty() {
        output.info(format!("Unresolved roles: {}", missing.join(", ")));
    }

    Ok(())
}
