//! Config command implementation

use crate::output::OutputWriter;
use crate::output_types::{ConfigEntry, ConfigOutput};
use anyhow::Result;
use faixa_core::config::LayeredConfig;
use tabled::Tabled;

#[derive(Tabled)]
struct ConfigRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Source")]
    source: String,
}

pub fn execute(config: &LayeredConfig, output: &OutputWriter) -> Result<()> {
    let entries: ConfigOutput = config
        .to_inspection_map()
        .into_iter()
        .map(|(key, (value, source))| (key, ConfigEntry { value, source }))
        .collect();

    if output.is_json() {
        return output.result(entries);
    }

    output.section("Configuration");
    let rows: Vec<ConfigRow> = entries
        .into_iter()
        .map(|(key, entry)| ConfigRow { key, value: entry.value, source: format!("{:?}", entry.source) })
        .collect();
    output.table(rows);
    Ok(())
}
