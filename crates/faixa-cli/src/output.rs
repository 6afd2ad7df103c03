use console::style;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Display;
use tabled::{settings::Style, Table, Tabled};

/// Output format mode
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    Human,
    Json,
}

/// `{"status": ..., "data": ...}` wrapper printed in JSON mode
pub fn envelope<T: Serialize>(status: &str, data: T) -> serde_json::Result<Value> {
    Ok(serde_json::json!({
        "status": status,
        "data": serde_json::to_value(data)?,
    }))
}

fn message_envelope(status: &str, message: impl Display) -> String {
    let output = serde_json::json!({
        "status": status,
        "message": message.to_string(),
    });
    serde_json::to_string_pretty(&output).unwrap_or_else(|_| output.to_string())
}

pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    pub fn new(json: bool) -> Self {
        Self {
            format: if json {
                OutputFormat::Json
            } else {
                OutputFormat::Human
            },
        }
    }

    pub fn info(&self, message: impl Display) {
        match self.format {
            OutputFormat::Human => {
                println!("{} {}", style("ℹ").blue().bold(), message);
            }
            OutputFormat::Json => {}
        }
    }

    pub fn warning(&self, message: impl Display) {
        match self.format {
            OutputFormat::Human => {
                eprintln!("{} {}", style("⚠").yellow().bold(), message);
            }
            OutputFormat::Json => {
                eprintln!("{}", message_envelope("warning", message));
            }
        }
    }

    pub fn error(&self, message: impl Display) {
        match self.format {
            OutputFormat::Human => {
                eprintln!("{} {}", style("✗").red().bold(), message);
            }
            OutputFormat::Json => {
                eprintln!("{}", message_envelope("error", message));
            }
        }
    }

    /// Human mode only; JSON callers emit the same rows through `result`
    pub fn table<T: Tabled>(&self, data: Vec<T>) {
        if let OutputFormat::Human = self.format {
            if data.is_empty() {
                println!("{}", style("(no data)").dim());
            } else {
                let mut table = Table::new(data);
                table.with(Style::rounded());
                println!("{}", table);
            }
        }
    }

    pub fn result<T: Serialize>(&self, data: T) -> anyhow::Result<()> {
        match self.format {
            OutputFormat::Human => {
                println!("{}", serde_json::to_string_pretty(&data)?);
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&envelope("success", data)?)?);
            }
        }
        Ok(())
    }

    pub fn kv(&self, key: impl Display, value: impl Display) {
        if let OutputFormat::Human = self.format {
            println!("{}: {}", style(key).bold(), value);
        }
    }

    pub fn section(&self, title: impl Display) {
        if let OutputFormat::Human = self.format {
            println!("\n{}", style(title).bold().underlined());
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Sample {
        total: usize,
    }

    #[test]
    fn test_envelope_shape() {
        let value = envelope("success", Sample { total: 3 }).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["data"]["total"], 3);
    }

    #[test]
    fn test_message_envelope_is_json() {
        let text = message_envelope("error", "line_code: cannot be empty");
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["message"], "line_code: cannot be empty");
    }
}
