//! Faixa CLI - Command-line interface
//!
//! Imports corridor survey datasets and runs the standalone spatial-risk
//! analyses. Logs go to stderr so `--json` output on stdout stays parseable.

mod cli;
mod commands;
mod output;
mod output_types;
mod progress;
mod storage;

use std::process::ExitCode;

use clap::Parser;
use cli::Cli;
use faixa_core::FaixaError;
use output::OutputWriter;

fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output = OutputWriter::new(cli.json);

    let result = tokio::runtime::Runtime::new()
        .map_err(anyhow::Error::from)
        .and_then(|runtime| runtime.block_on(commands::execute(cli, &output)));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output.error(format!("{:#}", err));
            ExitCode::from(exit_code(&err))
        }
    }
}

/// 2 for errors caused by the caller's input, 1 for everything else
fn exit_code(err: &anyhow::Error) -> u8 {
    let client = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<FaixaError>())
        .is_some_and(FaixaError::is_client_error);
    if client {
        2
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_exit_code_for_client_errors() {
        let err = anyhow::Error::from(FaixaError::invalid_parameter("top_n", "must be at least 1"));
        assert_eq!(exit_code(&err), 2);

        let err: anyhow::Result<()> = Err(FaixaError::parse("vao.csv", "bad row")).context("import failed");
        assert_eq!(exit_code(&err.unwrap_err()), 2);
    }

    #[test]
    fn test_exit_code_for_other_errors() {
        let err = anyhow::Error::from(FaixaError::persistence("commit", "connection reset"));
        assert_eq!(exit_code(&err), 1);
        assert_eq!(exit_code(&anyhow::anyhow!("plain failure")), 1);
    }
}
