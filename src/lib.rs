pub mod cli;
pub mod config;
pub mod db;
pub mod models;
pub mod pipeline;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use pipeline::{describe_error, run_import, CancelFlag, PipelineError, RunSummary};

/// Command-line entry point.
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter(cli.verbose))),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let summary_json = cli.summary_json;
    let config = cli.into_config();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancelFlag::new();
    let result = runtime.block_on(async {
        let signal_cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, stopping after the current statement");
                signal_cancel.cancel();
            }
        });

        let worker_cancel = cancel.clone();
        tokio::task::spawn_blocking(move || run_import(&config, &worker_cancel))
            .await
            .map_err(|e| PipelineError::Join(e.to_string()))?
    });

    match result {
        Ok(summary) => {
            tracing::info!(
                mode = summary.mode.as_str(),
                elapsed_ms = summary.elapsed_ms,
                "Import completed"
            );
            if summary_json {
                print_summary(&summary);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %describe_error(&e), "Import failed");
            ExitCode::FAILURE
        }
    }
}

fn print_summary(summary: &RunSummary) {
    match serde_json::to_string_pretty(summary) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::error!(error = %e, "Failed to serialize run summary"),
    }
}
