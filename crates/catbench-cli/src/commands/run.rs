use crate::cli::RunArgs;
use crate::config::PartialBenchmarkConfig;
use crate::error::Result;
use crate::ui::{CliProgressHandler, UiEvent};
use catbench::{engine::progress::ProgressReporter, workflows};
use tokio::sync::mpsc;
use tracing::{info, warn};

pub async fn run(args: RunArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    let partial_config = PartialBenchmarkConfig::from_file(&args.config)?;
    info!("Merging configuration from file and CLI arguments...");
    let app_config = partial_config.merge_with_cli(&args)?;
    let config = &app_config.core_config;

    info!(
        "Building {} calculator seed(s) from {:?}",
        app_config.potential.seeds, &app_config.potential.params_path
    );
    let potentials = app_config.potential.build(&config.mlp_name)?;

    let progress_handler = CliProgressHandler::new(ui_sender);
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!(
        "Starting {} benchmark of '{}' on '{}' with {} seed(s)...",
        config.mode,
        config.mlp_name,
        config.benchmark,
        potentials.len()
    );
    info!("Invoking the core benchmark workflow...");

    let result =
        tokio::task::block_in_place(|| workflows::benchmark::run(config, &potentials, &reporter))?;

    println!(
        "Benchmark complete: {} reaction(s) evaluated ({} normal, {} anomalous), {} failed.",
        result.report.succeeded.len(),
        result.accumulator.normal.len(),
        result.accumulator.anomaly.len(),
        result.report.failures.len()
    );
    for failure in &result.report.failures {
        warn!(key = %failure.key, "Reaction failed: {}", failure.error);
    }
    println!("✓ Results written to: {}", result.documents.result.display());

    Ok(())
}
