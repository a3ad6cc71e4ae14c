use crate::cli::RunArgs;
use crate::config::PartialBenchmarkConfig;
use crate::error::{CliError, Result};
use crate::ui::{CliProgressHandler, UiEvent};
use catbench::{engine::progress::ProgressReporter, workflows};
use tokio::sync::mpsc;
use tracing::{info, warn};

pub async fn run(args: RunArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    let partial_config = PartialBenchmarkConfig::from_file(&args.config)?;
    let mut app_config = partial_config.merge_with_cli(&args)?;
    if app_config.potential.seeds > 1 {
        info!("Single-point runs use one calculator; ignoring the remaining seeds.");
    }
    app_config.potential.seeds = 1;
    let config = &app_config.core_config;

    let potential = app_config
        .potential
        .build(&config.mlp_name)?
        .into_iter()
        .next()
        .ok_or_else(|| CliError::Config("No calculator could be built.".to_string()))?;

    let progress_handler = CliProgressHandler::new(ui_sender);
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!(
        "Starting single-point evaluation of '{}' on '{}'...",
        config.mlp_name, config.benchmark
    );
    let result = tokio::task::block_in_place(|| {
        workflows::single_point::run(config, potential.as_ref(), &reporter)
    })?;

    println!(
        "Single-point evaluation complete: {} reaction(s) evaluated, {} failed.",
        result.report.succeeded.len(),
        result.report.failures.len()
    );
    for failure in &result.report.failures {
        warn!(key = %failure.key, "Reaction failed: {}", failure.error);
    }
    println!("✓ Results written to: {}", result.documents.result.display());

    Ok(())
}
