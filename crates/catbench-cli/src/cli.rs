use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "CatBench Developers",
    version,
    about = "CatBench CLI - Benchmark machine-learning interatomic potentials against DFT adsorption energies on catalytic surfaces.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Relax every reaction of a benchmark dataset over a seed ensemble and detect anomalies.
    Run(RunArgs),
    /// Evaluate every structure of a benchmark dataset once, without relaxation.
    Single(RunArgs),
    /// Compute MAE, anomaly ratios and per-adsorbate tables over finished runs.
    Analyze(AnalyzeArgs),
    /// Assemble a validated benchmark dataset from raw reaction exports.
    Prepare(PrepareArgs),
}

/// Arguments shared by the `run` and `single` subcommands.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the benchmark configuration file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Override the name of the potential under test.
    #[arg(short = 'n', long, value_name = "NAME")]
    pub mlp_name: Option<String>,

    /// Override the benchmark dataset name.
    #[arg(short, long, value_name = "NAME")]
    pub benchmark: Option<String>,

    /// Override the benchmark mode ('full' or 'adsorbate-only').
    #[arg(short, long, value_name = "MODE")]
    pub mode: Option<String>,

    /// Override the directory holding `<benchmark>.json` datasets.
    #[arg(long, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,

    /// Override the root directory of run outputs.
    #[arg(short, long, value_name = "PATH")]
    pub output_root: Option<PathBuf>,

    /// Override the pair parameter file of the reference potential.
    #[arg(short, long, value_name = "PATH")]
    pub params: Option<PathBuf>,

    /// Override the number of calculator seeds.
    #[arg(short, long, value_name = "INT")]
    pub seeds: Option<usize>,

    /// Skip relaxation logs, trajectories and structure snapshots.
    #[arg(long)]
    pub no_artifacts: bool,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S relaxation.f-crit=0.03
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `analyze` subcommand.
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Directory holding one sub-directory per benchmark run.
    #[arg(short, long, default_value = "result", value_name = "PATH")]
    pub result_root: PathBuf,

    /// Runs to analyze. Defaults to every run under the result root.
    #[arg(short, long = "mlp", value_name = "NAME", num_args(1..))]
    pub mlps: Vec<String>,

    /// Restrict the analysis to these adsorbates.
    #[arg(short, long = "adsorbate", value_name = "NAME", num_args(1..))]
    pub adsorbates: Vec<String>,

    /// Directory the CSV tables are written to. Defaults to `<result-root>/analysis`.
    #[arg(short, long, value_name = "PATH")]
    pub output_dir: Option<PathBuf>,

    /// Prefix of the CSV table names.
    #[arg(long, default_value = "catbench", value_name = "NAME")]
    pub name: String,

    /// Analyze single-point runs instead of relaxation runs.
    #[arg(long)]
    pub single_point: bool,
}

/// Arguments for the `prepare` subcommand.
#[derive(Args, Debug)]
pub struct PrepareArgs {
    /// JSON array of raw reactions (equation, reference energy, structures).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Name of the benchmark dataset to create.
    #[arg(short, long, required = true, value_name = "NAME")]
    pub benchmark: String,

    /// Directory the dataset is written to.
    #[arg(short, long, default_value = "raw_data", value_name = "PATH")]
    pub data_dir: PathBuf,

    /// Rename an adsorbate in every structure role. Can be used multiple times.
    /// Example: --integrate OHH=H2O
    #[arg(long = "integrate", value_name = "FROM=TO", num_args(0..))]
    pub integrations: Vec<String>,
}
