use crate::cli::PrepareArgs;
use crate::error::{CliError, Result};
use crate::utils::parser;
use catbench::core::models::dataset::{RawReaction, assemble_dataset};
use indexmap::IndexMap;
use tracing::{info, warn};

pub async fn run(args: PrepareArgs) -> Result<()> {
    let integrations = parse_integrations(&args.integrations)?;

    info!("Loading raw reactions from {:?}", &args.input);
    let content = std::fs::read_to_string(&args.input)?;
    let raw_reactions: Vec<RawReaction> =
        serde_json::from_str(&content).map_err(|e| CliError::FileParsing {
            path: args.input.clone(),
            source: e.into(),
        })?;
    let total = raw_reactions.len();

    let (dataset, rejected) =
        assemble_dataset(Some(args.benchmark.clone()), raw_reactions, &integrations);
    for reaction in &rejected {
        warn!(
            index = reaction.index,
            key = %reaction.base_key,
            "Reaction rejected: {}",
            reaction.reason
        );
    }

    let path = args.data_dir.join(format!("{}.json", args.benchmark));
    dataset.save(&path)?;
    println!(
        "✓ Dataset '{}' with {} of {} reaction(s) written to: {}",
        args.benchmark,
        dataset.len(),
        total,
        path.display()
    );
    Ok(())
}

fn parse_integrations(pairs: &[String]) -> Result<IndexMap<String, String>> {
    pairs
        .iter()
        .map(|pair| {
            parser::parse_key_value(pair)
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .map_err(|e| CliError::Argument(e.to_string()))
        })
        .collect()
}
