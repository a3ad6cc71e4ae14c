use crate::cli::AnalyzeArgs;
use crate::error::Result;
use catbench::workflows::analysis::{self, AnalysisOptions};
use std::collections::BTreeSet;
use tracing::info;

pub async fn run(args: AnalyzeArgs) -> Result<()> {
    let options = AnalysisOptions {
        result_root: args.result_root.clone(),
        mlp_names: (!args.mlps.is_empty()).then(|| args.mlps.clone()),
        target_adsorbates: (!args.adsorbates.is_empty())
            .then(|| args.adsorbates.iter().cloned().collect::<BTreeSet<_>>()),
    };
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| args.result_root.join("analysis"));

    if args.single_point {
        let rows = tokio::task::block_in_place(|| analysis::analyze_single_points(&options))?;
        for row in &rows {
            println!("  {:<30} MAE {}  ({} reactions)", row.mlp_name, format_mae(row.mae), row.num_total);
        }
        let path = analysis::write_single_point_csv(&rows, &output_dir, &args.name)?;
        println!("✓ Single-point table written to: {}", path.display());
        return Ok(());
    }

    let report = tokio::task::block_in_place(|| analysis::analyze(&options))?;
    for mlp in &report.mlps {
        let summary = &mlp.summary;
        println!(
            "  {:<30} MAE {} (normal {})  anomaly ratio {:.1}%  ({} reactions)",
            summary.mlp_name,
            format_mae(summary.mae_total),
            format_mae(summary.mae_normal),
            summary.anomaly_ratio,
            summary.num_total
        );
    }

    let written = report.write_csv(&output_dir, &args.name)?;
    info!("Wrote {} analysis table(s).", written.len());
    println!("✓ Analysis tables written to: {}", output_dir.display());
    Ok(())
}

fn format_mae(mae: Option<f64>) -> String {
    mae.map_or_else(|| "-".to_string(), |v| format!("{v:.3} eV"))
}
