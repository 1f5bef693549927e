use std::path::{Path, PathBuf};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use benchmarks::{compare, graph};

/// Render the charts for a comparison CSV produced by compare_results.
#[derive(Parser)]
#[command(name = "visualize_results")]
struct VisualizeResults {
    /// The comparison CSV to render.
    input: PathBuf,

    /// Directory to write the charts into. Defaults to a `visualizations`
    /// directory next to the input file.
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = VisualizeResults::parse();

    let rows = compare::read_comparison_csv(&args.input)?;
    let out_dir = args.out_dir.unwrap_or_else(|| {
        args.input
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("visualizations")
    });

    let written = graph::render_all(&rows, &out_dir)?;
    println!("Wrote {} charts to {}", written.len(), out_dir.display());
    for path in written {
        println!("  {}", path.display());
    }
    Ok(())
}
