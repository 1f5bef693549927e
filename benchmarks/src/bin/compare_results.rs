use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use itertools::Itertools;
use tracing_subscriber::EnvFilter;

use benchmarks::compare::{self, percentage_change, ComparisonSummary};
use query_store::{LanguageSelector, LogType, LogTypeSelector, QueryStore, Selection};

/// Compare two exported statistics files (a baseline run and a variant run)
/// into a merged comparison CSV plus printed summary statistics.
#[derive(Parser)]
#[command(name = "compare_results")]
struct CompareResults {
    /// Statistics CSV of the baseline configuration.
    baseline: PathBuf,

    /// Statistics CSV of the variant configuration.
    variant: PathBuf,

    /// Path of the merged comparison CSV.
    #[arg(long, default_value = "comparison.csv")]
    output: PathBuf,

    /// Log type whose query text should be included in the output's Query
    /// column; omitted queries show N/A.
    #[arg(long)]
    log_type: Option<LogType>,

    /// Root of the query store used for query-text lookup.
    #[arg(long, default_value = "workloads")]
    workloads: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = CompareResults::parse();

    let baseline = compare::load_stats(&args.baseline)?;
    let variant = compare::load_stats(&args.variant)?;

    let query_texts = match args.log_type {
        Some(log_type) => {
            let selection = Selection::new(
                LogTypeSelector::One(log_type),
                LanguageSelector::Both,
            );
            match QueryStore::open(&args.workloads).and_then(|store| store.load(&selection)) {
                Ok(set) => Some(set),
                Err(e) => {
                    println!("Query text lookup unavailable ({e}), the Query column will show N/A");
                    None
                }
            }
        }
        None => {
            println!("No log type specified, the Query column will show N/A");
            None
        }
    };

    let (rows, summary) = compare::compare(&baseline, &variant, query_texts.as_ref());
    if rows.is_empty() {
        anyhow::bail!("no matching queries found to compare");
    }

    compare::write_comparison_csv(&args.output, &rows)
        .with_context(|| format!("failed to write {:?}", args.output))?;
    println!(
        "Compared {} queries, output written to {}",
        summary.matched,
        args.output.display()
    );

    print_summary(&summary);
    Ok(())
}

fn change_str(baseline: f64, variant: f64) -> String {
    match percentage_change(baseline, variant) {
        Some(change) => format!("{change:.2}%"),
        None => "N/A".to_owned(),
    }
}

fn print_summary(summary: &ComparisonSummary) {
    println!();
    println!("{}", "=".repeat(80));
    println!("SUMMARY STATISTICS");
    println!("{}", "=".repeat(80));

    if !summary.baseline_only.is_empty() {
        println!(
            "\nOnly in the baseline file (excluded): {}",
            summary.baseline_only.iter().join(", ")
        );
    }
    if !summary.variant_only.is_empty() {
        println!(
            "Only in the variant file (excluded): {}",
            summary.variant_only.iter().join(", ")
        );
    }

    if let Some((baseline, variant)) = &summary.aggregated {
        println!("\nAggregated Results:");
        println!("  Baseline Average Response Time: {:.2} ms", baseline.average_ms);
        println!("  Variant Average Response Time:  {:.2} ms", variant.average_ms);
        println!("  Change: {}", change_str(baseline.average_ms, variant.average_ms));

        println!("\n  Baseline Median Response Time: {:.2} ms", baseline.median_ms);
        println!("  Variant Median Response Time:  {:.2} ms", variant.median_ms);
        println!("  Change: {}", change_str(baseline.median_ms, variant.median_ms));

        println!("\n  Baseline Total Requests: {}", baseline.request_count);
        println!("  Variant Total Requests:  {}", variant.request_count);

        println!("\n  Baseline Requests/s: {:.2}", baseline.requests_per_sec);
        println!("  Variant Requests/s:  {:.2}", variant.requests_per_sec);
        println!(
            "  Change: {}",
            change_str(baseline.requests_per_sec, variant.requests_per_sec)
        );
    }

    if let Some(change) = summary.mean_median_change {
        println!("\n  Mean median latency change:  {change:.2}%");
    }
    if let Some(change) = summary.mean_average_change {
        println!("  Mean average latency change: {change:.2}%");
    }

    println!("\n  Query Performance Summary:");
    println!("    Baseline wins: {} queries", summary.baseline_wins);
    println!("    Variant wins:  {} queries", summary.variant_wins);
    if summary.ties > 0 {
        println!("    Ties:          {} queries", summary.ties);
    }

    println!("{}", "=".repeat(80));
}
