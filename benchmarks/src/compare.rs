//! Comparison of two exported statistics files (a baseline run and a variant
//! run), joined by query name.
//!
//! Rows present in only one input are reported and excluded, both from the
//! merged output and from the aggregate means; a malformed input file is
//! fatal. Per metric the percentage change is `(variant - baseline) /
//! baseline`, and the per-row winner is whichever side has the lower median
//! latency. The "Performance Improvement" column is measured against the
//! slower side, so swapping the two inputs swaps the labels but preserves
//! every magnitude.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use query_store::QuerySet;

use crate::stats::{StatsRow, AGGREGATED_ROW};

#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read stats file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("stats file {path:?} contains no data rows")]
    Empty { path: PathBuf },
}

/// Reads one statistics export, rejecting malformed or empty files.
pub fn load_stats(path: &Path) -> Result<Vec<StatsRow>, DataError> {
    let rows = crate::stats::read_stats_csv(path).map_err(|source| DataError::Read {
        path: path.to_owned(),
        source,
    })?;
    if rows.is_empty() {
        return Err(DataError::Empty {
            path: path.to_owned(),
        });
    }
    Ok(rows)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Winner {
    Baseline,
    Variant,
    Equal,
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Winner::Baseline => f.write_str("Baseline"),
            Winner::Variant => f.write_str("Variant"),
            Winner::Equal => f.write_str("Equal"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    #[serde(rename = "Query Name")]
    pub name: String,
    #[serde(rename = "Query")]
    pub query_text: String,
    #[serde(rename = "Better Performance")]
    pub winner: Winner,
    #[serde(rename = "Performance Improvement")]
    pub improvement: String,

    #[serde(rename = "Baseline Request Count")]
    pub baseline_requests: u64,
    #[serde(rename = "Variant Request Count")]
    pub variant_requests: u64,

    #[serde(rename = "Baseline Median (ms)")]
    pub baseline_median: f64,
    #[serde(rename = "Variant Median (ms)")]
    pub variant_median: f64,
    #[serde(rename = "Median Change")]
    pub median_change: String,

    #[serde(rename = "Baseline Average (ms)")]
    pub baseline_average: f64,
    #[serde(rename = "Variant Average (ms)")]
    pub variant_average: f64,
    #[serde(rename = "Average Change")]
    pub average_change: String,

    #[serde(rename = "Baseline Min (ms)")]
    pub baseline_min: f64,
    #[serde(rename = "Variant Min (ms)")]
    pub variant_min: f64,
    #[serde(rename = "Min Change")]
    pub min_change: String,

    #[serde(rename = "Baseline Max (ms)")]
    pub baseline_max: f64,
    #[serde(rename = "Variant Max (ms)")]
    pub variant_max: f64,
    #[serde(rename = "Max Change")]
    pub max_change: String,

    #[serde(rename = "Baseline 95% (ms)")]
    pub baseline_p95: f64,
    #[serde(rename = "Variant 95% (ms)")]
    pub variant_p95: f64,
    #[serde(rename = "95% Change")]
    pub p95_change: String,

    #[serde(rename = "Baseline 99% (ms)")]
    pub baseline_p99: f64,
    #[serde(rename = "Variant 99% (ms)")]
    pub variant_p99: f64,
    #[serde(rename = "99% Change")]
    pub p99_change: String,

    #[serde(rename = "Baseline Requests/s")]
    pub baseline_rps: f64,
    #[serde(rename = "Variant Requests/s")]
    pub variant_rps: f64,
    #[serde(rename = "Requests/s Change")]
    pub rps_change: String,

    #[serde(rename = "Baseline Failures")]
    pub baseline_failures: u64,
    #[serde(rename = "Variant Failures")]
    pub variant_failures: u64,
}

/// Percentage change from `baseline` to `variant`; `None` when the baseline
/// value is zero and the change is undefined.
pub fn percentage_change(baseline: f64, variant: f64) -> Option<f64> {
    if baseline == 0.0 {
        None
    } else {
        Some((variant - baseline) / baseline * 100.0)
    }
}

fn format_change(baseline: f64, variant: f64) -> String {
    match percentage_change(baseline, variant) {
        Some(change) => format!("{change:.2}%"),
        None => "N/A".to_owned(),
    }
}

/// Winner by lower median latency, and the improvement measured against the
/// slower side.
fn classify(baseline_median: f64, variant_median: f64) -> (Winner, String) {
    if variant_median < baseline_median {
        let improvement = (baseline_median - variant_median) / baseline_median * 100.0;
        (Winner::Variant, format!("{improvement:.2}% faster"))
    } else if baseline_median < variant_median {
        let improvement = (variant_median - baseline_median) / variant_median * 100.0;
        (Winner::Baseline, format!("{improvement:.2}% faster"))
    } else {
        (Winner::Equal, "Same performance".to_owned())
    }
}

#[derive(Debug, Default)]
pub struct ComparisonSummary {
    /// Matched data rows, the Aggregated row excluded.
    pub matched: usize,
    pub baseline_only: Vec<String>,
    pub variant_only: Vec<String>,
    pub baseline_wins: usize,
    pub variant_wins: usize,
    pub ties: usize,
    /// Mean of the per-query median deltas, where defined.
    pub mean_median_change: Option<f64>,
    /// Mean of the per-query average deltas, where defined.
    pub mean_average_change: Option<f64>,
    /// The two Aggregated rows, when both inputs carry one.
    pub aggregated: Option<(StatsRow, StatsRow)>,
}

/// Joins two runs by query name.
pub fn compare(
    baseline: &[StatsRow],
    variant: &[StatsRow],
    query_texts: Option<&QuerySet>,
) -> (Vec<ComparisonRow>, ComparisonSummary) {
    let baseline_map: std::collections::BTreeMap<&str, &StatsRow> =
        baseline.iter().map(|row| (row.name.as_str(), row)).collect();
    let variant_map: std::collections::BTreeMap<&str, &StatsRow> =
        variant.iter().map(|row| (row.name.as_str(), row)).collect();

    let mut names: Vec<&str> = baseline_map.keys().chain(variant_map.keys()).copied().collect();
    names.sort_unstable();
    names.dedup();

    let mut rows = Vec::new();
    let mut summary = ComparisonSummary::default();
    let mut median_changes = Vec::new();
    let mut average_changes = Vec::new();

    for name in names {
        let (b, v) = match (baseline_map.get(name), variant_map.get(name)) {
            (Some(b), Some(v)) => (*b, *v),
            (Some(_), None) => {
                warn!(query = name, "query missing from the variant file, excluded");
                summary.baseline_only.push(name.to_owned());
                continue;
            }
            (None, Some(_)) => {
                warn!(query = name, "query missing from the baseline file, excluded");
                summary.variant_only.push(name.to_owned());
                continue;
            }
            (None, None) => unreachable!("name came from one of the maps"),
        };

        let (winner, improvement) = classify(b.median_ms, v.median_ms);

        let query_text = if name == AGGREGATED_ROW {
            "N/A".to_owned()
        } else {
            query_texts
                .and_then(|set| set.get(name))
                .map(|query| query.display_text())
                .unwrap_or_else(|| "N/A".to_owned())
        };

        if name == AGGREGATED_ROW {
            summary.aggregated = Some((b.clone(), v.clone()));
        } else {
            summary.matched += 1;
            match winner {
                Winner::Baseline => summary.baseline_wins += 1,
                Winner::Variant => summary.variant_wins += 1,
                Winner::Equal => summary.ties += 1,
            }
            if let Some(change) = percentage_change(b.median_ms, v.median_ms) {
                median_changes.push(change);
            }
            if let Some(change) = percentage_change(b.average_ms, v.average_ms) {
                average_changes.push(change);
            }
        }

        rows.push(ComparisonRow {
            name: name.to_owned(),
            query_text,
            winner,
            improvement,
            baseline_requests: b.request_count,
            variant_requests: v.request_count,
            baseline_median: b.median_ms,
            variant_median: v.median_ms,
            median_change: format_change(b.median_ms, v.median_ms),
            baseline_average: b.average_ms,
            variant_average: v.average_ms,
            average_change: format_change(b.average_ms, v.average_ms),
            baseline_min: b.min_ms,
            variant_min: v.min_ms,
            min_change: format_change(b.min_ms, v.min_ms),
            baseline_max: b.max_ms,
            variant_max: v.max_ms,
            max_change: format_change(b.max_ms, v.max_ms),
            baseline_p95: b.p95_ms,
            variant_p95: v.p95_ms,
            p95_change: format_change(b.p95_ms, v.p95_ms),
            baseline_p99: b.p99_ms,
            variant_p99: v.p99_ms,
            p99_change: format_change(b.p99_ms, v.p99_ms),
            baseline_rps: b.requests_per_sec,
            variant_rps: v.requests_per_sec,
            rps_change: format_change(b.requests_per_sec, v.requests_per_sec),
            baseline_failures: b.failure_count,
            variant_failures: v.failure_count,
        });
    }

    summary.mean_median_change = mean(&median_changes);
    summary.mean_average_change = mean(&average_changes);

    (rows, summary)
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

pub fn write_comparison_csv(path: &Path, rows: &[ComparisonRow]) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_comparison_csv(path: &Path) -> Result<Vec<ComparisonRow>, DataError> {
    let mut reader = csv::Reader::from_path(path).map_err(|source| DataError::Read {
        path: path.to_owned(),
        source,
    })?;
    let rows: Result<Vec<ComparisonRow>, csv::Error> = reader.deserialize().collect();
    let rows = rows.map_err(|source| DataError::Read {
        path: path.to_owned(),
        source,
    })?;
    if rows.is_empty() {
        return Err(DataError::Empty {
            path: path.to_owned(),
        });
    }
    Ok(rows)
}

/// Extracts the numeric part of a "Performance Improvement" cell, e.g.
/// `6.90% faster` → `6.90`. `Same performance` and anything unparseable map
/// to zero.
pub fn improvement_percent(improvement: &str) -> f64 {
    improvement
        .split('%')
        .next()
        .and_then(|head| head.trim().parse::<f64>().ok())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use test_strategy::proptest;

    use super::*;

    fn stats_row(name: &str, median: f64, average: f64) -> StatsRow {
        StatsRow {
            name: name.to_owned(),
            request_count: 100,
            failure_count: 0,
            median_ms: median,
            average_ms: average,
            min_ms: median / 2.0,
            max_ms: median * 3.0,
            requests_per_sec: 10.0,
            p95_ms: median * 2.0,
            p99_ms: median * 2.5,
        }
    }

    #[test]
    fn variant_with_lower_median_wins() {
        let baseline = vec![stats_row("vpc/01_count_all", 87.0, 90.0)];
        let variant = vec![stats_row("vpc/01_count_all", 81.0, 85.0)];

        let (rows, summary) = compare(&baseline, &variant, None);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.winner, Winner::Variant);
        assert_eq!(row.improvement, "6.90% faster");
        // (81 - 87) / 87 ≈ -6.9%
        assert_eq!(row.median_change, "-6.90%");
        assert_eq!(summary.variant_wins, 1);
        assert_eq!(summary.baseline_wins, 0);
    }

    #[test]
    fn equal_medians_tie() {
        let baseline = vec![stats_row("waf/01_count_all", 50.0, 52.0)];
        let variant = vec![stats_row("waf/01_count_all", 50.0, 51.0)];

        let (rows, summary) = compare(&baseline, &variant, None);
        assert_eq!(rows[0].winner, Winner::Equal);
        assert_eq!(rows[0].improvement, "Same performance");
        assert_eq!(summary.ties, 1);
    }

    #[test]
    fn zero_baseline_metric_yields_not_applicable() {
        let mut baseline = vec![stats_row("waf/01_count_all", 0.0, 0.0)];
        baseline[0].requests_per_sec = 0.0;
        let variant = vec![stats_row("waf/01_count_all", 10.0, 11.0)];

        let (rows, _) = compare(&baseline, &variant, None);
        assert_eq!(rows[0].median_change, "N/A");
        assert_eq!(rows[0].average_change, "N/A");
        assert_eq!(rows[0].rps_change, "N/A");
    }

    #[test]
    fn mismatched_rows_are_reported_and_excluded() {
        let baseline = vec![
            stats_row("vpc/01_count_all", 87.0, 90.0),
            stats_row("vpc/02_count_by_action", 40.0, 44.0),
        ];
        let variant = vec![
            stats_row("vpc/01_count_all", 81.0, 85.0),
            stats_row("vpc/03_top_source_addresses", 60.0, 61.0),
        ];

        let (rows, summary) = compare(&baseline, &variant, None);
        assert_eq!(rows.len(), 1);
        assert_eq!(summary.matched, 1);
        assert_eq!(summary.baseline_only, vec!["vpc/02_count_by_action"]);
        assert_eq!(summary.variant_only, vec!["vpc/03_top_source_addresses"]);
    }

    #[test]
    fn aggregated_row_is_kept_out_of_win_counts() {
        let baseline = vec![
            stats_row("vpc/01_count_all", 87.0, 90.0),
            stats_row(AGGREGATED_ROW, 87.0, 90.0),
        ];
        let variant = vec![
            stats_row("vpc/01_count_all", 81.0, 85.0),
            stats_row(AGGREGATED_ROW, 81.0, 85.0),
        ];

        let (rows, summary) = compare(&baseline, &variant, None);
        assert_eq!(rows.len(), 2);
        assert_eq!(summary.matched, 1);
        assert_eq!(summary.variant_wins, 1);
        assert!(summary.aggregated.is_some());
        let aggregated = rows.iter().find(|r| r.name == AGGREGATED_ROW).unwrap();
        assert_eq!(aggregated.query_text, "N/A");
    }

    #[test]
    fn query_text_enrichment_uses_the_store() {
        let store = query_store::QueryStore::open("workloads").unwrap();
        let set = store
            .load(&query_store::Selection::new(
                query_store::LogTypeSelector::One(query_store::LogType::Vpc),
                query_store::LanguageSelector::One(query_store::QueryLanguage::Ppl),
            ))
            .unwrap();

        let baseline = vec![stats_row("vpc/01_count_all", 87.0, 90.0)];
        let variant = vec![stats_row("vpc/01_count_all", 81.0, 85.0)];

        let (rows, _) = compare(&baseline, &variant, Some(&set));
        assert_eq!(rows[0].query_text, "source=vpc_flow_logs | stats count()");
    }

    #[test]
    fn comparison_csv_round_trips() {
        let baseline = vec![
            stats_row("vpc/01_count_all", 87.0, 90.0),
            stats_row(AGGREGATED_ROW, 87.0, 90.0),
        ];
        let variant = vec![
            stats_row("vpc/01_count_all", 81.0, 85.0),
            stats_row(AGGREGATED_ROW, 81.0, 85.0),
        ];
        let (rows, _) = compare(&baseline, &variant, None);

        let dir = temp_dir::TempDir::new().unwrap();
        let path = dir.path().join("comparison.csv");
        write_comparison_csv(&path, &rows).unwrap();
        let read_back = read_comparison_csv(&path).unwrap();
        assert_eq!(read_back, rows);
    }

    #[test]
    fn improvement_percent_parses_cells() {
        assert_eq!(improvement_percent("6.90% faster"), 6.9);
        assert_eq!(improvement_percent("Same performance"), 0.0);
    }

    #[proptest]
    fn swapping_inputs_swaps_labels_and_preserves_magnitudes(
        #[strategy(1.0f64..10_000.0)] baseline_median: f64,
        #[strategy(1.0f64..10_000.0)] variant_median: f64,
    ) {
        let baseline = vec![stats_row("vpc/01_count_all", baseline_median, baseline_median)];
        let variant = vec![stats_row("vpc/01_count_all", variant_median, variant_median)];

        let (forward, _) = compare(&baseline, &variant, None);
        let (reversed, _) = compare(&variant, &baseline, None);

        match (forward[0].winner, reversed[0].winner) {
            (Winner::Variant, Winner::Baseline) | (Winner::Baseline, Winner::Variant) => {}
            (Winner::Equal, Winner::Equal) => {}
            (a, b) => panic!("winner labels did not swap: {a} / {b}"),
        }

        // The improvement is measured against the slower side, so its
        // magnitude is direction-independent.
        prop_assert_eq!(&forward[0].improvement, &reversed[0].improvement);
    }
}
