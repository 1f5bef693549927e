//! Chart rendering for comparison exports.
//!
//! Pure presentation: reads the comparator's merged rows and writes one PNG
//! per chart type into an output directory. Nothing here feeds back into any
//! computation.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use plotters::prelude::*;
use plotters::style::FontTransform;
use tracing::warn;

use crate::compare::{improvement_percent, ComparisonRow, Winner};
use crate::stats::AGGREGATED_ROW;

const BASELINE_COLOR: RGBColor = RGBColor(46, 134, 171);
const VARIANT_COLOR: RGBColor = RGBColor(162, 59, 114);
const TIE_COLOR: RGBColor = RGBColor(120, 120, 120);
const CHART_SIZE: (u32, u32) = (1280, 720);

/// Every file a complete render produces.
pub const CHART_FILES: &[&str] = &[
    "median_comparison.png",
    "performance_improvement.png",
    "p95_comparison.png",
    "p99_comparison.png",
    "requests_per_second.png",
    "winner_summary.png",
    "aggregated_summary.png",
];

/// Renders the full chart set into `out_dir`, returning the files written.
pub fn render_all(rows: &[ComparisonRow], out_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create output directory {out_dir:?}"))?;

    let per_query: Vec<&ComparisonRow> =
        rows.iter().filter(|row| row.name != AGGREGATED_ROW).collect();
    let aggregated = rows.iter().find(|row| row.name == AGGREGATED_ROW);
    let labels: Vec<String> = per_query.iter().map(|row| short_name(&row.name)).collect();

    let mut written = Vec::new();
    let mut grouped = |file: &str, title: &str, y_desc: &str, values: Vec<(f64, f64)>| {
        let path = out_dir.join(file);
        let (baseline, variant): (Vec<f64>, Vec<f64>) = values.into_iter().unzip();
        grouped_bar_chart(&path, title, y_desc, &labels, &baseline, &variant)?;
        written.push(path);
        anyhow::Ok(())
    };

    grouped(
        "median_comparison.png",
        "Median Response Time: Baseline vs Variant (Lower is Better)",
        "Median Response Time (ms)",
        per_query.iter().map(|r| (r.baseline_median, r.variant_median)).collect(),
    )?;
    grouped(
        "p95_comparison.png",
        "95th Percentile Response Time (Lower is Better)",
        "95th Percentile Response Time (ms)",
        per_query.iter().map(|r| (r.baseline_p95, r.variant_p95)).collect(),
    )?;
    grouped(
        "p99_comparison.png",
        "99th Percentile Response Time (Lower is Better)",
        "99th Percentile Response Time (ms)",
        per_query.iter().map(|r| (r.baseline_p99, r.variant_p99)).collect(),
    )?;
    grouped(
        "requests_per_second.png",
        "Throughput: Requests per Second (Higher is Better)",
        "Requests per Second",
        per_query.iter().map(|r| (r.baseline_rps, r.variant_rps)).collect(),
    )?;

    let path = out_dir.join("performance_improvement.png");
    improvement_chart(&path, &per_query, &labels)?;
    written.push(path);

    let path = out_dir.join("winner_summary.png");
    winner_chart(&path, &per_query)?;
    written.push(path);

    match aggregated {
        Some(row) => {
            let path = out_dir.join("aggregated_summary.png");
            grouped_bar_chart(
                &path,
                "Overall Performance Summary (Aggregated Results)",
                "Response Time (ms)",
                &[
                    "Median".to_owned(),
                    "Average".to_owned(),
                    "95%".to_owned(),
                    "99%".to_owned(),
                    "Max".to_owned(),
                ],
                &[
                    row.baseline_median,
                    row.baseline_average,
                    row.baseline_p95,
                    row.baseline_p99,
                    row.baseline_max,
                ],
                &[
                    row.variant_median,
                    row.variant_average,
                    row.variant_p95,
                    row.variant_p99,
                    row.variant_max,
                ],
            )?;
            written.push(path);
        }
        None => warn!("no Aggregated row in the comparison, skipping the summary chart"),
    }

    Ok(written)
}

/// Chart label for a query: the file stem without its log-type prefix.
fn short_name(name: &str) -> String {
    name.rsplit('/').next().unwrap_or(name).to_owned()
}

fn grouped_bar_chart(
    path: &Path,
    title: &str,
    y_desc: &str,
    labels: &[String],
    baseline: &[f64],
    variant: &[f64],
) -> anyhow::Result<()> {
    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let n = labels.len();
    let y_max = baseline
        .iter()
        .chain(variant)
        .fold(1.0f64, |acc, v| acc.max(*v))
        * 1.15;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 26))
        .margin(16)
        .x_label_area_size(150)
        .y_label_area_size(70)
        .build_cartesian_2d((0..n).into_segmented(), 0f64..y_max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n.max(1))
        .x_label_formatter(&|value| match value {
            SegmentValue::CenterOf(idx) => labels.get(*idx).cloned().unwrap_or_default(),
            _ => String::new(),
        })
        .x_label_style(("sans-serif", 12).into_font().transform(FontTransform::Rotate90))
        .y_desc(y_desc)
        .draw()?;

    chart
        .draw_series(baseline.iter().enumerate().map(|(idx, value)| {
            Rectangle::new(
                [
                    (SegmentValue::Exact(idx), 0.0),
                    (SegmentValue::CenterOf(idx), *value),
                ],
                BASELINE_COLOR.filled(),
            )
        }))?
        .label("Baseline")
        .legend(|(x, y)| Rectangle::new([(x, y - 6), (x + 12, y + 6)], BASELINE_COLOR.filled()));

    chart
        .draw_series(variant.iter().enumerate().map(|(idx, value)| {
            Rectangle::new(
                [
                    (SegmentValue::CenterOf(idx), 0.0),
                    (SegmentValue::Exact(idx + 1), *value),
                ],
                VARIANT_COLOR.filled(),
            )
        }))?
        .label("Variant")
        .legend(|(x, y)| Rectangle::new([(x, y - 6), (x + 12, y + 6)], VARIANT_COLOR.filled()));

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

/// Signed improvement bars: variant-faster rows point down, baseline-faster
/// rows point up, matching the bar colors of the other charts.
fn improvement_chart(
    path: &Path,
    per_query: &[&ComparisonRow],
    labels: &[String],
) -> anyhow::Result<()> {
    let values: Vec<(f64, RGBColor)> = per_query
        .iter()
        .map(|row| {
            let pct = improvement_percent(&row.improvement);
            match row.winner {
                Winner::Variant => (-pct, VARIANT_COLOR),
                Winner::Baseline => (pct, BASELINE_COLOR),
                Winner::Equal => (0.0, TIE_COLOR),
            }
        })
        .collect();

    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let n = labels.len();
    let y_min = values.iter().fold(0.0f64, |acc, (v, _)| acc.min(*v)) * 1.15 - 1.0;
    let y_max = values.iter().fold(0.0f64, |acc, (v, _)| acc.max(*v)) * 1.15 + 1.0;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            "Performance Improvement by Query (Variant Faster Negative / Baseline Faster Positive)",
            ("sans-serif", 24),
        )
        .margin(16)
        .x_label_area_size(150)
        .y_label_area_size(70)
        .build_cartesian_2d((0..n).into_segmented(), y_min..y_max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n.max(1))
        .x_label_formatter(&|value| match value {
            SegmentValue::CenterOf(idx) => labels.get(*idx).cloned().unwrap_or_default(),
            _ => String::new(),
        })
        .x_label_style(("sans-serif", 12).into_font().transform(FontTransform::Rotate90))
        .y_desc("Performance Improvement (%)")
        .draw()?;

    chart.draw_series(values.iter().enumerate().map(|(idx, (value, color))| {
        Rectangle::new(
            [
                (SegmentValue::Exact(idx), 0.0),
                (SegmentValue::Exact(idx + 1), *value),
            ],
            color.filled(),
        )
    }))?;

    // Zero axis.
    chart.draw_series(std::iter::once(PathElement::new(
        vec![
            (SegmentValue::Exact(0), 0.0),
            (SegmentValue::Exact(n), 0.0),
        ],
        BLACK,
    )))?;

    root.present()?;
    Ok(())
}

fn winner_chart(path: &Path, per_query: &[&ComparisonRow]) -> anyhow::Result<()> {
    let counts = [
        (
            "Baseline",
            per_query.iter().filter(|r| r.winner == Winner::Baseline).count(),
            BASELINE_COLOR,
        ),
        (
            "Variant",
            per_query.iter().filter(|r| r.winner == Winner::Variant).count(),
            VARIANT_COLOR,
        ),
        (
            "Equal",
            per_query.iter().filter(|r| r.winner == Winner::Equal).count(),
            TIE_COLOR,
        ),
    ];

    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let y_max = counts.iter().map(|(_, c, _)| *c).max().unwrap_or(0).max(1) as f64 * 1.2;

    let mut chart = ChartBuilder::on(&root)
        .caption("Which Configuration Performs Better (Count of Queries)", ("sans-serif", 26))
        .margin(16)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d((0..counts.len()).into_segmented(), 0f64..y_max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(counts.len())
        .x_label_formatter(&|value| match value {
            SegmentValue::CenterOf(idx) => {
                counts.get(*idx).map(|(label, _, _)| label.to_string()).unwrap_or_default()
            }
            _ => String::new(),
        })
        .y_desc("Queries Won")
        .draw()?;

    chart.draw_series(counts.iter().enumerate().map(|(idx, (_, count, color))| {
        Rectangle::new(
            [
                (SegmentValue::Exact(idx), 0.0),
                (SegmentValue::Exact(idx + 1), *count as f64),
            ],
            color.filled(),
        )
    }))?;

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use temp_dir::TempDir;

    use crate::compare::compare;
    use crate::stats::StatsRow;

    use super::*;

    fn stats_row(name: &str, median: f64) -> StatsRow {
        StatsRow {
            name: name.to_owned(),
            request_count: 100,
            failure_count: 1,
            median_ms: median,
            average_ms: median * 1.1,
            min_ms: median / 2.0,
            max_ms: median * 3.0,
            requests_per_sec: 10.0,
            p95_ms: median * 2.0,
            p99_ms: median * 2.5,
        }
    }

    #[test]
    fn renders_one_png_per_chart_type() {
        let baseline = vec![
            stats_row("cloudtrail/01_count_all", 87.0),
            stats_row("cloudtrail/02_events_by_name", 45.0),
            stats_row(AGGREGATED_ROW, 66.0),
        ];
        let variant = vec![
            stats_row("cloudtrail/01_count_all", 81.0),
            stats_row("cloudtrail/02_events_by_name", 52.0),
            stats_row(AGGREGATED_ROW, 64.0),
        ];
        let (rows, _) = compare(&baseline, &variant, None);

        let dir = TempDir::new().unwrap();
        let written = render_all(&rows, dir.path()).unwrap();

        assert_eq!(written.len(), CHART_FILES.len());
        for file in CHART_FILES {
            let path = dir.path().join(file);
            assert!(path.is_file(), "missing {file}");
            assert!(std::fs::metadata(&path).unwrap().len() > 0);
        }
    }

    #[test]
    fn short_names_strip_the_log_type_prefix() {
        assert_eq!(short_name("cloudtrail/01_count_all"), "01_count_all");
        assert_eq!(short_name("Aggregated"), "Aggregated");
    }
}
