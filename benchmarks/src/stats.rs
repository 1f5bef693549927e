//! Locust-compatible per-query statistics, the interchange format between a
//! benchmark run and the offline comparison tooling.
//!
//! One row per query, named `<log_type>/<file_stem>`, plus an `Aggregated`
//! row merging every query. Latencies are milliseconds; the column labels
//! match what the comparator expects to find in either input file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use query_store::QuerySet;

use crate::benchmark::{BenchmarkResults, QueryResults};
use crate::utils::us_to_ms;

/// Name of the synthetic row aggregating the whole run.
pub const AGGREGATED_ROW: &str = "Aggregated";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsRow {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Request Count")]
    pub request_count: u64,
    #[serde(rename = "Failure Count")]
    pub failure_count: u64,
    #[serde(rename = "Median Response Time")]
    pub median_ms: f64,
    #[serde(rename = "Average Response Time")]
    pub average_ms: f64,
    #[serde(rename = "Min Response Time")]
    pub min_ms: f64,
    #[serde(rename = "Max Response Time")]
    pub max_ms: f64,
    #[serde(rename = "Requests/s")]
    pub requests_per_sec: f64,
    #[serde(rename = "95%")]
    pub p95_ms: f64,
    #[serde(rename = "99%")]
    pub p99_ms: f64,
}

impl StatsRow {
    pub fn from_results(name: &str, results: &QueryResults, elapsed: Duration) -> Self {
        let hist = &results.latency_us;
        let secs = elapsed.as_secs_f64();
        Self {
            name: name.to_owned(),
            request_count: results.requests(),
            failure_count: results.failures,
            median_ms: us_to_ms(hist.value_at_quantile(0.5)),
            average_ms: if hist.is_empty() { 0.0 } else { hist.mean() / 1000.0 },
            min_ms: us_to_ms(hist.min()),
            max_ms: us_to_ms(hist.max()),
            requests_per_sec: if secs > 0.0 {
                results.requests() as f64 / secs
            } else {
                0.0
            },
            p95_ms: us_to_ms(hist.value_at_quantile(0.95)),
            p99_ms: us_to_ms(hist.value_at_quantile(0.99)),
        }
    }
}

/// One row per query in set order, then the `Aggregated` row.
pub fn rows_from_results(results: &BenchmarkResults, query_set: &QuerySet) -> Vec<StatsRow> {
    let empty = QueryResults::new();
    let mut rows: Vec<StatsRow> = query_set
        .iter()
        .enumerate()
        .map(|(idx, query)| {
            let query_results = results.queries().get(idx).unwrap_or(&empty);
            StatsRow::from_results(query.name(), query_results, results.elapsed)
        })
        .collect();
    rows.push(StatsRow::from_results(
        AGGREGATED_ROW,
        &results.aggregated(),
        results.elapsed,
    ));
    rows
}

pub fn write_stats_csv(path: &Path, rows: &[StatsRow]) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_stats_csv(path: &Path) -> Result<Vec<StatsRow>, csv::Error> {
    let mut reader = csv::Reader::from_path(path)?;
    reader.deserialize().collect()
}

#[cfg(test)]
mod tests {
    use temp_dir::TempDir;

    use super::*;

    fn results_with(samples_ms: &[u64], failures: u64) -> QueryResults {
        let mut results = QueryResults::new();
        for sample in samples_ms {
            results.latency_us.record(sample * 1_000).unwrap();
        }
        results.failures = failures;
        results
    }

    #[test]
    fn stats_row_reports_milliseconds() {
        let results = results_with(&[80, 87, 94], 1);
        let row = StatsRow::from_results("vpc/01_count_all", &results, Duration::from_secs(2));

        assert_eq!(row.request_count, 4);
        assert_eq!(row.failure_count, 1);
        assert_eq!(row.requests_per_sec, 2.0);
        // hdrhistogram quantizes at 3 significant figures.
        assert!((row.median_ms - 87.0).abs() < 1.0);
        assert!((row.min_ms - 80.0).abs() < 1.0);
        assert!((row.max_ms - 94.0).abs() < 1.0);
    }

    #[test]
    fn empty_results_produce_zeroed_rows() {
        let row = StatsRow::from_results("waf/01_count_all", &QueryResults::new(), Duration::ZERO);
        assert_eq!(row.request_count, 0);
        assert_eq!(row.median_ms, 0.0);
        assert_eq!(row.average_ms, 0.0);
        assert_eq!(row.requests_per_sec, 0.0);
    }

    #[test]
    fn csv_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stats.csv");

        let rows = vec![
            StatsRow {
                name: "vpc/01_count_all".to_owned(),
                request_count: 120,
                failure_count: 2,
                median_ms: 87.0,
                average_ms: 91.5,
                min_ms: 60.0,
                max_ms: 250.0,
                requests_per_sec: 12.0,
                p95_ms: 180.0,
                p99_ms: 240.0,
            },
            StatsRow {
                name: AGGREGATED_ROW.to_owned(),
                request_count: 120,
                failure_count: 2,
                median_ms: 87.0,
                average_ms: 91.5,
                min_ms: 60.0,
                max_ms: 250.0,
                requests_per_sec: 12.0,
                p95_ms: 180.0,
                p99_ms: 240.0,
            },
        ];

        write_stats_csv(&path, &rows).unwrap();
        let read_back = read_stats_csv(&path).unwrap();
        assert_eq!(read_back, rows);
    }

    #[test]
    fn malformed_csv_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stats.csv");
        std::fs::write(&path, "Name,Request Count\nvpc/01_count_all,not-a-number\n").unwrap();
        assert!(read_stats_csv(&path).is_err());
    }
}
