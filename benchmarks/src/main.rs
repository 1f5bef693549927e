use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

use benchmarks::benchmark::{BenchmarkResults, DeploymentParameters};
use benchmarks::query_benchmark::QueryBenchmark;
use benchmarks::stats;

const PUSH_GATEWAY_PUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Replay PPL/DSL query workloads against an OpenSearch cluster and record
/// per-query latency statistics.
#[derive(Parser)]
#[command(name = "benchmarks")]
struct BenchmarkRunner {
    /// The number of times we should run the benchmark.
    #[arg(long, default_value = "1")]
    iterations: u32,

    /// File to write the run's per-query statistics CSV to. With multiple
    /// iterations, observations are combined across all of them.
    #[arg(long)]
    results_csv: Option<PathBuf>,

    #[command(flatten)]
    deployment: DeploymentParameters,

    #[command(flatten)]
    benchmark: QueryBenchmark,
}

fn make_prometheus_url(base: &str, benchmark_name_label: &str, instance_label: &str) -> String {
    format!(
        "{}/metrics/job/{}/instance/{}",
        base, benchmark_name_label, instance_label
    )
}

impl BenchmarkRunner {
    fn init_prometheus(&self) -> anyhow::Result<()> {
        let Some(gateway) = &self.deployment.prometheus_push_gateway else {
            return Ok(());
        };
        let endpoint =
            make_prometheus_url(gateway, "query_benchmark", &self.deployment.instance_label);
        PrometheusBuilder::new()
            .with_push_gateway(endpoint, PUSH_GATEWAY_PUSH_INTERVAL, None, None)
            .context("invalid push gateway address")?
            .install()
            .context("failed to install prometheus exporter")?;
        Ok(())
    }

    async fn run(self) -> anyhow::Result<()> {
        self.deployment.validate()?;
        self.init_prometheus()?;

        // Loading is also the configuration check: an empty selection fails
        // here, before any load reaches the cluster.
        let query_set = self.benchmark.load_queries()?;

        let mut iterations = Vec::new();
        let mut combined = BenchmarkResults::new();
        for i in 0..self.iterations {
            if self.iterations > 1 {
                println!("Iteration: {i} ---------------------------");
            }
            let results = self
                .benchmark
                .benchmark(&query_set, &self.deployment)
                .await?;
            combined.merge(&results);
            iterations.push(results);
        }

        println!("Benchmark Results -----------------------");
        for (index, results) in iterations.iter().enumerate() {
            print_results(index + 1, &stats::rows_from_results(results, &query_set));
        }

        if let Some(path) = &self.results_csv {
            let rows = stats::rows_from_results(&combined, &query_set);
            stats::write_stats_csv(path, &rows)
                .with_context(|| format!("failed to write statistics to {path:?}"))?;
            println!(
                "Wrote statistics for {} queries to {}",
                rows.len() - 1,
                path.display()
            );
        }

        Ok(())
    }
}

fn print_results(iteration: usize, rows: &[stats::StatsRow]) {
    println!("Iteration {iteration} Results:");
    for row in rows {
        println!(
            "\t{} - Requests: {} - Failures: {} - Median: {:.1} ms - p95: {:.1} ms - p99: {:.1} ms - {:.1} req/s",
            row.name,
            row.request_count,
            row.failure_count,
            row.median_ms,
            row.p95_ms,
            row.p99_ms,
            row.requests_per_sec,
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    BenchmarkRunner::parse().run().await
}

#[cfg(test)]
mod tests {
    use test_strategy::proptest;

    #[proptest]
    fn make_prometheus_url(
        #[strategy("[a-z]+://[a-z0-9/]+")] base: String,
        benchmark_name_label: String,
        instance_label: String,
    ) {
        let url = super::make_prometheus_url(&base, &benchmark_name_label, &instance_label);
        assert!(url::Url::parse(&url).is_ok())
    }
}
