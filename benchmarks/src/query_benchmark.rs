//! The query workload driver.
//!
//! Replays a loaded [`QuerySet`] against the cluster from `--workers`
//! concurrent workers. Each worker iteration picks one query uniformly at
//! random, POSTs it (a `{"query": …}` envelope to the PPL endpoint, or the
//! raw body to the index's search endpoint for DSL), and records the
//! end-to-end latency into a per-query histogram. A failed request (network
//! error, auth failure, non-2xx status) is counted as one failed observation
//! and never retried. Workers batch their histograms and ship them to a
//! results task on a short interval, which logs running qps/percentiles and
//! folds everything into the run's [`BenchmarkResults`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use clap::Args;
use hdrhistogram::Histogram;
use metrics::{counter, histogram};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};
use url::Url;

use query_store::{LanguageSelector, LogTypeSelector, QuerySet, QueryStore, Selection};

use crate::benchmark::{BenchmarkResults, DeploymentParameters};
use crate::utils::multi_thread::{self, MultithreadBenchmark};
use crate::utils::us_to_ms;

const REPORT_RESULTS_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Args, Clone)]
pub struct QueryBenchmark {
    /// Root of the query store.
    #[arg(long, default_value = "workloads")]
    pub workloads: PathBuf,

    /// Log type(s) to load queries for.
    #[arg(long, env = "LOG_TYPE", default_value = "all")]
    pub log_type: LogTypeSelector,

    /// Query language(s) to load.
    #[arg(long, env = "QUERY_LANGUAGE", default_value = "ppl")]
    pub query_language: LanguageSelector,

    /// Number of concurrent workers issuing queries.
    #[arg(long, short, default_value = "8")]
    pub workers: u64,

    /// The target rate to issue queries at, if attainable on this machine
    /// with up to `workers` workers.
    #[arg(long)]
    pub target_qps: Option<u64>,

    /// Duration of the benchmark in seconds; runs until interrupted when
    /// omitted.
    #[arg(long, short, value_parser = crate::utils::seconds_as_str_to_duration)]
    pub run_for: Option<Duration>,
}

/// A query with its request fully precomputed, so the worker hot loop only
/// clones a URL and a JSON body.
#[derive(Debug, Clone)]
pub(crate) struct PreparedQuery {
    name: String,
    url: Url,
    body: serde_json::Value,
}

#[derive(Clone)]
pub(crate) struct WorkloadMetrics {
    latency: metrics::Histogram,
    count: metrics::Counter,
}

#[derive(Clone)]
pub(crate) struct QueryThreadParams {
    client: reqwest::Client,
    credentials: Option<(String, String)>,
    query_set: Arc<QuerySet>,
    prepared: Arc<Vec<PreparedQuery>>,
    target_qps: Option<u64>,
    workers: u64,
    metrics: Option<Vec<WorkloadMetrics>>,
}

/// A batched set of per-query results sent on an interval by each worker.
#[derive(Debug, Clone)]
pub(crate) struct QueryResultBatch {
    /// Latency histograms of successful requests, in microseconds.
    queries: Vec<Histogram<u64>>,
    /// Failed request counts.
    failures: Vec<u64>,
}

impl QueryResultBatch {
    fn new(n: usize) -> Self {
        Self {
            queries: vec![Histogram::<u64>::new(3).unwrap(); n],
            failures: vec![0; n],
        }
    }
}

impl QueryBenchmark {
    pub fn selection(&self) -> Selection {
        Selection::new(self.log_type, self.query_language)
    }

    /// Loads the selected queries. An empty selection is a configuration
    /// error; the load test must not start.
    pub fn load_queries(&self) -> anyhow::Result<QuerySet> {
        let store = QueryStore::open(&self.workloads)
            .with_context(|| format!("failed to open query store {:?}", self.workloads))?;
        let set = store.load(&self.selection())?;
        info!(
            count = set.len(),
            log_type = %self.log_type,
            language = %self.query_language,
            "loaded queries"
        );
        Ok(set)
    }

    pub async fn benchmark(
        &self,
        query_set: &QuerySet,
        deployment: &DeploymentParameters,
    ) -> anyhow::Result<BenchmarkResults> {
        let prepared = prepare_queries(query_set, deployment)?;

        // If the user passed a push gateway they want prometheus metrics
        // recorded; create the per-query instruments up front.
        let metrics = deployment.prometheus_push_gateway.is_some().then(|| {
            prepared
                .iter()
                .map(|q| WorkloadMetrics {
                    latency: histogram!(
                        "opensearch_benchmark_execution_time_us",
                        "query" => q.name.clone(),
                    ),
                    count: counter!(
                        "opensearch_benchmark_execution_count",
                        "query" => q.name.clone(),
                    ),
                })
                .collect()
        });

        let params = QueryThreadParams {
            client: deployment.client()?,
            credentials: deployment
                .credentials()
                .map(|(user, password)| (user.to_owned(), password.to_owned())),
            query_set: Arc::new(query_set.clone()),
            prepared: Arc::new(prepared),
            target_qps: self.target_qps,
            workers: self.workers,
            metrics,
        };

        let start = Instant::now();
        let mut results =
            multi_thread::run_multithread_benchmark::<Self>(self.workers, params, self.run_for)
                .await?;
        results.elapsed = start.elapsed();

        // Queries that were never picked still get an (empty) row.
        if !query_set.is_empty() {
            results.query_mut(query_set.len() - 1);
        }

        Ok(results)
    }
}

fn prepare_queries(
    query_set: &QuerySet,
    deployment: &DeploymentParameters,
) -> anyhow::Result<Vec<PreparedQuery>> {
    query_set
        .iter()
        .map(|query| {
            let path = query.endpoint_path(deployment.index.as_deref());
            let url = deployment
                .url_for(&path)
                .with_context(|| format!("invalid endpoint path {path:?}"))?;
            Ok(PreparedQuery {
                name: query.name().to_owned(),
                url,
                body: query.request_body(),
            })
        })
        .collect()
}

#[async_trait]
impl MultithreadBenchmark for QueryBenchmark {
    type BenchmarkResult = QueryResultBatch;
    type Parameters = QueryThreadParams;

    async fn handle_benchmark_results(
        results: Vec<Self::BenchmarkResult>,
        interval: Duration,
        benchmark_results: &mut BenchmarkResults,
    ) -> anyhow::Result<()> {
        let mut overall = Histogram::<u64>::new(3).unwrap();
        let mut failures = 0;
        for batch in &results {
            for (i, hist) in batch.queries.iter().enumerate() {
                overall.add(hist).unwrap();
                benchmark_results.query_mut(i).latency_us.add(hist).unwrap();
            }
            for (i, count) in batch.failures.iter().enumerate() {
                benchmark_results.query_mut(i).failures += count;
                failures += count;
            }
        }

        if overall.is_empty() && failures == 0 {
            return Ok(());
        }

        let qps = overall.len() as f64 / interval.as_secs_f64();
        info!(
            "overall -\tqps: {qps:.0}\tfailures: {failures}\tp50: {:.1} ms\tp90: {:.1} ms\tp99: {:.1} ms",
            us_to_ms(overall.value_at_quantile(0.5)),
            us_to_ms(overall.value_at_quantile(0.9)),
            us_to_ms(overall.value_at_quantile(0.99)),
        );

        Ok(())
    }

    async fn benchmark_thread(
        params: Self::Parameters,
        sender: UnboundedSender<Self::BenchmarkResult>,
    ) -> anyhow::Result<()> {
        let mut rng = SmallRng::from_entropy();
        let mut throttle_interval =
            multi_thread::throttle_interval(params.target_qps, params.workers);
        let mut last_report = Instant::now();
        let mut result_batch = QueryResultBatch::new(params.prepared.len());

        loop {
            // Report results every REPORT_RESULTS_INTERVAL.
            if last_report.elapsed() > REPORT_RESULTS_INTERVAL {
                let mut new_results = QueryResultBatch::new(params.prepared.len());
                std::mem::swap(&mut new_results, &mut result_batch);
                if sender.send(new_results).is_err() {
                    // The results task has finished; the run is over.
                    return Ok(());
                }
                last_report = Instant::now();
            }

            if let Some(interval) = &mut throttle_interval {
                interval.tick().await;
            }

            let (idx, _) = params.query_set.pick(&mut rng);
            let query = &params.prepared[idx];

            let mut request = params.client.post(query.url.clone()).json(&query.body);
            if let Some((user, password)) = &params.credentials {
                request = request.basic_auth(user, Some(password));
            }

            let start = Instant::now();
            let outcome = request.send().await;
            let elapsed = start.elapsed();

            match outcome {
                Ok(response) if response.status().is_success() => {
                    result_batch.queries[idx]
                        .record(elapsed.as_micros() as u64)
                        .unwrap();
                    if let Some(metrics) = &params.metrics {
                        metrics[idx].latency.record(elapsed.as_micros() as f64);
                        metrics[idx].count.increment(1);
                    }
                }
                // A failed request is one observation, not retried.
                Ok(response) => {
                    debug!(query = %query.name, status = %response.status(), "query failed");
                    result_batch.failures[idx] += 1;
                }
                Err(e) => {
                    debug!(query = %query.name, error = %e, "request error");
                    result_batch.failures[idx] += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        deployment: DeploymentParameters,
        #[command(flatten)]
        benchmark: QueryBenchmark,
    }

    fn parse(args: &[&str]) -> TestCli {
        TestCli::parse_from(
            [&["test", "--endpoint", "https://search.example.com:9200"], args].concat(),
        )
    }

    #[test]
    fn prepared_requests_use_the_right_endpoints() {
        let cli = parse(&["--log-type", "big5", "--query-language", "dsl"]);
        let set = cli.benchmark.load_queries().unwrap();
        let prepared = prepare_queries(&set, &cli.deployment).unwrap();

        assert_eq!(prepared.len(), set.len());
        for query in &prepared {
            assert_eq!(
                query.url.as_str(),
                "https://search.example.com:9200/big5/_search"
            );
        }
    }

    #[test]
    fn ppl_requests_share_the_plugin_endpoint() {
        let cli = parse(&["--log-type", "waf"]);
        let set = cli.benchmark.load_queries().unwrap();
        let prepared = prepare_queries(&set, &cli.deployment).unwrap();

        for query in &prepared {
            assert_eq!(
                query.url.as_str(),
                "https://search.example.com:9200/_plugins/_ppl"
            );
            assert!(query.body["query"]
                .as_str()
                .unwrap()
                .starts_with(query_store::PPL_SOURCE_KEYWORD));
        }
    }

    #[test]
    fn index_override_applies_to_dsl_queries() {
        let cli = parse(&[
            "--log-type",
            "big5",
            "--query-language",
            "dsl",
            "--index",
            "big5_v2",
        ]);
        let set = cli.benchmark.load_queries().unwrap();
        let prepared = prepare_queries(&set, &cli.deployment).unwrap();
        assert!(prepared
            .iter()
            .all(|q| q.url.path() == "/big5_v2/_search"));
    }

    #[test]
    fn unknown_log_type_fails_parsing() {
        let result = TestCli::try_parse_from([
            "test",
            "--endpoint",
            "https://search.example.com:9200",
            "--log-type",
            "cloudwatch",
        ]);
        assert!(result.is_err());
    }
}
