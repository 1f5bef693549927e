//! Shared parameter and result types for the benchmark runner.

use std::time::Duration;

use anyhow::Context;
use clap::Args;
use hdrhistogram::Histogram;
use url::Url;

/// Where and how to reach the deployment under test. Parsed once at startup
/// (flags or environment) and passed by reference everywhere else.
#[derive(Debug, Args, Clone)]
pub struct DeploymentParameters {
    /// Base URL of the target OpenSearch cluster.
    #[arg(long, env = "OPENSEARCH_ENDPOINT")]
    pub endpoint: Url,

    /// Basic-auth username. Requires --password.
    #[arg(long, env = "OPENSEARCH_USER")]
    pub username: Option<String>,

    /// Basic-auth password. Requires --username.
    #[arg(long, env = "OPENSEARCH_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Override the per-log-type target index for DSL queries and ingestion.
    #[arg(long, env = "INDEX_NAME")]
    pub index: Option<String>,

    /// Accept invalid TLS certificates (self-signed test clusters).
    #[arg(long)]
    pub insecure: bool,

    /// Per-request timeout, in seconds.
    #[arg(long, default_value = "30", value_parser = crate::utils::seconds_as_str_to_duration)]
    pub request_timeout: Duration,

    /// Instance label attached to exported metrics.
    #[arg(long, default_value = "local")]
    pub instance_label: String,

    /// Address of a push gateway for the run's prometheus metrics.
    #[arg(long)]
    pub prometheus_push_gateway: Option<String>,
}

impl DeploymentParameters {
    /// Checks constraints clap cannot express.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.username.is_some() != self.password.is_some() {
            anyhow::bail!("--username and --password must be provided together");
        }
        Ok(())
    }

    pub fn client(&self) -> anyhow::Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.request_timeout)
            .danger_accept_invalid_certs(self.insecure)
            .build()
            .context("failed to build HTTP client")
    }

    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(password)) => Some((user.as_str(), password.as_str())),
            _ => None,
        }
    }

    pub fn url_for(&self, path: &str) -> Result<Url, url::ParseError> {
        self.endpoint.join(path)
    }
}

/// Observations of one query over a run: a latency histogram of successful
/// requests, in microseconds, and a count of failed ones. Failed requests
/// contribute no latency sample; they are observations in their own right.
#[derive(Debug, Clone)]
pub struct QueryResults {
    pub latency_us: Histogram<u64>,
    pub failures: u64,
}

impl QueryResults {
    pub fn new() -> Self {
        Self {
            latency_us: Histogram::new(3).unwrap(),
            failures: 0,
        }
    }

    /// Successes plus failures.
    pub fn requests(&self) -> u64 {
        self.latency_us.len() + self.failures
    }

    pub fn merge(&mut self, other: &QueryResults) {
        self.latency_us.add(&other.latency_us).unwrap();
        self.failures += other.failures;
    }
}

impl Default for QueryResults {
    fn default() -> Self {
        Self::new()
    }
}

/// Results of a whole run, indexed like the query set that produced them.
#[derive(Debug, Clone, Default)]
pub struct BenchmarkResults {
    queries: Vec<QueryResults>,
    pub elapsed: Duration,
}

impl BenchmarkResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queries(&self) -> &[QueryResults] {
        &self.queries
    }

    pub fn query_mut(&mut self, idx: usize) -> &mut QueryResults {
        if self.queries.len() <= idx {
            self.queries.resize_with(idx + 1, QueryResults::new);
        }
        &mut self.queries[idx]
    }

    /// All queries merged into one set of observations.
    pub fn aggregated(&self) -> QueryResults {
        let mut total = QueryResults::new();
        for query in &self.queries {
            total.merge(query);
        }
        total
    }

    pub fn total_requests(&self) -> u64 {
        self.queries.iter().map(QueryResults::requests).sum()
    }

    /// Folds another run (e.g. a later iteration) into this one.
    pub fn merge(&mut self, other: &BenchmarkResults) {
        for (idx, query) in other.queries.iter().enumerate() {
            self.query_mut(idx).merge(query);
        }
        self.elapsed += other.elapsed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregated_merges_all_queries() {
        let mut results = BenchmarkResults::new();
        results.query_mut(0).latency_us.record(1_000).unwrap();
        results.query_mut(1).latency_us.record(3_000).unwrap();
        results.query_mut(1).failures = 2;

        let total = results.aggregated();
        assert_eq!(total.latency_us.len(), 2);
        assert_eq!(total.failures, 2);
        assert_eq!(total.requests(), 4);
        assert_eq!(results.total_requests(), 4);
    }

    #[test]
    fn merge_accumulates_iterations() {
        let mut first = BenchmarkResults::new();
        first.query_mut(0).latency_us.record(1_000).unwrap();
        first.elapsed = Duration::from_secs(10);

        let mut second = BenchmarkResults::new();
        second.query_mut(0).latency_us.record(2_000).unwrap();
        second.query_mut(0).failures = 1;
        second.elapsed = Duration::from_secs(5);

        first.merge(&second);
        assert_eq!(first.queries()[0].latency_us.len(), 2);
        assert_eq!(first.queries()[0].failures, 1);
        assert_eq!(first.elapsed, Duration::from_secs(15));
    }
}
