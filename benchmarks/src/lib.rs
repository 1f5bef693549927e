//! Load-testing harness for OpenSearch PPL/DSL query workloads.
//!
//! The crate has an online half and an offline half. Online, the
//! [`query_benchmark::QueryBenchmark`] driver replays a loaded query set
//! against a cluster from many concurrent workers and produces per-query
//! latency histograms, exported as a locust-compatible statistics CSV.
//! Offline, [`compare`] joins two exported runs (a baseline and a variant
//! configuration) into a merged comparison CSV, and [`graph`] renders that
//! comparison as a fixed set of charts.

pub mod benchmark;
pub mod compare;
pub mod graph;
pub mod query_benchmark;
pub mod stats;
pub mod utils;
