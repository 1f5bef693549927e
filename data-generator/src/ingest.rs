//! Concurrent ingestion of generated documents.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde_json::Value;
use tracing::{info, warn};

use crate::bulk::{BulkClient, IngestError};
use crate::LogDocumentSource;

/// A worker gives up after this many failed batches.
const FAILURE_BUDGET: u64 = 10;

/// Timestamp stamped onto documents ingested from a file.
const FILE_DOC_TIMESTAMP: &str = "2024-01-01T00:00:00Z";

#[derive(Debug, Clone)]
pub struct IngestPlan {
    pub index: String,
    pub total_docs: u64,
    pub batch_size: usize,
    pub workers: u64,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub indexed: u64,
    pub failed_batches: u64,
    pub elapsed: Duration,
}

impl IngestReport {
    pub fn docs_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.indexed as f64 / secs
        } else {
            0.0
        }
    }
}

fn progress_bar(total_docs: u64) -> ProgressBar {
    let bar = ProgressBar::new(total_docs);
    bar.set_style(
        ProgressStyle::with_template(
            "{elapsed_precise} [{bar:40}] {pos}/{len} docs ({per_sec})",
        )
        .unwrap()
        .progress_chars("=> "),
    );
    bar
}

/// Generates and ingests `plan.total_docs` synthetic documents across
/// `plan.workers` concurrent workers.
pub async fn run_generation(
    client: Arc<BulkClient>,
    source: Arc<LogDocumentSource>,
    plan: &IngestPlan,
) -> IngestReport {
    let batches_per_worker =
        (plan.total_docs / (plan.batch_size as u64 * plan.workers.max(1))).max(1);
    info!(
        total_docs = plan.total_docs,
        workers = plan.workers,
        batch_size = plan.batch_size,
        batches_per_worker,
        "starting ingestion"
    );

    let bar = progress_bar(batches_per_worker * plan.workers * plan.batch_size as u64);
    let start = Instant::now();

    let workers: Vec<_> = (1..=plan.workers)
        .map(|worker_id| {
            tokio::spawn(ingest_worker(
                Arc::clone(&client),
                Arc::clone(&source),
                plan.index.clone(),
                plan.batch_size,
                batches_per_worker,
                worker_id,
                bar.clone(),
            ))
        })
        .collect();

    let mut report = IngestReport::default();
    for worker in workers {
        match worker.await {
            Ok((indexed, failed)) => {
                report.indexed += indexed;
                report.failed_batches += failed;
            }
            Err(e) => warn!(error = %e, "ingest worker panicked"),
        }
    }
    bar.finish();
    report.elapsed = start.elapsed();
    report
}

async fn ingest_worker(
    client: Arc<BulkClient>,
    source: Arc<LogDocumentSource>,
    index: String,
    batch_size: usize,
    num_batches: u64,
    worker_id: u64,
    bar: ProgressBar,
) -> (u64, u64) {
    let mut rng = SmallRng::from_entropy();
    let mut indexed = 0;
    let mut failed = 0;

    for _ in 0..num_batches {
        let docs: Vec<Value> = (0..batch_size).map(|_| source.generate(&mut rng)).collect();

        match client.bulk_index(&index, &docs).await {
            Ok(()) => {
                indexed += batch_size as u64;
                bar.inc(batch_size as u64);
            }
            Err(e) => {
                failed += 1;
                warn!(worker_id, error = %e, "bulk batch failed");
                if failed > FAILURE_BUDGET {
                    warn!(worker_id, "too many failures, stopping worker");
                    break;
                }
            }
        }
    }

    (indexed, failed)
}

/// Ingests an NDJSON file of documents (the Big5 corpus) batch by batch,
/// stamping a fixed `@timestamp` on each. Invalid lines are skipped with a
/// warning.
pub async fn ingest_ndjson_file(
    client: &BulkClient,
    index: &str,
    path: &Path,
    batch_size: usize,
) -> Result<IngestReport, IngestError> {
    let file = File::open(path).map_err(|source| IngestError::DocumentFile {
        path: path.to_owned(),
        source,
    })?;
    let reader = BufReader::new(file);

    let start = Instant::now();
    let mut report = IngestReport::default();
    let mut batch: Vec<Value> = Vec::with_capacity(batch_size);

    for (line_num, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| IngestError::DocumentFile {
            path: path.to_owned(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<Value>(&line) {
            Ok(mut doc) => {
                if let Some(fields) = doc.as_object_mut() {
                    fields.insert("@timestamp".to_owned(), Value::from(FILE_DOC_TIMESTAMP));
                }
                batch.push(doc);
            }
            Err(e) => {
                warn!(line = line_num + 1, error = %e, "skipping invalid JSON line");
                continue;
            }
        }

        if batch.len() >= batch_size {
            flush_batch(client, index, &mut batch, &mut report).await;
        }
    }

    if !batch.is_empty() {
        flush_batch(client, index, &mut batch, &mut report).await;
    }

    report.elapsed = start.elapsed();
    Ok(report)
}

async fn flush_batch(
    client: &BulkClient,
    index: &str,
    batch: &mut Vec<Value>,
    report: &mut IngestReport,
) {
    match client.bulk_index(index, batch).await {
        Ok(()) => report.indexed += batch.len() as u64,
        Err(e) => {
            report.failed_batches += 1;
            warn!(error = %e, "bulk batch failed");
        }
    }
    batch.clear();
}
