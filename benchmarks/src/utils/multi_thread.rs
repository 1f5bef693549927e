use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::futures_unordered::FuturesUnordered;
use futures::StreamExt;
use tokio::select;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::Interval;
use tracing::error;

use crate::benchmark::BenchmarkResults;

/// A group of methods that facilitate executing a single benchmark from
/// multiple worker tasks. Used in conjunction with
/// `run_multithread_benchmark` to spawn the workers.
#[async_trait]
pub(crate) trait MultithreadBenchmark {
    /// The result messages passed to the results task via an UnboundedSender.
    type BenchmarkResult: Send;
    /// The set of parameters used to initialize the benchmark workers.
    type Parameters: Clone + Send + Sync + 'static;

    /// Process a batch of benchmark results collected over `interval`. This
    /// aggregates all updates sent on the `sender` parameter of
    /// `benchmark_thread`.
    async fn handle_benchmark_results(
        results: Vec<Self::BenchmarkResult>,
        interval: Duration,
        benchmark_results: &mut BenchmarkResults,
    ) -> Result<()>;

    /// Worker loop, initialized from `params`, sending `BenchmarkResult`
    /// batches along `sender`. Runs until aborted.
    async fn benchmark_thread(
        params: Self::Parameters,
        sender: UnboundedSender<Self::BenchmarkResult>,
    ) -> Result<()>;
}

/// Returns after `duration` if it is Some, otherwise never returns. Useful
/// within select! loops to optionally break after a duration.
async fn return_after_duration(duration: Option<Duration>) {
    if let Some(d) = duration {
        tokio::time::sleep(d).await;
    } else {
        let () = futures::future::pending().await;
    }
}

/// Aggregates benchmark results received over `THREAD_UPDATE_INTERVAL`.
/// Every interval, the batch of updates is passed to the benchmark's
/// `handle_benchmark_results`.
async fn benchmark_results_thread<B>(
    mut receiver: UnboundedReceiver<B::BenchmarkResult>,
    run_for: Option<Duration>,
) -> Result<BenchmarkResults>
where
    B: MultithreadBenchmark,
{
    const THREAD_UPDATE_INTERVAL: Duration = Duration::from_secs(10);
    let mut interval = tokio::time::interval(THREAD_UPDATE_INTERVAL);
    interval.tick().await; // First tick is immediate
    let mut updates = Vec::new();

    // Pin the future so we can poll it repeatedly in the select loop.
    let return_after = return_after_duration(run_for);
    tokio::pin!(return_after);

    let mut results = BenchmarkResults::new();

    let mut last_update = std::time::Instant::now();
    loop {
        select! {
            // If we reach our update interval, run the provided function to
            // handle a batch of updates.
            _ = interval.tick() => {
                let mut new_updates = Vec::new();
                std::mem::swap(&mut new_updates, &mut updates);
                let elapsed = last_update.elapsed();
                last_update = std::time::Instant::now();
                B::handle_benchmark_results(new_updates, elapsed, &mut results).await?;
            }
            // If we receive an update, push it to the next batch of updates.
            r = receiver.recv() => {
                if let Some(r) = r {
                    updates.push(r);
                } else {
                    break; // All workers have dropped their sender.
                }
            }
            _ = &mut return_after => {
                break;
            }
        }
    }

    // Fold in whatever arrived since the last tick.
    let elapsed = last_update.elapsed();
    B::handle_benchmark_results(updates, elapsed, &mut results).await?;

    Ok(results)
}

/// Spawns `num_workers` tasks running the benchmark's worker loop plus one
/// task aggregating their updates. Returns once `run_for` elapses (or once
/// every worker has exited); remaining workers are aborted so a subsequent
/// iteration starts from zero load.
pub(crate) async fn run_multithread_benchmark<B>(
    num_workers: u64,
    params: B::Parameters,
    run_for: Option<Duration>,
) -> Result<BenchmarkResults>
where
    B: MultithreadBenchmark + 'static,
{
    let (sender, receiver) = unbounded_channel::<B::BenchmarkResult>();

    let workers: Vec<_> = (0..num_workers)
        .map(|_| tokio::spawn(B::benchmark_thread(params.clone(), sender.clone())))
        .collect();
    drop(sender);

    let abort_handles: Vec<_> = workers.iter().map(|w| w.abort_handle()).collect();
    let abort_workers = || {
        for handle in &abort_handles {
            handle.abort();
        }
    };

    let mut worker_stream: FuturesUnordered<_> = workers.into_iter().collect();
    let mut results = tokio::spawn(benchmark_results_thread::<B>(receiver, run_for));

    loop {
        select! {
            w = worker_stream.next() => {
                match w {
                    // Worker was aborted after the results task finished.
                    Some(Err(e)) if e.is_cancelled() => {}
                    // Worker task panicked.
                    Some(Err(e)) => {
                        error!("error executing future in multi-threaded benchmark");
                        abort_workers();
                        return Err(e.into());
                    }
                    // Error returned from the worker loop.
                    Some(Ok(Err(e))) => {
                        error!("error executing benchmark worker: {}", e);
                        abort_workers();
                        return Err(e);
                    }
                    // Success returned from the worker loop.
                    Some(Ok(Ok(()))) => {}
                    // No more workers running; the channel is closed and the
                    // results task will drain and return.
                    None => break,
                }
            }
            res = &mut results => {
                abort_workers();
                return res?;
            }
        }
    }

    Ok(results.await??)
}

/// An interval each worker sleeps on between requests to hold the whole run
/// at `target_qps`, when one is set.
pub(crate) fn throttle_interval(target_qps: Option<u64>, num_workers: u64) -> Option<Interval> {
    target_qps
        .as_ref()
        .map(|qps| tokio::time::interval(Duration::from_nanos(1_000_000_000 * num_workers / qps)))
}
