use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

use benchmarks::benchmark::DeploymentParameters;
use data_generator::{
    ingest_ndjson_file, run_generation, BulkClient, IngestPlan, LogDocumentSource,
};
use query_store::LogType;

/// Synthesize sample AWS log documents and bulk-ingest them into the target
/// cluster, or ingest a prepared NDJSON document file.
#[derive(Parser)]
#[command(name = "data_generator")]
struct DataGenerator {
    /// Log type to generate documents for.
    #[arg(long, env = "LOG_TYPE")]
    log_type: LogType,

    /// Total number of documents to ingest.
    #[arg(long, default_value = "1000000")]
    total_docs: u64,

    /// Documents per bulk request.
    #[arg(long, default_value = "2000")]
    batch_size: usize,

    /// Concurrent ingestion workers.
    #[arg(long, default_value = "4")]
    workers: u64,

    /// NDJSON file of documents to ingest instead of synthesizing. Required
    /// for big5, which has no synthetic generator.
    #[arg(long)]
    documents: Option<PathBuf>,

    /// Skip the connection smoke test before the full run.
    #[arg(long)]
    skip_smoke_test: bool,

    #[command(flatten)]
    deployment: DeploymentParameters,
}

impl DataGenerator {
    async fn run(self) -> anyhow::Result<()> {
        self.deployment.validate()?;

        let index = self
            .deployment
            .index
            .clone()
            .unwrap_or_else(|| self.log_type.index_name().to_owned());

        let client = BulkClient::new(
            self.deployment.client()?,
            self.deployment.endpoint.clone(),
            self.deployment
                .credentials()
                .map(|(user, password)| (user.to_owned(), password.to_owned())),
        );

        if let Some(path) = &self.documents {
            let report = ingest_ndjson_file(&client, &index, path, self.batch_size).await?;
            println!(
                "Ingested {} docs in {:.1}s | Rate: {:.0} docs/sec | Failed batches: {}",
                report.indexed,
                report.elapsed.as_secs_f64(),
                report.docs_per_sec(),
                report.failed_batches,
            );

            client.refresh(&index).await?;
            let count = client.doc_count(&index).await?;
            println!("Final index count: {count} documents");
            return Ok(());
        }

        let source = Arc::new(LogDocumentSource::new(self.log_type)?);

        if !self.skip_smoke_test {
            let mut rng = SmallRng::from_entropy();
            let docs: Vec<_> = (0..10).map(|_| source.generate(&mut rng)).collect();
            client
                .bulk_index("test-index", &docs)
                .await
                .context("connection smoke test failed, check credentials and endpoint")?;
            println!("Connection test successful");
        }

        let plan = IngestPlan {
            index,
            total_docs: self.total_docs,
            batch_size: self.batch_size,
            workers: self.workers,
        };
        let report = run_generation(Arc::new(client), source, &plan).await;
        println!(
            "Final: {} docs in {:.1}s | Rate: {:.0} docs/sec | Failed batches: {}",
            report.indexed,
            report.elapsed.as_secs_f64(),
            report.docs_per_sec(),
            report.failed_batches,
        );

        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    DataGenerator::parse().run().await
}
