//! `auralis-worker`: one process of the Orchestrator Worker Pool (C4). One
//! or more of these share a consumer group against the same stream.

use std::sync::Arc;

use auralis::config::{init_tracing, is_production, WorkerConfig};
use auralis::db::postgres::PostgresStore;
use auralis::objectstore::ArtifactStore;
use auralis::stream::redis_stream::RedisJobStream;
use auralis::worker::generator::GeneratorClient;
use auralis::worker::pool::WorkerPool;
use auralis::worker::report::ReportClient;
use auralis::worker::WorkerContext;
use clap::Parser;
use tokio::sync::watch;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing(is_production());

    let config = WorkerConfig::parse().load_generator_endpoints();
    let consumer = config
        .jobs_consumer
        .clone()
        .unwrap_or_else(|| format!("worker-{}", Uuid::new_v4()));

    let store = Arc::new(PostgresStore::connect(&config.database_url).await?);
    let stream = Arc::new(
        RedisJobStream::connect(&config.redis_url, &config.jobs_stream, &config.jobs_group).await?,
    );

    let http = reqwest::Client::new();
    let generator = Arc::new(GeneratorClient::new(
        http.clone(),
        config.generator_endpoints.clone(),
        config.generator_timeout(),
        config.service_token.clone(),
    ));
    let report = Arc::new(ReportClient::new(
        http,
        config.orchestrator_bind_addr.clone(),
        config.service_token.clone(),
    ));

    let artifacts = match &config.artifact_s3_bucket {
        Some(bucket) if config.write_artifacts => {
            Some(Arc::new(ArtifactStore::new(bucket.clone(), config.aws_region.clone()).await))
        }
        _ => None,
    };

    let db: Arc<dyn auralis::db::JobStore> = store;
    let job_stream: Arc<dyn auralis::stream::JobStream> = stream;

    let ctx = WorkerContext {
        db,
        stream: job_stream,
        generator,
        report,
        artifacts,
        max_retries: config.max_retries,
    };

    let pool = WorkerPool::new(
        ctx,
        consumer,
        config.concurrency,
        config.claim_threshold(),
        config.drain_timeout(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("signal received, requesting worker pool shutdown");
        let _ = shutdown_tx.send(true);
    });

    pool.run(shutdown_rx).await;
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
