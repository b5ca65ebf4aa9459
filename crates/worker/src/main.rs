use std::sync::Arc;
use std::time::Duration;

use coursecraft_core::quality_gate::QualityGate;
use coursecraft_generator::api::GenerationApi;
use coursecraft_worker::{FeedbackAggregator, JobDispatcher, JobQueue, JobRunner, WorkerConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coursecraft_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env();
    let pool = coursecraft_db::connect(&config.database_url, config.max_db_connections).await?;

    let queue = Arc::new(JobQueue::new(pool.clone()));
    let generator = Arc::new(GenerationApi::new(config.generator_url.clone()));
    let gate = Arc::new(QualityGate::default());
    let aggregator = Arc::new(FeedbackAggregator::new(pool));
    let runner = Arc::new(JobRunner::new(
        Arc::clone(&queue),
        generator,
        gate,
        aggregator,
        config.max_step_retries,
    ));

    let dispatcher = JobDispatcher::new(
        queue,
        runner,
        Duration::from_secs(config.poll_interval_secs),
        Duration::from_secs(config.stale_after_secs),
    );

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    dispatcher.run(cancel).await;
    Ok(())
}
