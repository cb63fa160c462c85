use std::sync::Arc;
use std::time::Duration;

use alertpipe::bus::BusProducer;
use alertpipe::cache::SnapshotCache;
use alertpipe::channels::ChannelRegistry;
use alertpipe::config::{Component, Config};
use alertpipe::db;
use alertpipe::dispatcher::DispatcherRunner;
use alertpipe::error::PipelineResult;
use alertpipe::matcher::reload::{self, HotReloader, IndexHandle};
use alertpipe::matcher::runner::MatcherRunner;
use alertpipe::notifier::NotifierRunner;
use alertpipe::retry::RetryPolicy;
use alertpipe::shutdown::{self, Shutdown};
use alertpipe::snapshot::builder::SnapshotBuilder;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        log::error!("Configuration error: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    log::info!(
        "Starting alertpipe with components: {}",
        config
            .components
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );

    run_pipeline(config).await.map_err(|e| {
        log::error!("Startup failed: {}", e);
        std::io::Error::other(e.to_string())
    })
}

async fn run_pipeline(config: Config) -> PipelineResult<()> {
    let needs_database = config.components.iter().any(|c| {
        matches!(
            c,
            Component::Builder | Component::Notifier | Component::Dispatcher
        )
    });
    let needs_cache = config
        .components
        .iter()
        .any(|c| matches!(c, Component::Builder | Component::Matcher));

    // Unreachable dependencies are fatal here, before any consumer starts;
    // at runtime the same failures are retried inside the components.
    let pool = if needs_database {
        let pool = db::create_pool(&config.database)
            .await
            .map_err(alertpipe::error::PipelineError::Database)?;
        db::run_migrations(&pool)
            .await
            .map_err(|e| alertpipe::error::PipelineError::Unavailable(e.to_string()))?;
        Some(pool)
    } else {
        None
    };

    let cache = if needs_cache {
        Some(SnapshotCache::connect(&config.cache).await?)
    } else {
        None
    };

    let producer = BusProducer::connect(&config.broker)?;
    let retry = RetryPolicy::from(&config.retry);

    let (shutdown_handle, shutdown) = shutdown::channel();
    let mut workers: Vec<JoinHandle<()>> = Vec::new();

    for component in &config.components {
        match component {
            Component::Builder => {
                let pool = pool.clone().expect("builder requires the database");
                let cache = cache.clone().expect("builder requires the cache");
                let producer = producer.clone();
                let broker = config.broker.clone();
                let topics = config.topics.clone();
                let builder_config = config.builder.clone();
                let retry = retry.clone();
                let shutdown = shutdown.clone();

                workers.push(tokio::spawn(supervise("builder", shutdown.clone(), move || {
                    let builder = SnapshotBuilder::new(
                        pool.clone(),
                        cache.clone(),
                        producer.clone(),
                        broker.clone(),
                        topics.clone(),
                        builder_config.clone(),
                        retry.clone(),
                        shutdown.clone(),
                    );
                    builder.run()
                })));
            }
            Component::Matcher => {
                let cache = cache.clone().expect("matcher requires the cache");
                let handle = IndexHandle::new();

                // Initial load happens before the consume loop starts so the
                // first alerts see whatever snapshot is already published.
                let mut reloader = HotReloader::new(
                    cache,
                    handle.clone(),
                    config.matcher.clone(),
                    shutdown.clone(),
                );
                reloader.load_initial().await?;

                let (nudge_tx, nudge_rx) = mpsc::channel(1);
                workers.push(tokio::spawn(run_to_completion(
                    "hot reloader",
                    reloader.run(nudge_rx),
                )));
                workers.push(tokio::spawn(run_to_completion(
                    "reload subscription",
                    reload::nudge_listener(
                        config.broker.clone(),
                        config.topics.clone(),
                        nudge_tx,
                        shutdown.clone(),
                    ),
                )));

                let producer = producer.clone();
                let broker = config.broker.clone();
                let topics = config.topics.clone();
                let retry = retry.clone();
                let shutdown = shutdown.clone();

                workers.push(tokio::spawn(supervise("matcher", shutdown.clone(), move || {
                    let runner = MatcherRunner::new(
                        handle.clone(),
                        producer.clone(),
                        broker.clone(),
                        topics.clone(),
                        retry.clone(),
                        shutdown.clone(),
                    );
                    runner.run()
                })));
            }
            Component::Notifier => {
                let pool = pool.clone().expect("notifier requires the database");
                let producer = producer.clone();
                let broker = config.broker.clone();
                let topics = config.topics.clone();
                let retry = retry.clone();
                let shutdown = shutdown.clone();

                workers.push(tokio::spawn(supervise("notifier", shutdown.clone(), move || {
                    let runner = NotifierRunner::new(
                        pool.clone(),
                        producer.clone(),
                        broker.clone(),
                        topics.clone(),
                        retry.clone(),
                        shutdown.clone(),
                    );
                    runner.run()
                })));
            }
            Component::Dispatcher => {
                let pool = pool.clone().expect("dispatcher requires the database");
                let registry = Arc::new(ChannelRegistry::standard(&config.channels)?);
                let producer = producer.clone();
                let broker = config.broker.clone();
                let topics = config.topics.clone();
                let retry = retry.clone();
                let shutdown = shutdown.clone();

                workers.push(tokio::spawn(supervise(
                    "dispatcher",
                    shutdown.clone(),
                    move || {
                        let runner = DispatcherRunner::new(
                            pool.clone(),
                            producer.clone(),
                            registry.clone(),
                            broker.clone(),
                            topics.clone(),
                            retry.clone(),
                            shutdown.clone(),
                        );
                        runner.run()
                    },
                )));
            }
        }
    }

    // Trigger the cooperative drain on Ctrl+C or SIGTERM.
    tokio::spawn(shutdown_handle.trigger_on_signal());

    for worker in workers {
        if let Err(e) = worker.await {
            log::error!("Worker task panicked: {}", e);
        }
    }

    log::info!("All workers drained, exiting");
    Ok(())
}

/// Restarts a consumer loop after runtime failures until shutdown.
///
/// A failed loop exits without committing its in-flight message; the fresh
/// session resumes from the last committed offset, which is exactly the
/// redelivery the at-least-once contract expects.
async fn supervise<F, Fut>(name: &'static str, shutdown: Shutdown, mut factory: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = PipelineResult<()>>,
{
    loop {
        match factory().await {
            Ok(()) => break,
            Err(e) => {
                if shutdown.is_triggered() {
                    break;
                }
                log::error!("{} loop failed, restarting: {}", name, e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

/// Runs an auxiliary task once, logging its outcome.
async fn run_to_completion<Fut>(name: &'static str, task: Fut)
where
    Fut: std::future::Future<Output = PipelineResult<()>>,
{
    if let Err(e) = task.await {
        log::error!("{} exited with error: {}", name, e);
    }
}
