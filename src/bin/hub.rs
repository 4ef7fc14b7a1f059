use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use occupancy_monitor::{
    RoundOrchestrator, RoundSettings, SchedulerHandle,
    broadcast::ChannelBroadcaster,
    clock::RoundClock,
    config::{Config, StorageConfig, read_config_file},
    records::RecordTracker,
    service::Service,
    storage::{MemoryStore, SampleStore},
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,

    /// Log level for the monitor (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init(level: LevelFilter) {
    let filter = filter::Targets::new().with_targets(vec![
        ("occupancy_monitor", level),
        ("occupancy_hub", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let level: LevelFilter = args
        .log_level
        .parse()
        .with_context(|| format!("invalid log level: {}", args.log_level))?;
    init(level);
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file).with_context(|| format!("failed to load {}", args.file))?;

    let (store, durable) = open_store(&config).await?;
    let services = build_services(&config)?;

    let broadcaster = Arc::new(ChannelBroadcaster::new(config.broadcast_capacity));
    spawn_update_logger(&broadcaster);

    let mut settings = RoundSettings::from_config(&config);
    if config.log_to_database && !(durable && settings.log_to_database) {
        warn!("log_to_database is set but no durable storage is configured, samples will not be kept");
        settings.log_to_database = false;
    }
    // the in-memory store only serves startup hydration; it never receives samples
    let sink = settings.log_to_database.then(|| Arc::clone(&store));

    let orchestrator = Arc::new(RoundOrchestrator::new(
        services,
        RoundClock::new(config.graph_duration_ms(), config.graph_max_points()),
        settings,
        broadcaster,
        sink,
    ));

    orchestrator
        .load_graph_points(store.as_ref(), Utc::now().timestamp_millis())
        .await
        .context("failed to load graph points")?;

    // rounds must not start before every record is known
    orchestrator
        .hydrate_records(&RecordTracker::new(Arc::clone(&store)))
        .await
        .context("failed to load records")?;

    let (scheduler, task) = SchedulerHandle::spawn(Arc::clone(&orchestrator), config.ping_interval());
    info!(
        "polling {} services every {}ms",
        config.servers.len(),
        config.rates.ping_all_ms
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");

    scheduler.shutdown().await?;
    task.await.context("scheduler task failed")?;
    store.close().await?;

    Ok(())
}

/// Open the configured backend; the flag tells whether it outlives the process
async fn open_store(config: &Config) -> anyhow::Result<(Arc<dyn SampleStore>, bool)> {
    match config.storage.clone().unwrap_or_default() {
        StorageConfig::None => {
            debug!("no storage backend, starting with empty graphs and records");
            Ok((Arc::new(MemoryStore::new()), false))
        }

        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => {
            let store = occupancy_monitor::storage::sqlite::SqliteStore::new(&path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            Ok((Arc::new(store), true))
        }

        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { path } => {
            warn!(
                "built without storage-sqlite, ignoring {}",
                path.display()
            );
            Ok((Arc::new(MemoryStore::new()), false))
        }
    }
}

fn build_services(config: &Config) -> anyhow::Result<Vec<Service>> {
    config
        .servers
        .iter()
        .enumerate()
        .map(|(id, server)| {
            Service::from_config(id, server, config.graph_duration_ms())
                .with_context(|| format!("failed to set up probe for {}", server.name))
        })
        .collect()
}

fn spawn_update_logger(broadcaster: &ChannelBroadcaster) {
    let mut rx = broadcaster.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(message) => match serde_json::to_string(&message) {
                    Ok(json) => trace!("round update: {json}"),
                    Err(e) => warn!("failed to serialize round update: {e}"),
                },
                Err(RecvError::Lagged(skipped)) => warn!("update logger lagged, skipped {skipped} updates"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}
