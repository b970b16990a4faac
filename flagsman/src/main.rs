use clap::Parser;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

mod config;

use flagcache::api;
use flagcache::lists::StaticLists;
use flagcache::metrics_defs::{ALL_METRICS, MetricType};
use flagcache::persistence::FilesystemSnapshotStore;
use flagcache::service::FlagService;

#[derive(Parser)]
#[command(name = "flagsman", about = "Feature flag aggregation service")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = config::Config::from_file(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Keep the guard alive for the life of the process
    let _sentry_guard = config.common.logging.as_ref().map(|logging| {
        sentry::init((
            logging.sentry_dsn.clone(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    if let Some(metrics_config) = &config.common.metrics {
        install_metrics_recorder(metrics_config)?;
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    rt.block_on(run(config.flagcache))?;

    Ok(())
}

async fn run(config: flagcache::config::Config) -> Result<(), api::ApiError> {
    let store = Arc::new(FilesystemSnapshotStore::new(&config.data.snapshot_path));
    let lists = StaticLists::load(&config.data.whitelist_path, &config.data.risklist_path);

    tracing::info!("starting flag service");
    let service = FlagService::start(&config, store, lists).await;
    tracing::info!(ready = service.is_ready(), "initial load complete");

    api::serve(config.listener, service).await
}

fn install_metrics_recorder(config: &config::MetricsConfig) -> Result<(), Box<dyn Error>> {
    let recorder = metrics_exporter_statsd::StatsdBuilder::from(
        config.statsd_host.as_str(),
        config.statsd_port,
    )
    .with_queue_size(5000)
    .with_buffer_size(256)
    .build(Some("flagsman"))?;

    metrics::set_global_recorder(recorder)
        .map_err(|_| "failed to install metrics recorder")?;

    for def in ALL_METRICS {
        match def.metric_type {
            MetricType::Counter => metrics::describe_counter!(def.name, def.description),
            MetricType::Histogram => metrics::describe_histogram!(def.name, def.description),
        }
    }

    Ok(())
}
