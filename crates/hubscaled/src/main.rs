//! hubscaled: the hubscale daemon.
//!
//! Serves the KEDA external scaler for Durable Task hubs, or computes a
//! single scale reading from the command line.
//!
//! # Usage
//!
//! ```text
//! hubscaled serve --listen 0.0.0.0:4370 --config /etc/hubscale/hubscaled.toml
//! hubscaled check --task-hub OrdersHub --connection-from-env AzureWebJobsStorage
//! ```

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hubscale_engine::{MetricSpec, MetricValue, ScaleManager, ScalingOptions};
use hubscale_scaler::{
    AzureStorageFactory, ConnectionSource, DEFAULT_CONNECTION_ENV, ExternalScalerService,
    StorageFactory,
};

use config::DaemonConfig;

const DEFAULT_LOG_FILTER: &str = "info,hubscaled=debug,hubscale_engine=debug";

#[derive(Parser)]
#[command(name = "hubscaled", about = "KEDA external scaler for Durable Task hubs")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the external scaler gRPC server.
    Serve {
        /// Address to listen on. Overrides `server.listen` from the config file.
        #[arg(long)]
        listen: Option<SocketAddr>,

        /// Path to hubscaled.toml.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Compute one scale reading for a task hub and print it as JSON.
    Check {
        /// Task hub name.
        #[arg(long)]
        task_hub: String,

        /// Environment variable holding the storage connection string.
        #[arg(long, default_value = DEFAULT_CONNECTION_ENV)]
        connection_from_env: String,

        /// Activity work items one worker handles.
        #[arg(long, default_value = "10")]
        max_activities: u32,

        /// Orchestration messages one worker handles.
        #[arg(long, default_value = "5")]
        max_orchestrations: u32,

        /// Discover partitions from the partitions table.
        #[arg(long)]
        table_partitions: bool,

        /// Path to hubscaled.toml.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Command::Serve { listen, config } => {
            let config = DaemonConfig::load(config.as_deref())?;
            let listen = listen.unwrap_or(config.server.listen);
            serve(listen, &config).await
        }
        Command::Check {
            task_hub,
            connection_from_env,
            max_activities,
            max_orchestrations,
            table_partitions,
            config,
        } => {
            let config = DaemonConfig::load(config.as_deref())?;
            let options = ScalingOptions::new(task_hub)
                .with_max_activities_per_worker(max_activities)
                .with_max_orchestrations_per_worker(max_orchestrations)
                .with_table_partition_management(table_partitions);
            check(options, connection_from_env, &config).await
        }
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn serve(listen: SocketAddr, config: &DaemonConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let storage = AzureStorageFactory::new(config.http_client()?);
    let scaler = ExternalScalerService::new(storage, shutdown.clone());

    info!(
        %listen,
        request_timeout_secs = config.storage.request_timeout_secs,
        "external scaler starting"
    );

    let signal = shutdown.clone();
    tonic::transport::Server::builder()
        .add_service(scaler.into_service())
        .serve_with_shutdown(listen, async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown signal received");
            signal.cancel();
        })
        .await?;

    info!("external scaler stopped");
    Ok(())
}

#[derive(Debug, Serialize)]
struct CheckReport {
    task_hub: String,
    active: bool,
    metric_spec: MetricSpec,
    metric_value: MetricValue,
}

async fn check(
    options: ScalingOptions,
    connection_env: String,
    config: &DaemonConfig,
) -> anyhow::Result<()> {
    let storage = AzureStorageFactory::new(config.http_client()?)
        .connect(&ConnectionSource::FromEnv(connection_env))?;
    let task_hub = options.task_hub_name.clone();
    let manager = ScaleManager::new(storage, options)?;

    let cancel = CancellationToken::new();
    let report = CheckReport {
        task_hub,
        active: manager.is_active(&cancel).await?,
        metric_spec: manager.metric_spec(),
        metric_value: manager.metric_value(&cancel).await?,
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
