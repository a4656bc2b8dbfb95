//! Horae Controller Manager
//!
//! Watches UsageTemplate resources, validates them and drives the usage
//! evaluator that turns Prometheus history into per-hour usage profiles.

mod evaluation;
mod events;
mod metrics;
mod reconciler;
mod server;
mod status;

use crate::evaluation::UsageEvaluator;
use crate::reconciler::{error_policy, reconcile, Context};
use clap::Parser;
use dashmap::DashMap;
use futures::StreamExt;
use horae_api::UsageTemplate;
use kube::api::Api;
use kube::runtime::controller::Controller;
use kube::runtime::watcher;
use kube::Client;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "horae-controller")]
#[command(about = "Horae usage template controller")]
struct Args {
    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: SocketAddr,

    /// Health probe bind address
    #[arg(long, env = "PROBE_ADDR", default_value = "0.0.0.0:8081")]
    probe_addr: SocketAddr,

    /// QPS against the apiserver
    #[arg(long, env = "APISERVER_QPS", default_value = "5")]
    qps: u32,

    /// Burst against the apiserver
    #[arg(long, env = "APISERVER_BURST", default_value = "10")]
    burst: u32,

    /// Reconcile workers
    #[arg(long, env = "WORKERS", default_value = "1")]
    workers: usize,

    /// Enable leader election
    #[arg(long, env = "ENABLE_LEADER_ELECTION")]
    enable_leader_election: bool,

    /// Timeout for reconciling and pulling metrics, in minutes
    #[arg(long, env = "TIMEOUT_MINUTES", default_value = "1")]
    timeout_minutes: u64,

    /// Evaluation resolution for Prometheus range queries, in seconds
    #[arg(long, env = "EVALUATION_RESOLUTION_SECONDS", default_value = "300")]
    evaluation_resolution_seconds: u64,

    /// Prometheus API address
    #[arg(long, env = "PROMETHEUS_ADDRESS", default_value = "http://prometheus:9090")]
    prometheus_address: String,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    dotenvy::dotenv().ok();

    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .init();

    info!("Starting Horae controller");
    info!("  Metrics address: {}", args.metrics_addr);
    info!("  Probe address: {}", args.probe_addr);
    info!("  Prometheus address: {}", args.prometheus_address);
    info!(
        "  Apiserver qps/burst: {}/{} (advisory), workers: {}",
        args.qps, args.burst, args.workers
    );
    if args.enable_leader_election {
        info!("  Leader election requested; running in single-replica mode");
    }

    metrics::init_metrics();

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let shutdown = CancellationToken::new();

    let evaluator = Arc::new(UsageEvaluator::new(
        client.clone(),
        Duration::from_secs(args.evaluation_resolution_seconds),
        Duration::from_secs(args.timeout_minutes * 60),
        &args.prometheus_address,
        shutdown.clone(),
    )?);

    let evaluator_handle = tokio::spawn(evaluator.clone().run());

    let metrics_handle = tokio::spawn(server::serve(args.metrics_addr, server::metrics_router()));
    let probe_handle = tokio::spawn(server::serve(args.probe_addr, server::probe_router()));

    let templates: Api<UsageTemplate> = Api::all(client.clone());
    let ctx = Arc::new(Context {
        client,
        evaluator,
        generations: DashMap::new(),
    });

    info!("Starting controller for UsageTemplate resources");
    let controller = Controller::new(templates, watcher::Config::default())
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok(object) => info!(?object, "reconciliation successful"),
                Err(err) => error!(%err, "reconciliation error"),
            }
        });

    tokio::select! {
        _ = controller => {
            error!("controller stream terminated");
            shutdown.cancel();
            anyhow::bail!("controller stream terminated unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down Horae controller");
            shutdown.cancel();
        }
    }

    let _ = evaluator_handle.await;
    metrics_handle.abort();
    probe_handle.abort();

    info!("Horae controller shut down");
    Ok(())
}
