//! mrt-relay
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌────────┐ T1,T2 ┌──────────────────┐ T3..T6 ┌──────────────────┐
//!   │ source │──────▶│ LB1 group backend │───────▶│ LB2 group backend │
//!   │        │◀──────┴──────────────────┴────────┴──────────────────┘
//!   └────────┘  response of the last hop
//!        │
//!        ├── relay (orchestrator, aggregator, report sinks)
//!        ├── load_balancer (registries, strategies) + health
//!        └── net (frames, transport, frame server)
//! ```
//!
//! Subcommands:
//! - `source`   run the paced request loop and write the report
//! - `service`  run one backend service listener
//! - `services` run a listener for every configured backend address

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

use mrt_relay::admin::{self, AdminState};
use mrt_relay::config::RelayConfig;
use mrt_relay::health::active::HealthMonitor;
use mrt_relay::lifecycle::startup::{self, ServiceFleet};
use mrt_relay::lifecycle::{signals, Shutdown};
use mrt_relay::net::FrameServer;
use mrt_relay::observability::{logging, metrics};
use mrt_relay::relay::source::{load_payloads, Source};
use mrt_relay::relay::{JsonReportSink, MetricsAggregator, Relay, TracingSink};
use mrt_relay::service::ServiceHandler;

#[derive(Parser)]
#[command(name = "mrt-relay", version)]
#[command(about = "Relay requests through two load balancer groups and measure every hop", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Issue paced requests through both groups
    Source,
    /// Serve as one backend service
    Service {
        /// Listen address, overrides `listener.bind_address`
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Serve every backend address of both groups in this process
    Services,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = startup::load(cli.config.as_deref())?;

    logging::init(&config.observability.log_level);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?cli.config,
        "mrt-relay starting"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let shutdown = Shutdown::new();
    signals::spawn_handler(shutdown.clone());

    match cli.command {
        Command::Source => run_source(config, &shutdown).await?,
        Command::Service { bind } => run_service(config, bind, &shutdown).await?,
        Command::Services => run_services(config, &shutdown).await?,
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn run_source(config: RelayConfig, shutdown: &Shutdown) -> Result<(), Box<dyn std::error::Error>> {
    let relay = Arc::new(Relay::from_config(&config)?);
    let aggregator = Arc::new(MetricsAggregator::new());

    for (name, group) in [("lb1", &config.load_balancer1), ("lb2", &config.load_balancer2)] {
        tracing::info!(group = name, strategy = ?group.strategy, services = ?group.services, "Load balancer configured");
    }

    let payloads = load_payloads(Path::new(&config.source.payload_dir))?;
    let mut source = Source::new(Arc::clone(&relay), Arc::clone(&aggregator), payloads, &config.source)?
        .with_sink(TracingSink);
    if let Some(path) = &config.source.report_path {
        source = source.with_sink(JsonReportSink::new(path));
    }

    let monitor = HealthMonitor::new(
        vec![Arc::clone(relay.lb1()), Arc::clone(relay.lb2())],
        config.health_check.clone(),
    );
    let monitor_handle = tokio::spawn(monitor.run(shutdown.subscribe()));

    let admin_handle = if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        let state = AdminState {
            lb1: Arc::clone(relay.lb1()),
            lb2: Arc::clone(relay.lb2()),
            aggregator: Arc::clone(&aggregator),
            api_key: Arc::from(config.admin.api_key.as_str()),
            started: Instant::now(),
        };
        Some(tokio::spawn(admin::serve(listener, state, shutdown.subscribe())))
    } else {
        None
    };

    let report = source.run(shutdown.subscribe()).await;
    tracing::info!(
        requests = report.requests,
        successes = report.successes,
        failures = report.failures,
        "Source finished"
    );

    // The run may end on its own deadline; stop the background tasks too.
    shutdown.trigger();
    if let Err(e) = monitor_handle.await {
        tracing::error!(error = %e, "Health monitor task failed");
    }
    if let Some(handle) = admin_handle {
        match handle.await {
            Ok(Err(e)) => tracing::error!(error = %e, "Admin API failed"),
            Err(e) => tracing::error!(error = %e, "Admin API task failed"),
            Ok(Ok(())) => {}
        }
    }
    Ok(())
}

async fn run_service(
    config: RelayConfig,
    bind: Option<String>,
    shutdown: &Shutdown,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut listener = config.listener.clone();
    if let Some(bind) = bind {
        listener.bind_address = bind;
    }

    let server = FrameServer::bind(&listener, config.transport.max_frame_bytes, ServiceHandler::new()).await?;
    server
        .run(shutdown.subscribe(), config.shutdown.grace_period())
        .await;
    Ok(())
}

async fn run_services(config: RelayConfig, shutdown: &Shutdown) -> Result<(), Box<dyn std::error::Error>> {
    let addresses = startup::service_addresses(&config);
    if addresses.is_empty() {
        return Err("no backend addresses configured in load_balancer1 or load_balancer2".into());
    }

    let fleet = ServiceFleet::start(
        &addresses,
        &config.listener,
        config.transport.max_frame_bytes,
        shutdown,
        config.shutdown.grace_period(),
    )
    .await?;
    for (configured, bound) in addresses.iter().zip(fleet.local_addrs()) {
        tracing::info!(configured = %configured, bound = %bound, "Service listening");
    }
    fleet.wait().await;
    Ok(())
}
