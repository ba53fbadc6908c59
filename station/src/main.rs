use clap::Parser;
use station::collection::{CollectionLoop, RunStats};
use station::config::{Overrides, StationConfig, TransportKind};
use station::dashboard::{Dashboard, DashboardHandle};
use station::events::{DataLogger, EventSender};
use station::metrics;
use station::mqtt::MqttTransport;
use station::payload::PayloadBuilder;
use station::sampler::VirtualSampler;
use station::shutdown::{self, Shutdown};
use station::spill::SpillQueue;
use station::transport::{HttpTransport, Transport};
use station::uplink::{RetryPolicy, UplinkClient};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DASHBOARD_CHANNEL_CAPACITY: usize = 16;

#[derive(Parser, Debug)]
#[command(name = "station", version, about = "Field sensor station with store-and-forward uplink")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "STATION_CONFIG")]
    config: Option<PathBuf>,

    /// Collector host
    #[arg(long, env = "SERVER_HOST")]
    server_host: Option<String>,

    /// Collector HTTP port
    #[arg(long, env = "HTTP_PORT")]
    http_port: Option<u16>,

    /// Seconds between collections
    #[arg(long, env = "COLLECT_INTERVAL")]
    interval: Option<u64>,

    /// Upload transport: http or mqtt
    #[arg(long, env = "UPLOAD_METHOD")]
    transport: Option<String>,

    /// Do not start the local dashboard
    #[arg(long)]
    no_dashboard: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = StationConfig::load_or_default(args.config.as_deref())?;
    config.apply(Overrides {
        server_host: args.server_host,
        http_port: args.http_port,
        interval_secs: args.interval,
        transport: args
            .transport
            .as_deref()
            .map(str::parse::<TransportKind>)
            .transpose()?,
        disable_dashboard: args.no_dashboard,
    });

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("Starting station");

    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            error!("Invalid configuration: {}", problem);
        }
        std::process::exit(1);
    }
    config.log_summary();

    metrics::init_metrics();

    let (trigger, shutdown) = Shutdown::new();
    tokio::spawn(async move {
        shutdown::signal().await;
        info!("Received shutdown signal");
        trigger.trigger();
    });

    let (events, events_rx) = EventSender::channel();
    let backup_dir = config
        .logging
        .backup_enabled
        .then(|| config.logging.backup_dir.clone());
    let logger = tokio::spawn(DataLogger::new(backup_dir).run(events_rx));

    let dashboard = if config.dashboard.enabled {
        start_dashboard(&config, shutdown.clone()).await
    } else {
        None
    };

    let queue = if config.cache.enabled {
        SpillQueue::load(&config.cache.path)
    } else {
        SpillQueue::in_memory()
    };
    let retry = RetryPolicy::new(config.server.retry_times);

    let stats = match config.server.transport {
        TransportKind::Http => {
            let transport = HttpTransport::new(&config.server, PayloadBuilder::default())?
                .verbose(config.logging.verbose);
            let uplink = UplinkClient::new(transport, queue, retry, events.clone(), shutdown.clone());
            run_collection(&config, uplink, events, dashboard, shutdown).await
        }
        TransportKind::Mqtt => {
            let transport = MqttTransport::connect(
                &config.server.host,
                &config.mqtt,
                &config.collection.device_id,
            )?;
            let uplink = UplinkClient::new(transport, queue, retry, events.clone(), shutdown.clone());
            run_collection(&config, uplink, events, dashboard, shutdown).await
        }
    };

    // The loop and uplink held the last event senders
    match logger.await {
        Ok(logger) => {
            if let Some(at) = logger.last_successful_upload() {
                info!("Last successful upload: {}", at.to_rfc3339());
            }
        }
        Err(e) => warn!("Data logger task failed: {}", e),
    }

    info!(
        "Station stopped after {} collections ({:.1}% delivered)",
        stats.collections,
        stats.success_rate()
    );
    Ok(())
}

async fn run_collection<T: Transport>(
    config: &StationConfig,
    uplink: UplinkClient<T>,
    events: EventSender,
    dashboard: Option<DashboardHandle>,
    shutdown: Shutdown,
) -> RunStats {
    let sampler = VirtualSampler::virtual_sensors(config.collection.sensors.clone());
    let mut collection = CollectionLoop::new(sampler, uplink, events, config.collection.interval());
    if let Some(handle) = dashboard {
        collection = collection.with_dashboard(handle);
    }

    collection.run(shutdown).await
}

/// A dashboard that cannot bind is logged and skipped
async fn start_dashboard(config: &StationConfig, shutdown: Shutdown) -> Option<DashboardHandle> {
    let addr = format!("0.0.0.0:{}", config.dashboard.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!("Dashboard disabled, failed to bind to {}: {}", addr, e);
            return None;
        }
    };

    let (dashboard, handle) = Dashboard::new(config.dashboard.history_len, DASHBOARD_CHANNEL_CAPACITY);
    tokio::spawn(dashboard.serve(listener, shutdown));
    Some(handle)
}
