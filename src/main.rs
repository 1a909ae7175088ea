use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::{broadcast, watch};

use haven_core::clock::SystemClock;
use haven_core::events::SessionEvent;
use haven_counselor::{CounselorPool, PersonaResponder};
use haven_engine::{ActorDeps, EscalationConfig, RiskScorer, SessionTimings, SimulatedDispatcher};
use haven_resources::ResourceCatalog;
use haven_store::{Database, StoreSpool};
use haven_telemetry::{init_telemetry, TelemetryConfig};

/// Crisis support session server.
#[derive(Parser, Debug)]
#[command(name = "haven", version)]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = 8787)]
    port: u16,

    /// Data directory for databases. Defaults to ~/.haven.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Default log level (overridden by RUST_LOG).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let data_dir = args.data_dir.unwrap_or_else(|| dirs_home().join(".haven"));
    let db_dir = data_dir.join("database");
    std::fs::create_dir_all(&db_dir).expect("Failed to create database directory");

    let log_level = args
        .log_level
        .parse()
        .unwrap_or(tracing::Level::INFO);
    let telemetry = init_telemetry(TelemetryConfig {
        log_level,
        log_db_path: db_dir.join("haven-logs.db"),
        metrics_db_path: db_dir.join("haven-metrics.db"),
        ..TelemetryConfig::default()
    });

    tracing::info!("Starting haven server");

    let db_path = db_dir.join("haven.db");
    let db = Database::open(&db_path).expect("Failed to open database");
    tracing::info!(path = %db_path.display(), "Database opened");

    // Connectivity signal for the persistence spool. The sender lives in
    // the shared Connectivity handle; the system.connectivity RPC flips
    // it when the store goes unreachable or comes back.
    let (online_tx, online_rx) = watch::channel(true);
    let connectivity = Arc::new(haven_server::Connectivity::new(online_tx));
    let metrics = telemetry.metrics_handle();
    let spool = StoreSpool::spawn_with_metrics(db.clone(), online_rx, metrics.clone());

    let (event_tx, _) = broadcast::channel::<SessionEvent>(1024);

    let deps = ActorDeps {
        pool: Arc::new(CounselorPool::default()),
        responder: Arc::new(PersonaResponder),
        dispatcher: Arc::new(SimulatedDispatcher),
        scorer: RiskScorer::default(),
        escalation: EscalationConfig::default(),
        clock: Arc::new(SystemClock),
        events: event_tx.clone(),
        spool,
        metrics,
        timings: SessionTimings::default(),
    };
    let service = Arc::new(haven_server::EngineService::new(deps));

    let handler_state = Arc::new(
        haven_server::HandlerState::new(db, Arc::new(ResourceCatalog::new()))
            .with_service(service)
            .with_telemetry(Arc::new(telemetry))
            .with_connectivity(connectivity),
    );

    let config = haven_server::ServerConfig {
        port: args.port,
        ..Default::default()
    };
    let handle = haven_server::start(config, handler_state, event_tx)
        .await
        .expect("Failed to start server");

    tracing::info!(port = handle.port, "haven server ready");

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for ctrl+c");

    tracing::info!("Shutting down");
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
