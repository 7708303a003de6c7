// src/main.rs - Host entry point: machine actor, HTTP API and serial/stdin ingestion
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use wirebend_rs::config;
use wirebend_rs::hardware::SystemClock;
use wirebend_rs::hardware::sim::sim_rig;
use wirebend_rs::machine::{Machine, MachineRequest, REQUEST_CHANNEL_DEPTH};
use wirebend_rs::persistence::FileStore;
use wirebend_rs::{FIRMWARE_VERSION, transport, web};

#[derive(Debug, Parser)]
#[command(name = "bender-host", version, about = "Wire bender command execution host")]
struct Cli {
    /// Machine configuration file.
    #[arg(default_value = "bender.toml")]
    config: PathBuf,
    /// Serial device to read commands from (overrides the config file).
    #[arg(long)]
    serial: Option<String>,
    /// HTTP listen address (overrides the config file).
    #[arg(long)]
    bind: Option<String>,
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();

    // Initialize logging
    let level = match cli.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    tracing::info!("Starting wire bender host");
    tracing::info!("Version: {}", FIRMWARE_VERSION);
    tracing::info!("Loading configuration from: {}", cli.config.display());

    let mut config = config::load_config_or_default(&cli.config).map_err(|e| {
        tracing::error!("Failed to load config from '{}': {}", cli.config.display(), e);
        Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
    })?;
    if let Some(serial) = cli.serial {
        config.transport.serial_port = Some(serial);
    }
    if let Some(bind) = cli.bind {
        config.transport.http_bind = bind;
    }

    tracing::info!(
        "Feedrates X={} Z={} steps/s, servo limits [{}, {}]",
        config.machine.x_feedrate,
        config.machine.z_feedrate,
        config.machine.servo_min_angle,
        config.machine.servo_max_angle
    );

    // No GPIO on the host: actuators are simulated, timing is real.
    let (board, light, _probes) = sim_rig(Arc::new(SystemClock::new()));

    // Set up a channel for communication between transports and the machine task.
    let (machine_tx, machine_rx) = mpsc::channel::<MachineRequest>(REQUEST_CHANNEL_DEPTH);

    let mut machine = Machine::new(&config, board, Box::new(light))
        .with_store(Box::new(FileStore::new(config.storage.path.clone())))
        .with_requests(machine_rx);
    machine.start();

    // Pulse trains and delays busy-wait, so the machine gets its own thread.
    // It stops once every request sender is dropped and its queue has drained.
    tokio::task::spawn_blocking(move || machine.run());

    let serial_tx = machine_tx.clone();
    let serial_port = config.transport.serial_port.clone();
    let baud = config.transport.baud;
    let idle_flush = Duration::from_millis(config.transport.flush_idle_ms);
    tokio::spawn(async move {
        let result = match serial_port {
            Some(path) => transport::run_serial(&path, baud, idle_flush, serial_tx).await,
            None => transport::run_stdin(idle_flush, serial_tx).await,
        };
        if let Err(e) = result {
            tracing::error!("Command transport failed: {}", e);
        }
    });

    // Create the Axum router, passing it the channel sender.
    let app = web::api::create_router(machine_tx);
    let listener = tokio::net::TcpListener::bind(&config.transport.http_bind).await?;
    tracing::info!("Web API listening on http://{}", listener.local_addr()?);

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                tracing::error!("Web server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }

    Ok(())
}
