mod app;
mod bluetooth;
mod command;
mod config;
mod error;
mod models;
mod render;
mod session;
mod storage;
mod telemetry;
mod utils;

use log::{error, info};
use std::io;
use tokio::task::LocalSet;

use app::App;
use bluetooth::BluerTransport;
use command::spawn_stdin_reader;
use config::AppConfig;
use render::TerminalSurface;
use utils::WallClock;

async fn run(config: AppConfig, wall: WallClock) -> Result<(), Box<dyn std::error::Error>> {
    let transport = match BluerTransport::new().await {
        Ok(transport) => transport,
        Err(e) => {
            error!("Failed to initialize Bluetooth: {}", e);
            return Err(e.into());
        }
    };

    // Handle Ctrl+C gracefully
    let (tx, rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = tx.send(());
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    let lines = spawn_stdin_reader();

    let mut app = App::new(transport, &config, wall);
    if config.autoconnect {
        app.autoconnect();
    }

    let mut surface = TerminalSurface::new(io::stdout());
    app.run(lines, rx, &mut surface).await;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // The local offset must be read before any other thread exists
    let wall = WallClock::local();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match AppConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    // Sessions, buffers and log files are only touched from this thread
    let local = LocalSet::new();
    match runtime.block_on(local.run_until(run(config, wall))) {
        Ok(()) => info!("Program completed successfully"),
        Err(e) => {
            error!("Fatal error: {}", e);
            return Err(e);
        }
    }

    Ok(())
}
