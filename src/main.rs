use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use wheelly_console::config::ConsoleConfig;
use wheelly_console::controller::{joystick_channels, ControllerHandle};
use wheelly_console::engine::{
    ControlLoop, EngineType, InferenceEngine, ManualEngine, ManualEngineHandle, StopEngine,
};
use wheelly_console::telemetry::RobotStatus;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = ConsoleConfig::default_path();
    if let Err(e) = ConsoleConfig::ensure_default_config(&config_path).await {
        warn!("Unable to write default configuration: {}", e);
    }
    let config = ConsoleConfig::load_or_default(&config_path)
        .await
        .map_err(|e| eyre!("Failed to load configuration: {}", e))?;
    info!("Using {} engine", config.engine);

    let cancel = CancellationToken::new();

    // Joystick only when driving by hand
    let mut controller_handle: Option<ControllerHandle> = None;
    let mut manual_handle: Option<ManualEngineHandle> = None;
    let engine: Arc<dyn InferenceEngine> = match config.engine {
        EngineType::Manual => {
            let (joystick_sender, channels) = joystick_channels(config.joystick.event_buffer);
            controller_handle = Some(
                ControllerHandle::spawn(
                    Some(config.controller_settings()),
                    joystick_sender,
                    cancel.child_token(),
                )
                .map_err(|e| eyre!("Failed to spawn controller: {}", e))?,
            );

            let (engine, handle) =
                ManualEngine::start(config.manual_settings(), channels, cancel.child_token())
                    .map_err(|e| eyre!("Failed to start manual engine: {}", e))?;
            manual_handle = Some(handle);
            Arc::new(engine)
        }
        EngineType::Stop => Arc::new(StopEngine),
    };

    // Fed by the robot link once it is attached
    let (_status_tx, status_rx) = watch::channel(RobotStatus::default());
    let (command_tx, mut command_rx) = mpsc::channel(config.command_buffer);

    let mut control_loop = ControlLoop::spawn(
        engine,
        status_rx,
        command_tx,
        config.control_interval(),
        cancel.child_token(),
    )
    .map_err(|e| eyre!("Failed to start control loop: {}", e))?;

    let shutdown_signal = tokio::signal::ctrl_c();
    tokio::pin!(shutdown_signal);

    loop {
        tokio::select! {
            signal = &mut shutdown_signal => {
                if let Err(e) = signal {
                    error!("Unable to listen for shutdown signal: {}", e);
                }
                info!("Shutting down");
                break;
            }
            command = command_rx.recv() => {
                match command {
                    Some(command) => debug!("Outgoing command {}", command),
                    None => {
                        warn!("Control loop stopped");
                        break;
                    }
                }
            }
        }
    }

    cancel.cancel();
    control_loop.shutdown().await?;
    if let Some(mut handle) = manual_handle {
        handle.shutdown().await?;
    }
    if let Some(mut handle) = controller_handle {
        handle.shutdown().await?;
    }
    info!("Console stopped");
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
