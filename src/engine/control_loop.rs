//! Fixed cadence polling of a command engine
//!
//! Each cycle reads the latest telemetry, asks the engine for a command and
//! forwards it downstream without blocking. A slow consumer loses cycles, it
//! never stalls the loop.

use crate::engine::composer::CommandState;
use crate::engine::error::EngineError;
use crate::engine::InferenceEngine;
use crate::telemetry::RobotStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const STATS_INTERVAL: Duration = Duration::from_secs(10);

/// Handle of the running control loop task
#[derive(Debug)]
pub struct ControlLoop {
    cancel: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl ControlLoop {
    /// Starts polling `engine` every `interval`
    ///
    /// Stops when `cancel` fires or when `output` is closed.
    pub fn spawn(
        engine: Arc<dyn InferenceEngine>,
        telemetry: watch::Receiver<RobotStatus>,
        output: mpsc::Sender<CommandState>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Result<Self, EngineError> {
        if interval.is_zero() {
            return Err(EngineError::InvalidSettings(
                "control interval must be positive".to_string(),
            ));
        }
        info!(
            "Starting control loop for {} engine every {:?}",
            engine.engine_type(),
            interval
        );

        let task_cancel = cancel.clone();
        let task_handle = tokio::spawn(async move {
            run_cycles(engine, telemetry, output, interval, task_cancel).await;
        });

        Ok(Self {
            cancel,
            task_handle: Some(task_handle),
        })
    }

    /// Stops the loop and waits for its task
    pub async fn shutdown(&mut self) -> Result<(), EngineError> {
        self.cancel.cancel();
        let Some(handle) = self.task_handle.take() else {
            debug!("Control loop already shut down");
            return Ok(());
        };
        handle.await.map_err(|e| {
            error!("Control loop task panicked: {}", e);
            EngineError::ThreadError(format!("Control loop task panicked: {}", e))
        })
    }
}

async fn run_cycles(
    engine: Arc<dyn InferenceEngine>,
    telemetry: watch::Receiver<RobotStatus>,
    output: mpsc::Sender<CommandState>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut last_command: Option<CommandState> = None;
    let mut cycles: u64 = 0;
    let mut dropped: u64 = 0;
    let mut last_stats = Instant::now();

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!("Shutdown signal received for control loop");
                break;
            }

            _ = ticker.tick() => {
                let status = telemetry.borrow().clone();
                let command = engine.process(&status);
                cycles += 1;

                if last_command != Some(command) {
                    info!("Command {}", command);
                    last_command = Some(command);
                }

                match output.try_send(command) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        dropped += 1;
                        warn!("Command channel full, dropping command");
                    }
                    Err(TrySendError::Closed(_)) => {
                        warn!("Command receiver dropped, stopping control loop");
                        break;
                    }
                }

                if last_stats.elapsed() >= STATS_INTERVAL {
                    debug!(
                        "Control loop stats: {} cycles, {} dropped in last {:?}",
                        cycles,
                        dropped,
                        last_stats.elapsed()
                    );
                    cycles = 0;
                    dropped = 0;
                    last_stats = Instant::now();
                }
            }
        }
    }

    info!("Control loop finished");
}
