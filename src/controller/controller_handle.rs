//! Controller Handle - Unified API for joystick input
//!
//! Owns the lifecycle of the gilrs collector thread and defines the channel
//! pair through which joystick input reaches the command engines. Stick
//! positions travel on a watch channel, so a slow consumer only ever sees the
//! latest position. Point of view and button events travel on a bounded mpsc
//! channel and are never coalesced.

use std::thread::JoinHandle;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::AxisSample;

pub use super::event_collector::{
    CollectorError, CollectorSettings, DpadState, EventCollector, JoystickChannel, JoystickEvent,
};

/// Configuration settings for the controller subsystem
///
/// # Examples
///
/// ```rust
/// use wheelly_console::controller::ControllerSettings;
///
/// let settings = ControllerSettings {
///     joystick_deadzone: 0.08,
///     gamepad_name: Some("Logitech Extreme 3D".to_string()),
///     ..ControllerSettings::default()
/// };
/// assert_eq!(settings.event_buffer, 100);
/// ```
#[derive(Clone, Debug)]
pub struct ControllerSettings {
    /// Analog stick deadzone as a fraction (0.0-1.0)
    ///
    /// Prevents analog stick drift by ignoring small movements near the center position.
    pub joystick_deadzone: f32,

    /// Name of the gamepad to use, the first connected one if `None` or not found
    pub gamepad_name: Option<String>,

    /// Capacity of the point of view and button event channel
    pub event_buffer: usize,

    /// Sleep between two polls of an empty gilrs queue, in microseconds
    pub poll_interval_us: u64,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            joystick_deadzone: 0.05, // 5% deadzone for typical controllers
            gamepad_name: None,
            event_buffer: 100,
            poll_interval_us: 100,
        }
    }
}

/// Errors that can occur during controller initialization
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// The collector thread could not be started or joined
    #[error("Thread error: {0}")]
    ThreadError(String),
}

/// Producer side of the joystick channels
#[derive(Clone, Debug)]
pub struct JoystickSender {
    axis: watch::Sender<AxisSample>,
    events: mpsc::Sender<JoystickEvent>,
}

impl JoystickSender {
    /// Publishes a stick position, replacing any unread one
    pub fn send_axis(&self, sample: AxisSample) {
        self.axis.send_replace(sample);
    }

    /// Queues a discrete event without blocking
    pub fn send_event(&self, event: JoystickEvent) -> Result<(), CollectorError> {
        self.events
            .try_send(event)
            .map_err(|e| CollectorError::EventSendError(e.to_string()))
    }

    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }

    fn into_parts(self) -> (watch::Sender<AxisSample>, mpsc::Sender<JoystickEvent>) {
        (self.axis, self.events)
    }
}

/// Consumer side of the joystick channels
#[derive(Debug)]
pub struct JoystickChannels {
    pub axis: watch::Receiver<AxisSample>,
    pub events: mpsc::Receiver<JoystickEvent>,
}

/// Creates a connected sender and channel pair
pub fn joystick_channels(event_buffer: usize) -> (JoystickSender, JoystickChannels) {
    let (axis_tx, axis_rx) = watch::channel(AxisSample::default());
    let (event_tx, event_rx) = mpsc::channel(event_buffer.max(1));
    debug!(
        "Created joystick channels with event buffer capacity {}",
        event_buffer
    );
    (
        JoystickSender {
            axis: axis_tx,
            events: event_tx,
        },
        JoystickChannels {
            axis: axis_rx,
            events: event_rx,
        },
    )
}

/// Handle for the gilrs collector thread
///
/// gilrs is polled, so the collector runs on a dedicated OS thread rather
/// than on the tokio runtime. It stops when the cancellation token fires or
/// when the event receiver is dropped.
pub struct ControllerHandle {
    cancel: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl ControllerHandle {
    /// Spawns the collector thread feeding `sender`
    ///
    /// Returns once the thread is running; gilrs initialization failures are
    /// logged from the thread and leave the channels idle.
    pub fn spawn(
        settings: Option<ControllerSettings>,
        sender: JoystickSender,
        cancel: CancellationToken,
    ) -> Result<Self, ControllerError> {
        info!(
            "Initializing Controller system with settings: {:?}",
            settings
        );

        let settings = settings.unwrap_or_default();
        let collector_settings = CollectorSettings {
            joystick_deadzone: settings.joystick_deadzone,
            gamepad_name: settings.gamepad_name.clone(),
            poll_interval_us: settings.poll_interval_us,
        };

        let thread_cancel = cancel.clone();
        let thread = std::thread::Builder::new()
            .name("joystick-collector".to_string())
            .spawn(move || {
                let (axis_sender, event_sender) = sender.into_parts();
                match EventCollector::create(Some(collector_settings), axis_sender, event_sender) {
                    Ok(collector) => {
                        let mut collecting = collector.initialize();
                        collecting.run_collection_loop(thread_cancel);
                    }
                    Err(e) => error!("Failed to initialize Event Collector: {}", e),
                }
            })
            .map_err(|e| ControllerError::ThreadError(e.to_string()))?;

        info!("Event Collector thread started");
        Ok(Self {
            cancel,
            thread: Some(thread),
        })
    }

    /// Stops the collector thread and waits for it
    pub async fn shutdown(&mut self) -> Result<(), ControllerError> {
        self.cancel.cancel();
        let Some(thread) = self.thread.take() else {
            debug!("Event Collector already shut down");
            return Ok(());
        };

        tokio::task::spawn_blocking(move || thread.join())
            .await
            .map_err(|e| ControllerError::ThreadError(e.to_string()))?
            .map_err(|_| {
                warn!("Event Collector thread panicked");
                ControllerError::ThreadError("collector thread panicked".to_string())
            })?;
        info!("Event Collector stopped");
        Ok(())
    }
}
