//! Joystick driven engine
//!
//! A dispatcher task reacts to joystick input as it arrives and latches the
//! result in a [`CommandComposer`]; the control loop reads the latch through
//! [`InferenceEngine::process`] at its own pace.

use crate::controller::JoystickChannels;
use crate::engine::axis_mapper::{AxisMapper, AxisSample, MotorCommand, DEFAULT_SPEED_LEVELS};
use crate::engine::composer::{CommandComposer, CommandState};
use crate::engine::error::EngineError;
use crate::engine::scanner::{ScannerDirectionResolver, ScannerSettings};
use crate::engine::{EngineType, InferenceEngine};
use crate::telemetry::RobotStatus;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Settings of the manual engine
#[derive(Clone, Debug)]
pub struct ManualSettings {
    /// Odd number of speed levels over [-1, 1]
    pub speed_levels: u32,

    /// Scaling applied to the mapped wheel speeds
    pub max_speed: f64,

    pub scanner: ScannerSettings,
}

impl Default for ManualSettings {
    fn default() -> Self {
        Self {
            speed_levels: DEFAULT_SPEED_LEVELS,
            max_speed: 1.0,
            scanner: ScannerSettings::default(),
        }
    }
}

/// Engine that returns whatever the joystick last asked for
#[derive(Clone, Debug)]
pub struct ManualEngine {
    composer: CommandComposer,
}

impl ManualEngine {
    /// Validates the settings and spawns the input dispatcher
    ///
    /// The dispatcher runs until `cancel` fires or the handle is shut down.
    pub fn start(
        settings: ManualSettings,
        channels: JoystickChannels,
        cancel: CancellationToken,
    ) -> Result<(Self, ManualEngineHandle), EngineError> {
        info!("Starting manual engine with settings: {:?}", settings);

        if !settings.max_speed.is_finite() || settings.max_speed <= 0.0 {
            return Err(EngineError::InvalidSettings(format!(
                "max speed must be positive, got {}",
                settings.max_speed
            )));
        }
        let mapper = AxisMapper::new(settings.speed_levels)?;
        let resolver = ScannerDirectionResolver::new(settings.scanner)?;

        let composer = CommandComposer::new();
        let dispatcher = InputDispatcher {
            mapper,
            max_speed: settings.max_speed,
            resolver,
            composer: composer.clone(),
            channels,
        };

        let task_cancel = cancel.clone();
        let task_handle = tokio::spawn(async move {
            dispatcher.run_until_cancelled(task_cancel).await;
        });

        info!("Manual engine started");
        Ok((
            Self { composer },
            ManualEngineHandle {
                cancel,
                task_handle: Some(task_handle),
            },
        ))
    }

    /// Receiver notified on every command change
    pub fn subscribe(&self) -> watch::Receiver<CommandState> {
        self.composer.subscribe()
    }
}

impl InferenceEngine for ManualEngine {
    fn process(&self, _status: &RobotStatus) -> CommandState {
        self.composer.snapshot()
    }

    fn engine_type(&self) -> EngineType {
        EngineType::Manual
    }
}

/// Lifecycle handle of the dispatcher task
#[derive(Debug)]
pub struct ManualEngineHandle {
    cancel: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl ManualEngineHandle {
    /// Stops the dispatcher and waits for it to finish
    pub async fn shutdown(&mut self) -> Result<(), EngineError> {
        debug!("Sending shutdown signal to manual engine");
        self.cancel.cancel();

        match self.task_handle.take() {
            Some(handle) => handle.await.map_err(|e| {
                error!("Manual engine task panicked: {}", e);
                EngineError::ThreadError(format!("Engine task panicked: {}", e))
            }),
            None => {
                debug!("Manual engine already shut down");
                Ok(())
            }
        }
    }
}

struct InputDispatcher {
    mapper: AxisMapper,
    max_speed: f64,
    resolver: ScannerDirectionResolver,
    composer: CommandComposer,
    channels: JoystickChannels,
}

impl InputDispatcher {
    fn apply_axis(&self, sample: AxisSample) {
        let command = self.mapper.map(sample).scaled(self.max_speed);
        if command != self.composer.snapshot().motor {
            self.composer.update_motor(command);
        }
    }

    async fn run_until_cancelled(mut self, cancel: CancellationToken) {
        info!("Starting joystick dispatch loop");
        let mut axis_open = true;
        let mut events_open = true;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Shutdown signal received for manual engine");
                    break;
                }

                changed = self.channels.axis.changed(), if axis_open => {
                    match changed {
                        Ok(()) => {
                            let sample = *self.channels.axis.borrow_and_update();
                            self.apply_axis(sample);
                        }
                        Err(_) => {
                            warn!("Axis channel closed, stopping motors");
                            self.composer.update_motor(MotorCommand::NEUTRAL);
                            axis_open = false;
                        }
                    }
                }

                event = self.channels.events.recv(), if events_open => {
                    match event {
                        Some(event) => {
                            if let Some(angle) = self.resolver.handle_event(&event) {
                                self.composer.update_scanner(angle);
                            }
                        }
                        None => {
                            warn!("Joystick event channel closed");
                            events_open = false;
                        }
                    }
                }

                Some(angle) = self.resolver.next_sweep_step(), if self.resolver.sweep_in_flight() => {
                    self.composer.update_scanner(angle);
                }
            }
        }

        info!("Joystick dispatch loop finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{joystick_channels, JoystickChannel, JoystickEvent, JoystickSender};
    use crate::engine::scanner::SweepPolicy;
    use std::time::Duration;

    fn start(settings: ManualSettings) -> (ManualEngine, ManualEngineHandle, JoystickSender) {
        let (sender, channels) = joystick_channels(16);
        let (engine, handle) =
            ManualEngine::start(settings, channels, CancellationToken::new()).unwrap();
        (engine, handle, sender)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn starts_with_neutral_command() {
        let (engine, mut handle, _sender) = start(ManualSettings::default());
        settle().await;
        assert_eq!(engine.process(&RobotStatus::default()), CommandState::NEUTRAL);
        assert_eq!(engine.engine_type(), EngineType::Manual);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stick_drives_the_motors() {
        let (engine, mut handle, sender) = start(ManualSettings::default());

        sender.send_axis(AxisSample::new(0.0, -1.0));
        settle().await;
        assert_eq!(
            engine.process(&RobotStatus::default()).motor,
            MotorCommand::new(1.0, 1.0)
        );

        sender.send_axis(AxisSample::new(1.0, 0.0));
        settle().await;
        assert_eq!(
            engine.process(&RobotStatus::default()).motor,
            MotorCommand::new(1.0, -1.0)
        );
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn only_the_latest_stick_sample_counts() {
        let (engine, mut handle, sender) = start(ManualSettings::default());
        let mut updates = engine.subscribe();

        sender.send_axis(AxisSample::new(1.0, 0.0));
        sender.send_axis(AxisSample::new(-1.0, 0.0));
        sender.send_axis(AxisSample::new(0.0, 1.0));
        settle().await;

        assert_eq!(
            engine.process(&RobotStatus::default()).motor,
            MotorCommand::new(-1.0, -1.0)
        );
        assert!(updates.has_changed().unwrap());
        updates.borrow_and_update();
        assert!(!updates.has_changed().unwrap());
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn max_speed_scales_the_mapping() {
        let settings = ManualSettings {
            speed_levels: 9,
            max_speed: 4.0,
            ..ManualSettings::default()
        };
        let (engine, mut handle, sender) = start(settings);

        sender.send_axis(AxisSample::new(0.25, -0.5));
        settle().await;
        assert_eq!(
            engine.process(&RobotStatus::default()).motor,
            MotorCommand::new(2.0, 1.0)
        );
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn telemetry_is_ignored() {
        let (engine, mut handle, sender) = start(ManualSettings::default());
        sender
            .send_event(JoystickEvent::new(JoystickChannel::Pov, 0.375))
            .unwrap();
        settle().await;

        let low_battery = RobotStatus {
            supply_voltage: 6.1,
            obstacle_distance: Some(0.05),
            ..RobotStatus::default()
        };
        assert_eq!(
            engine.process(&low_battery),
            engine.process(&RobotStatus::default())
        );
        assert_eq!(engine.process(&low_battery).scanner, 45);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_button_walks_the_scanner() {
        let (engine, mut handle, sender) = start(ManualSettings::default());
        sender
            .send_event(JoystickEvent::new(JoystickChannel::Trigger, 1.0))
            .unwrap();
        settle().await;

        let mut seen = vec![engine.process(&RobotStatus::default()).scanner];
        for _ in 0..7 {
            tokio::time::sleep(Duration::from_millis(500)).await;
            seen.push(engine.process(&RobotStatus::default()).scanner);
        }
        assert_eq!(seen, vec![-90, -60, -30, 0, 30, 60, 90, 0]);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn pov_interrupts_a_sweep() {
        let (engine, mut handle, sender) = start(ManualSettings::default());
        sender
            .send_event(JoystickEvent::new(JoystickChannel::Top, 1.0))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(501)).await;
        assert_eq!(engine.process(&RobotStatus::default()).scanner, -60);

        sender
            .send_event(JoystickEvent::new(JoystickChannel::Pov, 0.5))
            .unwrap();
        settle().await;
        assert_eq!(engine.process(&RobotStatus::default()).scanner, 90);

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(engine.process(&RobotStatus::default()).scanner, 90);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn closed_input_stops_the_motors() {
        let (engine, mut handle, sender) = start(ManualSettings::default());
        sender.send_axis(AxisSample::new(0.0, -1.0));
        settle().await;
        assert!(!engine.process(&RobotStatus::default()).motor.is_neutral());

        drop(sender);
        settle().await;
        assert!(engine.process(&RobotStatus::default()).motor.is_neutral());
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_freezes_the_latch() {
        let (engine, mut handle, sender) = start(ManualSettings::default());
        handle.shutdown().await.unwrap();
        handle.shutdown().await.unwrap();

        sender.send_axis(AxisSample::new(0.0, -1.0));
        settle().await;
        assert_eq!(engine.process(&RobotStatus::default()), CommandState::NEUTRAL);
    }

    #[tokio::test]
    async fn rejects_invalid_settings() {
        let (_sender, channels) = joystick_channels(1);
        let result = ManualEngine::start(
            ManualSettings {
                max_speed: 0.0,
                ..ManualSettings::default()
            },
            channels,
            CancellationToken::new(),
        );
        assert!(matches!(result, Err(EngineError::InvalidSettings(_))));

        let (_sender, channels) = joystick_channels(1);
        let result = ManualEngine::start(
            ManualSettings {
                speed_levels: 4,
                ..ManualSettings::default()
            },
            channels,
            CancellationToken::new(),
        );
        assert!(result.is_err());

        let (_sender, channels) = joystick_channels(1);
        let result = ManualEngine::start(
            ManualSettings {
                scanner: ScannerSettings {
                    sweep_bearings: Vec::new(),
                    sweep_policy: SweepPolicy::Queue,
                    ..ScannerSettings::default()
                },
                ..ManualSettings::default()
            },
            channels,
            CancellationToken::new(),
        );
        assert!(result.is_err());
    }
}
