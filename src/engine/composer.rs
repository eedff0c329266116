//! Latched command state shared between the input side and the control loop

use crate::engine::axis_mapper::MotorCommand;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Scanner head bearing in degrees, 0 is straight ahead
pub type ScannerAngle = i32;

/// Motor command and scanner bearing, always read as a whole
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandState {
    pub motor: MotorCommand,
    pub scanner: ScannerAngle,
}

impl CommandState {
    /// Wheels stopped, scanner straight ahead
    pub const NEUTRAL: CommandState = CommandState {
        motor: MotorCommand::NEUTRAL,
        scanner: 0,
    };

    pub fn new(motor: MotorCommand, scanner: ScannerAngle) -> Self {
        Self { motor, scanner }
    }
}

impl fmt::Display for CommandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "motor L:{:.2} R:{:.2} scanner {}°",
            self.motor.left, self.motor.right, self.scanner
        )
    }
}

/// Single owner of the latched [`CommandState`]
///
/// Each field is replaced with one atomic `send_modify`, so the two fields
/// update independently and readers always get a complete copy. Clones share
/// the same state.
#[derive(Clone, Debug)]
pub struct CommandComposer {
    state: Arc<watch::Sender<CommandState>>,
}

impl CommandComposer {
    pub fn new() -> Self {
        let (state, _) = watch::channel(CommandState::NEUTRAL);
        Self {
            state: Arc::new(state),
        }
    }

    /// Replaces the motor command, last write wins
    pub fn update_motor(&self, motor: MotorCommand) {
        self.state.send_modify(|state| state.motor = motor);
        debug!("motor {:?}", motor);
    }

    /// Replaces the scanner bearing, last write wins
    pub fn update_scanner(&self, scanner: ScannerAngle) {
        self.state.send_modify(|state| state.scanner = scanner);
        debug!("scan angle {}", scanner);
    }

    /// Copy of the current state, never blocks on writers for long
    pub fn snapshot(&self) -> CommandState {
        *self.state.borrow()
    }

    /// Receiver notified on every update
    pub fn subscribe(&self) -> watch::Receiver<CommandState> {
        self.state.subscribe()
    }
}

impl Default for CommandComposer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_neutral() {
        let composer = CommandComposer::new();
        assert_eq!(composer.snapshot(), CommandState::NEUTRAL);
        assert_eq!(composer.snapshot().motor, MotorCommand::new(0.0, 0.0));
        assert_eq!(composer.snapshot().scanner, 0);
    }

    #[test]
    fn fields_update_independently() {
        let composer = CommandComposer::new();
        composer.update_motor(MotorCommand::new(1.0, 0.5));
        assert_eq!(
            composer.snapshot(),
            CommandState::new(MotorCommand::new(1.0, 0.5), 0)
        );

        composer.update_scanner(-45);
        composer.update_scanner(90);
        assert_eq!(
            composer.snapshot(),
            CommandState::new(MotorCommand::new(1.0, 0.5), 90)
        );

        composer.update_motor(MotorCommand::NEUTRAL);
        assert_eq!(composer.snapshot(), CommandState::new(MotorCommand::NEUTRAL, 90));
    }

    #[test]
    fn clones_share_state() {
        let composer = CommandComposer::new();
        let writer = composer.clone();
        writer.update_scanner(30);
        assert_eq!(composer.snapshot().scanner, 30);
    }

    #[tokio::test]
    async fn subscribers_see_updates() {
        let composer = CommandComposer::new();
        let mut receiver = composer.subscribe();
        composer.update_scanner(-90);
        receiver.changed().await.unwrap();
        assert_eq!(receiver.borrow_and_update().scanner, -90);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_writers_never_tear_the_snapshot() {
        let composer = CommandComposer::new();
        let motor_writer = composer.clone();
        let scanner_writer = composer.clone();

        let motors = tokio::spawn(async move {
            for i in 0..500 {
                let speed = f64::from(i % 2);
                motor_writer.update_motor(MotorCommand::new(speed, speed));
                tokio::task::yield_now().await;
            }
        });
        let scanners = tokio::spawn(async move {
            for i in 0..500 {
                scanner_writer.update_scanner(if i % 2 == 0 { 45 } else { -45 });
                tokio::task::yield_now().await;
            }
        });

        for _ in 0..500 {
            let state = composer.snapshot();
            assert_eq!(state.motor.left, state.motor.right);
            assert!(state.scanner == 0 || state.scanner.abs() == 45);
            tokio::task::yield_now().await;
        }
        motors.await.unwrap();
        scanners.await.unwrap();
    }
}
