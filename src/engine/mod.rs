//! Command engines
//!
//! An engine turns the latest robot telemetry into the next motor and scanner
//! command. The control loop polls whichever engine is configured through the
//! [`InferenceEngine`] trait once per control cycle.
//!
//! # Manual engine pipeline
//!
//! ```text
//! axis (watch) ───► AxisMapper ──────────────┐
//!                                            ▼
//! pov/buttons ────► ScannerDirectionResolver ► CommandComposer ◄── process()
//!  (mpsc)            └─ TimedSequence (sweep)
//! ```

pub mod axis_mapper;
pub mod composer;
pub mod control_loop;
pub mod error;
pub mod manual;
pub mod scanner;
pub mod stop;

pub use axis_mapper::{AxisMapper, AxisSample, MotorCommand, Octant};
pub use composer::{CommandComposer, CommandState, ScannerAngle};
pub use control_loop::ControlLoop;
pub use error::EngineError;
pub use manual::{ManualEngine, ManualEngineHandle, ManualSettings};
pub use scanner::{ScannerDirectionResolver, ScannerSettings, SweepPolicy, TimedSequence};
pub use stop::StopEngine;

use crate::telemetry::RobotStatus;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Available engine kinds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    /// Joystick driven
    #[default]
    Manual,

    /// Keeps the robot still
    Stop,
}

impl Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineType::Manual => write!(f, "Manual"),
            EngineType::Stop => write!(f, "Stop"),
        }
    }
}

/// Capability shared by every command engine
///
/// `process` is polled by the control loop and must not block. Engines that
/// do not need telemetry simply ignore it.
pub trait InferenceEngine: Send + Sync + 'static {
    /// Returns the command for the current control cycle
    fn process(&self, status: &RobotStatus) -> CommandState;

    /// Returns the kind of this engine
    fn engine_type(&self) -> EngineType;
}
