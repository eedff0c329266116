//! Robot telemetry as seen by the command engines
//!
//! Status samples come from the robot link, which lives outside this crate.
//! Engines receive the latest sample on every control cycle.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Latest robot status sample
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RobotStatus {
    /// Time the sample was received, `None` before the first sample
    pub timestamp: Option<DateTime<Local>>,

    /// Supply voltage in volts
    pub supply_voltage: f64,

    /// Distance of the nearest obstacle in front of the scanner, in meters
    pub obstacle_distance: Option<f64>,

    /// Measured wheel speeds
    pub left_speed: f64,
    pub right_speed: f64,
}
