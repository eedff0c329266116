//! Joystick axis to differential drive mapping
//!
//! The stick position is quantized to a fixed number of speed levels and then
//! classified into one of eight octants. Each octant blends x and y with its
//! own fixed formula, so full deflection along an axis gives a straight run or
//! a pivot and intermediate positions give a proportional tank turn.
//!
//! ```text
//!            forward (y < 0)
//!        NNW      |      NNE
//!   WNW           |           ENE
//!  ───────────────┼───────────────  x
//!   WSW           |           ESE
//!        SSW      |      SSE
//!            backward (y > 0)
//! ```

use crate::engine::error::EngineError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default number of quantization levels over [-1, 1]
pub const DEFAULT_SPEED_LEVELS: u32 = 11;

/// A raw two axes joystick reading
///
/// Both values are expected in [-1, 1]; negative y is forward.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisSample {
    pub x: f64,
    pub y: f64,
}

impl AxisSample {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Left and right wheel speeds
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MotorCommand {
    pub left: f64,
    pub right: f64,
}

impl MotorCommand {
    /// Both wheels stopped
    pub const NEUTRAL: MotorCommand = MotorCommand {
        left: 0.0,
        right: 0.0,
    };

    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    /// Applies an external speed scaling to both wheels
    pub fn scaled(self, factor: f64) -> Self {
        Self {
            left: self.left * factor,
            right: self.right * factor,
        }
    }

    pub fn is_neutral(&self) -> bool {
        self.left == 0.0 && self.right == 0.0
    }
}

/// Joystick sectors used by the drive blend
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Octant {
    NorthNorthEast,
    NorthNorthWest,
    SouthSouthEast,
    SouthSouthWest,
    EastNorthEast,
    EastSouthEast,
    WestNorthWest,
    WestSouthWest,
}

impl Octant {
    /// Classifies a quantized position, `None` at the center
    ///
    /// Ties between |x| and |y| go to the vertical octants, a zero x goes east
    /// and a zero y goes north.
    pub fn classify(x: f64, y: f64) -> Option<Octant> {
        let ax = x.abs();
        let ay = y.abs();
        if ax.max(ay) <= 0.0 {
            return None;
        }
        let octant = if ay >= ax {
            match (y < 0.0, x >= 0.0) {
                (true, true) => Octant::NorthNorthEast,
                (true, false) => Octant::NorthNorthWest,
                (false, true) => Octant::SouthSouthEast,
                (false, false) => Octant::SouthSouthWest,
            }
        } else if x > 0.0 {
            if y <= 0.0 {
                Octant::EastNorthEast
            } else {
                Octant::EastSouthEast
            }
        } else if y <= 0.0 {
            Octant::WestNorthWest
        } else {
            Octant::WestSouthWest
        };
        Some(octant)
    }

    /// Wheel speeds for a position inside this octant
    pub fn blend(self, x: f64, y: f64) -> MotorCommand {
        let (left, right) = match self {
            Octant::NorthNorthEast => (-y, -y - x),
            Octant::NorthNorthWest => (-y + x, -y),
            Octant::SouthSouthEast => (x - y, -y),
            Octant::SouthSouthWest => (-y, -y - x),
            Octant::EastNorthEast => (x, -x - y),
            Octant::EastSouthEast => (x - y, -x),
            Octant::WestNorthWest => (x - y, -x),
            Octant::WestSouthWest => (x, -x - y),
        };
        MotorCommand::new(left, right)
    }
}

/// Maps axis samples to motor commands with a fixed number of speed levels
#[derive(Clone, Debug)]
pub struct AxisMapper {
    speed_levels: u32,
    // Levels on each side of zero
    half_levels: f64,
}

impl AxisMapper {
    /// Creates a mapper with `speed_levels` equally spaced levels over [-1, 1]
    ///
    /// The level count must be odd so that zero is one of the levels.
    pub fn new(speed_levels: u32) -> Result<Self, EngineError> {
        if speed_levels < 3 || speed_levels % 2 == 0 {
            return Err(EngineError::InvalidSettings(format!(
                "speed levels must be odd and at least 3, got {}",
                speed_levels
            )));
        }
        debug!("Creating axis mapper with {} speed levels", speed_levels);
        Ok(Self {
            speed_levels,
            half_levels: f64::from((speed_levels - 1) / 2),
        })
    }

    pub fn speed_levels(&self) -> u32 {
        self.speed_levels
    }

    /// Rounds a value to the nearest level, half steps go up
    pub fn quantize(&self, value: f64) -> f64 {
        (value * self.half_levels + 0.5).floor() / self.half_levels
    }

    /// Octant of a sample after quantization
    pub fn octant(&self, sample: AxisSample) -> Option<Octant> {
        Octant::classify(self.quantize(sample.x), self.quantize(sample.y))
    }

    /// Converts a stick position into wheel speeds in [-1, 1]
    pub fn map(&self, sample: AxisSample) -> MotorCommand {
        let x = self.quantize(sample.x);
        let y = self.quantize(sample.y);
        match Octant::classify(x, y) {
            Some(octant) => octant.blend(x, y),
            None => MotorCommand::NEUTRAL,
        }
    }
}

impl Default for AxisMapper {
    fn default() -> Self {
        Self {
            speed_levels: DEFAULT_SPEED_LEVELS,
            half_levels: f64::from((DEFAULT_SPEED_LEVELS - 1) / 2),
        }
    }
}
