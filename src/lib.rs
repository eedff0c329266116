//! Wheelly console
//!
//! Manual control of the Wheelly robot from a gamepad: stick positions become
//! differential drive commands, the hat and the sweep buttons steer the
//! scanner head, and a control loop hands the latched command to the robot
//! link once per cycle.

pub mod config;
pub mod controller;
pub mod engine;
pub mod telemetry;
