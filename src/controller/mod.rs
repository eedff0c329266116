//! Controller subsystem for joystick input handling
//!
//! 1. [`event_collector`] - gilrs polling and conversion to logical channels
//! 2. [`controller_handle`] - channel pair and collector thread lifecycle
//!
//! # Architecture
//!
//! ```text
//! Gamepad ──► Collector ──┬─► axis (watch, latest wins) ──► engine
//!                         └─► pov / buttons (mpsc)      ──► engine
//! ```

pub mod controller_handle;
pub mod event_collector;

pub use controller_handle::{
    joystick_channels, ControllerError, ControllerHandle, ControllerSettings, JoystickChannels,
    JoystickSender,
};
pub use event_collector::{CollectorError, JoystickChannel, JoystickEvent};
