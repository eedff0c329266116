use crate::engine::AxisSample;
use chrono::{DateTime, Local};
use gilrs::{Axis, Button, Event, EventType, Gamepad, GamepadId, Gilrs};
use serde::{Deserialize, Serialize};
use statum::{machine, state};
use std::fmt;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// Discrete joystick input, one logical channel per event
#[derive(Debug, Clone, PartialEq)]
pub struct JoystickEvent {
    pub channel: JoystickChannel,
    pub value: f32,
    pub timestamp: DateTime<Local>,
}

impl JoystickEvent {
    pub fn new(channel: JoystickChannel, value: f32) -> Self {
        Self {
            channel,
            value,
            timestamp: Local::now(),
        }
    }
}

// Logical joystick channels consumed by the engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoystickChannel {
    Pov,
    Thumb,
    Thumb2,
    Top,
    Trigger,
    Button0,
    Button1,
    Button2,
    Button3,
}

impl JoystickChannel {
    /// Buttons that start a full scanner sweep
    pub const SWEEP_TRIGGERS: [JoystickChannel; 8] = [
        JoystickChannel::Thumb,
        JoystickChannel::Thumb2,
        JoystickChannel::Top,
        JoystickChannel::Trigger,
        JoystickChannel::Button0,
        JoystickChannel::Button1,
        JoystickChannel::Button2,
        JoystickChannel::Button3,
    ];

    pub fn is_sweep_trigger(&self) -> bool {
        !matches!(self, JoystickChannel::Pov)
    }
}

impl fmt::Display for JoystickChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JoystickChannel::Pov => "pov",
            JoystickChannel::Thumb => "Thumb",
            JoystickChannel::Thumb2 => "Thumb 2",
            JoystickChannel::Top => "Top",
            JoystickChannel::Trigger => "Trigger",
            JoystickChannel::Button0 => "0",
            JoystickChannel::Button1 => "1",
            JoystickChannel::Button2 => "2",
            JoystickChannel::Button3 => "3",
        };
        write!(f, "{}", name)
    }
}

// Point of view encoding, fraction of a full turn
pub const POV_CENTER: f32 = 0.0;
pub const POV_UP_LEFT: f32 = 0.125;
pub const POV_UP: f32 = 0.25;
pub const POV_UP_RIGHT: f32 = 0.375;
pub const POV_RIGHT: f32 = 0.5;
pub const POV_DOWN_RIGHT: f32 = 0.625;
pub const POV_DOWN: f32 = 0.75;
pub const POV_DOWN_LEFT: f32 = 0.875;
pub const POV_LEFT: f32 = 1.0;

// D-pad state folded into a single point of view value
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DpadState {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

impl DpadState {
    pub fn pov_fraction(&self) -> f32 {
        let vertical = self.up as i8 - self.down as i8;
        let horizontal = self.right as i8 - self.left as i8;
        match (vertical, horizontal) {
            (1, -1) => POV_UP_LEFT,
            (1, 0) => POV_UP,
            (1, 1) => POV_UP_RIGHT,
            (0, 1) => POV_RIGHT,
            (-1, 1) => POV_DOWN_RIGHT,
            (-1, 0) => POV_DOWN,
            (-1, -1) => POV_DOWN_LEFT,
            (0, -1) => POV_LEFT,
            _ => POV_CENTER,
        }
    }
}

// Collector settings
#[derive(Clone, Debug)]
pub struct CollectorSettings {
    pub joystick_deadzone: f32,
    pub gamepad_name: Option<String>,
    pub poll_interval_us: u64,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            joystick_deadzone: 0.05,
            gamepad_name: None,
            poll_interval_us: 100,
        }
    }
}

// Collector errors
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Failed to initialize collector: {0}")]
    InitializationError(String),

    #[error("Failed to send event: {0}")]
    EventSendError(String),
}

// Define collector states using statum's state macro
#[state]
#[derive(Debug, Clone)]
pub enum CollectionState {
    Initializing,
    Collecting,
}

#[machine]
pub struct EventCollector<S: CollectionState> {
    // Gilrs context
    gilrs: Gilrs,

    // Active gamepad
    active_gamepad: Option<GamepadId>,

    // Collector settings
    settings: CollectorSettings,

    // Latest stick position, overwritten on every move
    axis_sender: watch::Sender<AxisSample>,

    // Point of view and button events
    event_sender: mpsc::Sender<JoystickEvent>,

    // Last seen stick and d-pad values
    last_axis: AxisSample,
    dpad: DpadState,
}

// Implementation for Initializing state
impl EventCollector<Initializing> {
    pub fn create(
        settings: Option<CollectorSettings>,
        axis_sender: watch::Sender<AxisSample>,
        event_sender: mpsc::Sender<JoystickEvent>,
    ) -> Result<Self, CollectorError> {
        let settings = settings.unwrap_or_default();
        debug!("Creating Event Collector with settings: {:?}", settings);

        info!("Initializing gilrs controller interface");
        let gilrs = match Gilrs::new() {
            Ok(g) => {
                info!("Successfully initialized gilrs");
                g
            }
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(CollectorError::InitializationError(e.to_string()));
            }
        };

        Ok(Self::new(
            gilrs,
            None,
            settings,
            axis_sender,
            event_sender,
            AxisSample::default(),
            DpadState::default(),
        ))
    }

    // Select the gamepad and transition to Collecting state
    pub fn initialize(mut self) -> EventCollector<Collecting> {
        info!(
            "Initializing Event Collector with deadzone: {}",
            self.settings.joystick_deadzone
        );

        let gamepads: Vec<(GamepadId, Gamepad<'_>)> = self.gilrs.gamepads().collect();

        if gamepads.is_empty() {
            warn!("No gamepad connected, continuing in idle mode");
        } else {
            info!("Found {} gamepads:", gamepads.len());
            for (idx, (id, gamepad)) in gamepads.iter().enumerate() {
                info!("  [{}] ID: {}, Name: {}", idx, id, gamepad.name());
            }

            let selected = match &self.settings.gamepad_name {
                Some(name) => {
                    let found = gamepads.iter().find(|(_, pad)| pad.name() == name.as_str());
                    if found.is_none() {
                        warn!("Gamepad \"{}\" not found, using the first one", name);
                    }
                    found.or_else(|| gamepads.first())
                }
                None => gamepads.first(),
            };
            if let Some((id, gamepad)) = selected {
                self.active_gamepad = Some(*id);
                info!("Selected gamepad: {} ({})", gamepad.name(), id);
            }
        }

        info!("Event Collector initialized, transitioning to Collecting state");
        self.transition()
    }
}

// Implementation for Controller in Collecting state
impl EventCollector<Collecting> {
    // Handle the next pending gilrs event, returns true if one was found
    pub fn collect_next_event(&mut self) -> Result<bool, CollectorError> {
        let Some(Event { id, event, .. }) = self.gilrs.next_event() else {
            return Ok(false);
        };

        if let Some(active_id) = self.active_gamepad {
            if id != active_id {
                debug!("Skipping event from non-active gamepad: {:?}", id);
                return Ok(true);
            }
        }

        debug!("Processing gilrs event: {:?}", event);
        if matches!(event, EventType::Disconnected) {
            self.handle_disconnect();
            return Ok(true);
        }

        match self.convert_gilrs_event(event) {
            Some(CollectedInput::Axis(sample)) => {
                // Never blocks, a newer sample replaces an unread one
                self.axis_sender.send_replace(sample);
            }
            Some(CollectedInput::Event(joystick_event)) => {
                info!(
                    "Joystick event: {} = {:.3} at {}",
                    joystick_event.channel,
                    joystick_event.value,
                    joystick_event.timestamp.format("%H:%M:%S.%3f")
                );
                if let Err(e) = self.event_sender.try_send(joystick_event) {
                    return Err(CollectorError::EventSendError(e.to_string()));
                }
            }
            None => debug!("Event ignored due to filtering or mapping"),
        }
        Ok(true)
    }

    // Run the collector until cancelled or until nobody listens anymore
    pub fn run_collection_loop(&mut self, cancel: CancellationToken) {
        info!("Starting Event Collector loop");

        let mut event_count = 0;
        let mut last_log_time = Local::now();
        let log_interval = chrono::Duration::seconds(10);
        let poll_interval = std::time::Duration::from_micros(self.settings.poll_interval_us);

        while !cancel.is_cancelled() {
            if self.event_sender.is_closed() {
                info!("Event receiver dropped, stopping Event Collector");
                break;
            }

            match self.collect_next_event() {
                Ok(true) => event_count += 1,
                Ok(false) => std::thread::sleep(poll_interval),
                Err(e) => warn!("Dropping joystick event: {}", e),
            }

            let now = Local::now();
            if now - last_log_time > log_interval {
                info!(
                    "Event Collector stats: processed {} events in last {} seconds",
                    event_count,
                    log_interval.num_seconds()
                );
                event_count = 0;
                last_log_time = now;
            }
        }
        info!("Event Collector loop finished");
    }

    fn convert_gilrs_event(&mut self, event: EventType) -> Option<CollectedInput> {
        match event {
            EventType::AxisChanged(axis, value, _) => self.convert_axis(axis, value),
            EventType::ButtonPressed(button, _) => self.convert_button(button, true),
            EventType::ButtonReleased(button, _) => self.convert_button(button, false),
            EventType::Connected => {
                info!("Controller connected event detected");
                None
            }
            _ => {
                debug!("Unhandled event type: {:?}", event);
                None
            }
        }
    }

    // Neutral stick, centered hat and every button released
    fn handle_disconnect(&mut self) {
        warn!("Controller disconnected, stopping motors");
        self.last_axis = AxisSample::default();
        self.axis_sender.send_replace(self.last_axis);

        for event in disconnect_inputs(&mut self.dpad) {
            if let Err(e) = self.event_sender.try_send(event) {
                warn!("Dropping release event after disconnect: {}", e);
            }
        }
    }

    fn convert_axis(&mut self, axis: Axis, value: f32) -> Option<CollectedInput> {
        let deadzone = self.settings.joystick_deadzone;
        match axis {
            Axis::LeftStickX => {
                self.last_axis.x = f64::from(apply_deadzone(value, deadzone));
                Some(CollectedInput::Axis(self.last_axis))
            }
            Axis::LeftStickY => {
                // gilrs reports up as positive, forward is negative here
                self.last_axis.y = -f64::from(apply_deadzone(value, deadzone));
                Some(CollectedInput::Axis(self.last_axis))
            }
            Axis::DPadX => {
                self.dpad.left = value < -0.5;
                self.dpad.right = value > 0.5;
                Some(self.pov_event())
            }
            Axis::DPadY => {
                self.dpad.up = value > 0.5;
                self.dpad.down = value < -0.5;
                Some(self.pov_event())
            }
            _ => {
                debug!("Ignoring unsupported axis: {:?}", axis);
                None
            }
        }
    }

    fn convert_button(&mut self, button: Button, pressed: bool) -> Option<CollectedInput> {
        match button {
            Button::DPadUp => self.dpad.up = pressed,
            Button::DPadDown => self.dpad.down = pressed,
            Button::DPadLeft => self.dpad.left = pressed,
            Button::DPadRight => self.dpad.right = pressed,
            _ => {
                let channel = map_button(button)?;
                let value = if pressed { 1.0 } else { 0.0 };
                return Some(CollectedInput::Event(JoystickEvent::new(channel, value)));
            }
        }
        Some(self.pov_event())
    }

    fn pov_event(&self) -> CollectedInput {
        CollectedInput::Event(JoystickEvent::new(
            JoystickChannel::Pov,
            self.dpad.pov_fraction(),
        ))
    }
}

enum CollectedInput {
    Axis(AxisSample),
    Event(JoystickEvent),
}

/// Clears the D-pad and returns the events that undo any held input
///
/// A centered hat followed by a release of every sweep channel, so the first
/// press after a reconnect is a fresh rising edge.
pub fn disconnect_inputs(dpad: &mut DpadState) -> Vec<JoystickEvent> {
    *dpad = DpadState::default();
    std::iter::once(JoystickEvent::new(JoystickChannel::Pov, POV_CENTER))
        .chain(
            JoystickChannel::SWEEP_TRIGGERS
                .iter()
                .map(|channel| JoystickEvent::new(*channel, 0.0)),
        )
        .collect()
}

// Helper function to map gilrs Button to a sweep trigger channel
pub fn map_button(button: Button) -> Option<JoystickChannel> {
    match button {
        Button::South => Some(JoystickChannel::Trigger),
        Button::East => Some(JoystickChannel::Thumb),
        Button::West => Some(JoystickChannel::Thumb2),
        Button::North => Some(JoystickChannel::Top),
        Button::LeftTrigger => Some(JoystickChannel::Button0),
        Button::RightTrigger => Some(JoystickChannel::Button1),
        Button::LeftTrigger2 => Some(JoystickChannel::Button2),
        Button::RightTrigger2 => Some(JoystickChannel::Button3),
        _ => None,
    }
}

// Helper function to apply deadzone to analog stick values
pub fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    if value.abs() < deadzone {
        0.0
    } else {
        // Rescale the value to the range outside the deadzone
        let sign = if value < 0.0 { -1.0 } else { 1.0 };
        sign * (value.abs() - deadzone) / (1.0 - deadzone)
    }
}
