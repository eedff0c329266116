//! Scanner direction from the point of view hat and the sweep buttons
//!
//! Two sources feed one stream of bearings:
//!
//! - the point of view hat, mapped to a handful of fixed bearings and emitted
//!   only when the bearing changes
//! - any sweep button, whose rising edge starts a timed full sweep of the
//!   scanner head that ends back at the center
//!
//! The most recent emission of either source wins.

use crate::controller::{JoystickChannel, JoystickEvent};
use crate::engine::composer::ScannerAngle;
use crate::engine::error::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Bearings of a full sweep, left to right and back to the center
pub const DEFAULT_SWEEP_BEARINGS: [ScannerAngle; 8] = [-90, -60, -30, 0, 30, 60, 90, 0];

/// Time between two sweep steps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(500);

/// What happens to an in-flight sweep when a newer input arrives
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepPolicy {
    /// A new trigger restarts the sweep, a hat change discards it
    #[default]
    Replace,
    /// A new trigger appends a full sweep, hat changes leave it running
    Queue,
}

/// Bearing for a point of view hat value
///
/// The hat value is a fraction of a full turn in eighths. Only up-left,
/// up-right, right and left move the scanner; every other value, including
/// garbage, centers it.
pub fn pov_bearing(value: f32) -> ScannerAngle {
    match (value * 8.0) as i32 {
        1 => -45,
        3 => 45,
        4 => 90,
        8 => -90,
        _ => 0,
    }
}

/// Steps emitted at a fixed pace, first one immediately
///
/// Each step carries its due time. `next` is cancel safe: dropping its future
/// before completion leaves the pending step in place.
#[derive(Clone, Debug)]
pub struct TimedSequence {
    steps: VecDeque<(ScannerAngle, Instant)>,
    interval: Duration,
}

impl TimedSequence {
    pub fn start(steps: &[ScannerAngle], interval: Duration) -> Self {
        let mut sequence = Self {
            steps: VecDeque::with_capacity(steps.len()),
            interval,
        };
        sequence.schedule_from(Instant::now(), steps);
        sequence
    }

    /// Appends a run that starts when the last pending step is due
    pub fn extend(&mut self, steps: &[ScannerAngle]) {
        let now = Instant::now();
        let origin = self
            .steps
            .back()
            .map_or(now, |(_, due)| (*due).max(now));
        self.schedule_from(origin, steps);
    }

    fn schedule_from(&mut self, origin: Instant, steps: &[ScannerAngle]) {
        let mut due = origin;
        for angle in steps {
            self.steps.push_back((*angle, due));
            due += self.interval;
        }
    }

    pub fn remaining(&self) -> usize {
        self.steps.len()
    }

    pub fn is_finished(&self) -> bool {
        self.steps.is_empty()
    }

    /// Waits for the next step, `None` once the sequence is exhausted
    pub async fn next(&mut self) -> Option<ScannerAngle> {
        let (_, due) = *self.steps.front()?;
        tokio::time::sleep_until(due).await;
        self.steps.pop_front().map(|(angle, _)| angle)
    }
}

/// Settings of the scanner resolver
#[derive(Clone, Debug)]
pub struct ScannerSettings {
    pub sweep_bearings: Vec<ScannerAngle>,
    pub sweep_interval: Duration,
    pub sweep_policy: SweepPolicy,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            sweep_bearings: DEFAULT_SWEEP_BEARINGS.to_vec(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            sweep_policy: SweepPolicy::default(),
        }
    }
}

/// Turns hat and button events into scanner bearings
pub struct ScannerDirectionResolver {
    settings: ScannerSettings,
    // The hat starts centered
    last_pov: ScannerAngle,
    pressed: HashMap<JoystickChannel, bool>,
    sweep: Option<TimedSequence>,
}

impl ScannerDirectionResolver {
    pub fn new(settings: ScannerSettings) -> Result<Self, EngineError> {
        if settings.sweep_bearings.is_empty() {
            return Err(EngineError::InvalidSettings(
                "sweep bearings must not be empty".to_string(),
            ));
        }
        if settings.sweep_interval.is_zero() {
            return Err(EngineError::InvalidSettings(
                "sweep interval must be positive".to_string(),
            ));
        }
        Ok(Self {
            settings,
            last_pov: 0,
            pressed: HashMap::new(),
            sweep: None,
        })
    }

    /// Handles a discrete event, returns a bearing to emit right away
    ///
    /// Sweep steps are not returned here, they come out of
    /// [`next_sweep_step`](Self::next_sweep_step).
    pub fn handle_event(&mut self, event: &JoystickEvent) -> Option<ScannerAngle> {
        if !event.channel.is_sweep_trigger() {
            return self.handle_pov(event.value);
        }

        let pressed = event.value > 0.0;
        let was_pressed = self
            .pressed
            .insert(event.channel, pressed)
            .unwrap_or(false);
        if pressed && !was_pressed {
            info!("Full sweep requested by {}", event.channel);
            self.start_sweep();
        }
        None
    }

    fn handle_pov(&mut self, value: f32) -> Option<ScannerAngle> {
        let bearing = pov_bearing(value);
        if bearing == self.last_pov {
            return None;
        }
        self.last_pov = bearing;
        if self.settings.sweep_policy == SweepPolicy::Replace {
            self.cancel_sweep();
        }
        Some(bearing)
    }

    fn start_sweep(&mut self) {
        match (&mut self.sweep, self.settings.sweep_policy) {
            (Some(sweep), SweepPolicy::Queue) => {
                debug!(
                    "Queueing full sweep behind {} pending steps",
                    sweep.remaining()
                );
                sweep.extend(&self.settings.sweep_bearings);
            }
            _ => {
                self.cancel_sweep();
                self.sweep = Some(TimedSequence::start(
                    &self.settings.sweep_bearings,
                    self.settings.sweep_interval,
                ));
            }
        }
    }

    /// Discards the in-flight sweep and its remaining steps
    pub fn cancel_sweep(&mut self) {
        if let Some(sweep) = self.sweep.take() {
            debug!("Discarding sweep with {} pending steps", sweep.remaining());
        }
    }

    pub fn sweep_in_flight(&self) -> bool {
        self.sweep.is_some()
    }

    /// Waits for the next step of the in-flight sweep
    ///
    /// Returns `None` immediately when no sweep is running. Cancel safe.
    pub async fn next_sweep_step(&mut self) -> Option<ScannerAngle> {
        let sweep = self.sweep.as_mut()?;
        let step = sweep.next().await;
        if sweep.is_finished() {
            debug!("Full sweep completed");
            self.sweep = None;
        }
        step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(policy: SweepPolicy) -> ScannerDirectionResolver {
        ScannerDirectionResolver::new(ScannerSettings {
            sweep_policy: policy,
            ..ScannerSettings::default()
        })
        .unwrap()
    }

    fn pov(value: f32) -> JoystickEvent {
        JoystickEvent::new(JoystickChannel::Pov, value)
    }

    fn press(channel: JoystickChannel) -> JoystickEvent {
        JoystickEvent::new(channel, 1.0)
    }

    fn release(channel: JoystickChannel) -> JoystickEvent {
        JoystickEvent::new(channel, 0.0)
    }

    // Drains the sweep, returning each bearing with its offset from `origin`
    async fn drain(
        resolver: &mut ScannerDirectionResolver,
        origin: Instant,
        limit: usize,
    ) -> Vec<(ScannerAngle, u128)> {
        let mut steps = Vec::new();
        while steps.len() < limit {
            match resolver.next_sweep_step().await {
                Some(angle) => steps.push((angle, origin.elapsed().as_millis())),
                None => break,
            }
        }
        steps
    }

    #[test]
    fn pov_encodings() {
        assert_eq!(pov_bearing(0.125), -45);
        assert_eq!(pov_bearing(0.375), 45);
        assert_eq!(pov_bearing(0.5), 90);
        assert_eq!(pov_bearing(1.0), -90);
        for value in [0.0, 0.25, 0.625, 0.75, 0.875, -0.3, 2.0, f32::NAN] {
            assert_eq!(pov_bearing(value), 0, "value {}", value);
        }
    }

    #[test]
    fn pov_emits_only_on_change() {
        let mut resolver = resolver(SweepPolicy::Replace);
        assert_eq!(resolver.handle_event(&pov(0.125)), Some(-45));
        assert_eq!(resolver.handle_event(&pov(0.125)), None);
        assert_eq!(resolver.handle_event(&pov(0.375)), Some(45));
        assert_eq!(resolver.handle_event(&pov(0.5)), Some(90));
        assert_eq!(resolver.handle_event(&pov(1.0)), Some(-90));
        assert_eq!(resolver.handle_event(&pov(0.0)), Some(0));
        // Up maps to the center as well, nothing new to say
        assert_eq!(resolver.handle_event(&pov(0.25)), None);
    }

    #[test]
    fn only_rising_edges_start_a_sweep() {
        let mut resolver = resolver(SweepPolicy::Replace);
        assert_eq!(resolver.handle_event(&release(JoystickChannel::Top)), None);
        assert!(!resolver.sweep_in_flight());

        assert_eq!(resolver.handle_event(&press(JoystickChannel::Top)), None);
        assert!(resolver.sweep_in_flight());

        resolver.cancel_sweep();
        resolver.handle_event(&press(JoystickChannel::Top));
        assert!(!resolver.sweep_in_flight(), "held button retriggered");

        resolver.handle_event(&release(JoystickChannel::Top));
        resolver.handle_event(&press(JoystickChannel::Top));
        assert!(resolver.sweep_in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn every_sweep_button_runs_the_full_sequence() {
        for channel in JoystickChannel::SWEEP_TRIGGERS {
            let mut resolver = resolver(SweepPolicy::Replace);
            let origin = Instant::now();
            resolver.handle_event(&press(channel));

            let steps = drain(&mut resolver, origin, 20).await;
            assert_eq!(
                steps,
                vec![
                    (-90, 0),
                    (-60, 500),
                    (-30, 1000),
                    (0, 1500),
                    (30, 2000),
                    (60, 2500),
                    (90, 3000),
                    (0, 3500),
                ],
                "sweep from {}",
                channel
            );
            assert!(!resolver.sweep_in_flight());
            assert_eq!(resolver.next_sweep_step().await, None);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn second_trigger_replaces_the_running_sweep() {
        let mut resolver = resolver(SweepPolicy::Replace);
        let origin = Instant::now();
        resolver.handle_event(&press(JoystickChannel::Trigger));
        let first = drain(&mut resolver, origin, 3).await;
        assert_eq!(first, vec![(-90, 0), (-60, 500), (-30, 1000)]);

        resolver.handle_event(&press(JoystickChannel::Thumb));
        let second = drain(&mut resolver, origin, 20).await;
        let bearings: Vec<ScannerAngle> = second.iter().map(|(angle, _)| *angle).collect();
        assert_eq!(bearings, DEFAULT_SWEEP_BEARINGS.to_vec());
        assert_eq!(second.first().map(|step| step.1), Some(1000));
        assert_eq!(second.last().map(|step| step.1), Some(4500));
    }

    #[tokio::test(start_paused = true)]
    async fn pov_change_discards_the_running_sweep() {
        let mut resolver = resolver(SweepPolicy::Replace);
        resolver.handle_event(&press(JoystickChannel::Button2));
        assert_eq!(resolver.next_sweep_step().await, Some(-90));
        assert_eq!(resolver.next_sweep_step().await, Some(-60));

        assert_eq!(resolver.handle_event(&pov(0.5)), Some(90));
        assert!(!resolver.sweep_in_flight());
        assert_eq!(resolver.next_sweep_step().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn queue_policy_concatenates_sweeps() {
        let mut resolver = resolver(SweepPolicy::Queue);
        let origin = Instant::now();
        resolver.handle_event(&press(JoystickChannel::Trigger));
        assert_eq!(resolver.next_sweep_step().await, Some(-90));

        resolver.handle_event(&press(JoystickChannel::Thumb));
        assert_eq!(resolver.handle_event(&pov(0.125)), Some(-45));
        assert!(resolver.sweep_in_flight(), "hat change cancelled a queued sweep");

        let rest = drain(&mut resolver, origin, 30).await;
        assert_eq!(rest.len(), 15);
        // The queued run starts as soon as the first one ends
        assert_eq!(rest[6], (0, 3500));
        assert_eq!(rest[7], (-90, 3500));
        assert_eq!(rest.last(), Some(&(0, 7000)));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_step_future_loses_nothing() {
        let mut resolver = resolver(SweepPolicy::Replace);
        resolver.handle_event(&press(JoystickChannel::Trigger));
        assert_eq!(resolver.next_sweep_step().await, Some(-90));

        let timed_out =
            tokio::time::timeout(Duration::from_millis(100), resolver.next_sweep_step()).await;
        assert!(timed_out.is_err());
        assert_eq!(resolver.next_sweep_step().await, Some(-60));
    }

    #[test]
    fn rejects_empty_or_instant_sweeps() {
        let empty = ScannerDirectionResolver::new(ScannerSettings {
            sweep_bearings: Vec::new(),
            ..ScannerSettings::default()
        });
        assert!(matches!(empty, Err(EngineError::InvalidSettings(_))));

        let instant = ScannerDirectionResolver::new(ScannerSettings {
            sweep_interval: Duration::ZERO,
            ..ScannerSettings::default()
        });
        assert!(instant.is_err());
    }
}
