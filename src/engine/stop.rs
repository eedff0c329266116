use crate::engine::{CommandState, EngineType, InferenceEngine};
use crate::telemetry::RobotStatus;

/// Engine that keeps the motors stopped and the scanner centered
#[derive(Clone, Copy, Debug, Default)]
pub struct StopEngine;

impl InferenceEngine for StopEngine {
    fn process(&self, _status: &RobotStatus) -> CommandState {
        CommandState::NEUTRAL
    }

    fn engine_type(&self) -> EngineType {
        EngineType::Stop
    }
}
