use std::fmt;

use serde::{Deserialize, Serialize};

pub mod generator;
pub mod payload;
pub mod registry;
pub mod scenario;
pub mod topic;

pub use generator::{Sample, generate, sample_scenario};
pub use payload::{CyclePayloads, DeviceState, OtaState, StatusPayload, TelemetryPayload};
pub use registry::{Device, DeviceRegistry, RegistryError, UPTIME_STEP_SECS};
pub use scenario::{Scenario, ScenarioError, ScenarioName, ScenarioTable, ValueRange};
pub use topic::TopicKind;

type BoxStr = Box<str>;

/// Opaque, stable identifier of a simulated device (a UUID for the AWLR
/// stations). Interpolated verbatim into topic names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub BoxStr);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
