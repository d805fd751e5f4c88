use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scenario::{ScenarioName, ScenarioTable};
use crate::{BoxStr, DeviceId};

/// Seconds of simulated uptime added per publish cycle.
pub const UPTIME_STEP_SECS: u64 = 60;

/// A simulated field station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Stable identity, used verbatim in topic names.
    pub id: DeviceId,
    /// Display name.
    pub name: BoxStr,
    /// Scenario the generated values are drawn from.
    pub scenario: ScenarioName,
    /// Simulated uptime in seconds.
    #[serde(default)]
    pub uptime: u64,
}

impl Device {
    pub fn new(
        id: impl Into<BoxStr>,
        name: impl Into<BoxStr>,
        scenario: ScenarioName,
        uptime: u64,
    ) -> Self {
        Self {
            id: DeviceId(id.into()),
            name: name.into(),
            scenario,
            uptime,
        }
    }

    /// Advance uptime by one publish cycle and return the new value.
    pub fn advance_uptime(&mut self) -> u64 {
        self.uptime = self.uptime.saturating_add(UPTIME_STEP_SECS);
        self.uptime
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("invalid selection: index {index} is outside 0..{len}")]
    OutOfRange { index: usize, len: usize },
    #[error("device {device} is bound to unknown scenario {scenario}")]
    UnknownScenario {
        device: DeviceId,
        scenario: ScenarioName,
    },
    #[error("duplicate device id {0}")]
    DuplicateId(DeviceId),
}

/// Ordered, index-addressable set of simulated devices.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
}

impl DeviceRegistry {
    /// Build a registry, rejecting devices bound to a scenario the table does
    /// not define and repeated ids.
    pub fn new(devices: Vec<Device>, scenarios: &ScenarioTable) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();

        for device in &devices {
            if !scenarios.contains(device.scenario) {
                return Err(RegistryError::UnknownScenario {
                    device: device.id.clone(),
                    scenario: device.scenario,
                });
            }
            if !seen.insert(&device.id) {
                return Err(RegistryError::DuplicateId(device.id.clone()));
            }
        }

        Ok(Self { devices })
    }

    /// The four AWLR stations the simulator ships with.
    pub fn builtin_devices() -> Vec<Device> {
        vec![
            Device::new(
                "51c11d31-1e00-47a5-b5fe-646bda4c3317",
                "AWLR 1 (Pos 1)",
                ScenarioName::Normal,
                3660,
            ),
            Device::new(
                "aac7d59f-595f-4b61-83bd-cab4641f3ab7",
                "AWLR 2 (Pos 2)",
                ScenarioName::Waspada,
                7200,
            ),
            Device::new(
                "a76ad429-b475-4baa-8876-76a4ab0909d9",
                "AWLR 3 (Pos 3)",
                ScenarioName::Bahaya,
                14400,
            ),
            Device::new(
                "1c7ab70e-3805-4a42-a786-25c31749e9f8",
                "AWLR 4 (Pos 4)",
                ScenarioName::ExtremeWeather,
                1980,
            ),
        ]
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&Device, RegistryError> {
        let len = self.devices.len();
        self.devices
            .get(index)
            .ok_or(RegistryError::OutOfRange { index, len })
    }

    pub fn get_mut(&mut self, index: usize) -> Result<&mut Device, RegistryError> {
        let len = self.devices.len();
        self.devices
            .get_mut(index)
            .ok_or(RegistryError::OutOfRange { index, len })
    }

    /// Devices in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }
}
