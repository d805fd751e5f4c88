use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Named operating condition a simulated station can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioName {
    /// Low water, clear sky.
    Normal,
    /// Rising water, light rain.
    Waspada,
    /// Flooding, heavy rain.
    Bahaya,
    /// Normal water level under a storm.
    ExtremeWeather,
}

impl ScenarioName {
    pub const ALL: [ScenarioName; 4] = [
        ScenarioName::Normal,
        ScenarioName::Waspada,
        ScenarioName::Bahaya,
        ScenarioName::ExtremeWeather,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioName::Normal => "NORMAL",
            ScenarioName::Waspada => "WASPADA",
            ScenarioName::Bahaya => "BAHAYA",
            ScenarioName::ExtremeWeather => "EXTREME_WEATHER",
        }
    }
}

impl fmt::Display for ScenarioName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScenarioName {
    type Err = ScenarioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScenarioName::ALL
            .into_iter()
            .find(|name| name.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ScenarioError::NotFound(s.into()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScenarioError {
    #[error("scenario not found: {0}")]
    NotFound(Box<str>),
    #[error("invalid {field} range for {scenario}: {reason}")]
    InvalidRange {
        scenario: ScenarioName,
        field: &'static str,
        reason: &'static str,
    },
}

/// Closed interval `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange<T> {
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Copy> ValueRange<T> {
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: T) -> bool {
        self.min <= value && value <= self.max
    }

    fn is_ordered(&self) -> bool {
        self.min <= self.max
    }
}

/// Value ranges for one operating condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub name: ScenarioName,
    /// Severity label shown next to each device in the menu.
    pub description: Box<str>,
    /// Water level in centimeters.
    pub water_level: ValueRange<f64>,
    /// Rainfall in millimeters.
    pub rainfall: ValueRange<f64>,
    /// Battery charge in percent.
    pub battery: ValueRange<u8>,
}

impl Scenario {
    /// Build a scenario, checking that every range is ordered and that the
    /// battery range stays within 0..=100.
    pub fn new(
        name: ScenarioName,
        description: impl Into<Box<str>>,
        water_level: ValueRange<f64>,
        rainfall: ValueRange<f64>,
        battery: ValueRange<u8>,
    ) -> Result<Self, ScenarioError> {
        let invalid = |field, reason| ScenarioError::InvalidRange {
            scenario: name,
            field,
            reason,
        };

        if !water_level.is_ordered() {
            return Err(invalid("water_level", "min is greater than max"));
        }
        if !rainfall.is_ordered() {
            return Err(invalid("rainfall", "min is greater than max"));
        }
        if !battery.is_ordered() {
            return Err(invalid("battery", "min is greater than max"));
        }
        if battery.max > 100 {
            return Err(invalid("battery", "exceeds 100 percent"));
        }

        Ok(Self {
            name,
            description: description.into(),
            water_level,
            rainfall,
            battery,
        })
    }
}

/// Static lookup from scenario name to its ranges.
#[derive(Debug, Clone)]
pub struct ScenarioTable {
    scenarios: Vec<Scenario>,
}

impl ScenarioTable {
    pub fn new(scenarios: Vec<Scenario>) -> Self {
        Self { scenarios }
    }

    /// The four flood-monitoring scenarios the field stations report under.
    pub fn builtin() -> Self {
        let entries = [
            (
                ScenarioName::Normal,
                "[OK] AMAN (Air Rendah, Cerah)",
                (5.0, 19.0),
                (0.0, 0.0),
                (80, 100),
            ),
            (
                ScenarioName::Waspada,
                "[!] WASPADA (Air Sedang, Hujan Ringan)",
                (20.5, 39.5),
                (1.0, 5.0),
                (60, 80),
            ),
            (
                ScenarioName::Bahaya,
                "[!!] BAHAYA (Banjir, Hujan Deras)",
                (41.0, 65.0),
                (10.0, 20.0),
                (40, 60),
            ),
            (
                ScenarioName::ExtremeWeather,
                "[!!!] CUACA EKSTREM (Air Normal, Hujan Badai)",
                (10.0, 18.0),
                (25.0, 50.0),
                (10, 15),
            ),
        ];

        // An entry failing validation is left out, so any device bound to it
        // fails registry construction instead of sampling from a bad range.
        let scenarios = entries
            .into_iter()
            .filter_map(|(name, desc, (w_min, w_max), (r_min, r_max), (b_min, b_max))| {
                Scenario::new(
                    name,
                    desc,
                    ValueRange::new(w_min, w_max),
                    ValueRange::new(r_min, r_max),
                    ValueRange::new(b_min, b_max),
                )
                .ok()
            })
            .collect();

        Self { scenarios }
    }

    pub fn get(&self, name: ScenarioName) -> Result<&Scenario, ScenarioError> {
        self.scenarios
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ScenarioError::NotFound(name.as_str().into()))
    }

    /// Look a scenario up by its textual key, e.g. `"BAHAYA"`.
    pub fn lookup(&self, key: &str) -> Result<&Scenario, ScenarioError> {
        let name: ScenarioName = key.parse()?;
        self.get(name)
    }

    pub fn contains(&self, name: ScenarioName) -> bool {
        self.scenarios.iter().any(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scenario> {
        self.scenarios.iter()
    }
}

impl Default for ScenarioTable {
    fn default() -> Self {
        Self::builtin()
    }
}
