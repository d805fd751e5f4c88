use rand::Rng;

use crate::scenario::{Scenario, ScenarioError, ScenarioName, ScenarioTable, ValueRange};

/// One freshly drawn set of station readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Water level in centimeters, two decimal places.
    pub water_level: f64,
    /// Rainfall in millimeters, one decimal place.
    pub rainfall: f64,
    /// Battery charge in percent.
    pub battery: u8,
}

/// Draw a sample for the named scenario.
pub fn generate<R: Rng + ?Sized>(
    table: &ScenarioTable,
    name: ScenarioName,
    rng: &mut R,
) -> Result<Sample, ScenarioError> {
    let scenario = table.get(name)?;
    Ok(sample_scenario(scenario, rng))
}

/// Draw three independent uniform samples from the scenario's ranges.
///
/// Floats are continuous uniform over the closed range, the battery level is
/// discrete uniform with both endpoints included.
pub fn sample_scenario<R: Rng + ?Sized>(scenario: &Scenario, rng: &mut R) -> Sample {
    Sample {
        water_level: uniform_rounded(scenario.water_level, 2, rng),
        rainfall: uniform_rounded(scenario.rainfall, 1, rng),
        battery: rng.random_range(scenario.battery.min..=scenario.battery.max),
    }
}

fn uniform_rounded<R: Rng + ?Sized>(range: ValueRange<f64>, decimals: i32, rng: &mut R) -> f64 {
    if range.min == range.max {
        return range.min;
    }
    let value = rng.random_range(range.min..=range.max);
    round_to(value, decimals).clamp(range.min, range.max)
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
