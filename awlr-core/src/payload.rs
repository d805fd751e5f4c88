use jiff::Timestamp;
use jiff::tz::{self, TimeZone};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ValueRange;
use crate::generator::Sample;
use crate::registry::Device;

/// Simulated Wi-Fi signal strength, dBm.
pub const RSSI_RANGE: ValueRange<i32> = ValueRange::new(-120, -70);
/// Simulated free heap, bytes.
pub const FREE_HEAP_RANGE: ValueRange<u32> = ValueRange::new(80_000, 120_000);
/// Hours added to UTC for Western Indonesia Time.
pub const WIB_OFFSET_HOURS: i8 = 7;

/// Body published on `iot/devices/{id}/data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPayload {
    #[serde(rename = "ketinggian_air")]
    pub water_level: f64,
    #[serde(rename = "curah_hujan")]
    pub rainfall: f64,
    pub timestamp: String,
}

/// Body published (retained) on `iot/devices/{id}/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub status: DeviceState,
    pub battery: u8,
    pub wifi_rssi: i32,
    pub uptime: u64,
    pub free_heap: u32,
    pub ota_update: OtaState,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Online,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtaState {
    Idle,
}

/// Both records produced by one publish cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CyclePayloads {
    pub telemetry: TelemetryPayload,
    pub status: StatusPayload,
}

impl CyclePayloads {
    /// Assemble the telemetry and status records for `device`.
    ///
    /// The timestamp string is rendered once and shared by both records.
    /// Signal strength and free heap are drawn fresh from their fixed ranges.
    pub fn build<R: Rng + ?Sized>(
        device: &Device,
        sample: Sample,
        now: Timestamp,
        rng: &mut R,
    ) -> Self {
        let timestamp = wib_timestamp(now);

        let telemetry = TelemetryPayload {
            water_level: sample.water_level,
            rainfall: sample.rainfall,
            timestamp: timestamp.clone(),
        };

        let status = StatusPayload {
            status: DeviceState::Online,
            battery: sample.battery,
            wifi_rssi: rng.random_range(RSSI_RANGE.min..=RSSI_RANGE.max),
            uptime: device.uptime,
            free_heap: rng.random_range(FREE_HEAP_RANGE.min..=FREE_HEAP_RANGE.max),
            ota_update: OtaState::Idle,
            timestamp,
        };

        Self { telemetry, status }
    }
}

/// Render `now` shifted to UTC+7 with a trailing `Z`.
///
/// Microseconds are written as six digits and left out entirely when they are
/// zero, so a whole second renders as `2024-01-01T07:00:00Z`. The `Z` suffix
/// does not denote UTC here. Consumers parse this exact shape.
pub fn wib_timestamp(now: Timestamp) -> String {
    let wib = now.to_zoned(TimeZone::fixed(tz::offset(WIB_OFFSET_HOURS)));
    let dt = wib.datetime();
    let micros = dt.subsec_nanosecond() / 1_000;

    let mut out = format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
        dt.year(),
        dt.month(),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second(),
    );
    if micros != 0 {
        out.push_str(&format!(".{micros:06}"));
    }
    out.push('Z');
    out
}
