use std::fmt::Write as _;

use awlr_core::{
    CyclePayloads, DeviceId, DeviceRegistry, RegistryError, ScenarioError, ScenarioTable, generate,
    topic,
};
use rand::Rng;
use thiserror::Error;
use tracing::{error, info};

use crate::connection::{ConnectionManager, SendError};
use crate::transport::Transport;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("not connected to MQTT broker")]
    NotConnected,
    #[error(transparent)]
    InvalidSelection(RegistryError),
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result of one publish operation on one topic.
#[derive(Debug)]
pub enum TopicOutcome {
    Sent,
    Failed(SendError),
}

impl TopicOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, TopicOutcome::Sent)
    }
}

impl From<Result<(), SendError>> for TopicOutcome {
    fn from(result: Result<(), SendError>) -> Self {
        match result {
            Ok(()) => TopicOutcome::Sent,
            Err(e) => TopicOutcome::Failed(e),
        }
    }
}

/// Everything one publish cycle produced for one device.
#[derive(Debug)]
pub struct PublishReport {
    pub device_id: DeviceId,
    pub device_name: String,
    pub payloads: CyclePayloads,
    pub data_topic: String,
    pub status_topic: String,
    pub data: TopicOutcome,
    pub status: TopicOutcome,
}

impl PublishReport {
    /// Both topics accepted their message.
    pub fn is_complete(&self) -> bool {
        self.data.is_sent() && self.status.is_sent()
    }

    /// Console summary of the cycle, with both bodies appended when `debug`
    /// is set.
    pub fn render(&self, debug: bool) -> String {
        let telemetry = &self.payloads.telemetry;
        let status = &self.payloads.status;
        let mut out = String::new();

        let _ = writeln!(out, "[SEND] Sending to {}...", self.device_name);
        for (topic, outcome) in [(&self.data_topic, &self.data), (&self.status_topic, &self.status)] {
            if let TopicOutcome::Failed(e) = outcome {
                let _ = writeln!(out, "   [ERROR] Failed to publish to {topic}: {e}");
            }
        }
        let _ = writeln!(
            out,
            "   Water: {} cm | Rain: {} mm",
            telemetry.water_level, telemetry.rainfall
        );
        let _ = writeln!(
            out,
            "   Battery: {}% | RSSI: {} dBm | Uptime: {}s",
            status.battery, status.wifi_rssi, status.uptime
        );
        let _ = writeln!(out, "   DeviceID: {}", self.device_id);
        if self.is_complete() {
            let _ = writeln!(out, "[OK] Data sent to MQTT broker!");
        } else {
            let _ = writeln!(out, "[WARN] Data only partially sent");
        }

        if debug {
            let sensor = serde_json::to_string(telemetry).unwrap_or_default();
            let status = serde_json::to_string(status).unwrap_or_default();
            let _ = writeln!(out, "[DEBUG] Sensor payload: {sensor}");
            let _ = writeln!(out, "[DEBUG] Status payload: {status}");
        }

        out
    }
}

/// Builds a cycle's payloads and publishes them on the device's two topics.
pub struct Publisher<R> {
    rng: R,
}

impl<R: Rng> Publisher<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Publish one cycle for the device at `index`.
    ///
    /// Uptime advances once per call that gets past the connection and
    /// selection checks, whether or not the broker accepts the messages. The
    /// two publishes are independent: a failure on one is reported in the
    /// returned [`PublishReport`] and does not stop the other.
    pub async fn publish<T: Transport>(
        &mut self,
        scenarios: &ScenarioTable,
        registry: &mut DeviceRegistry,
        connection: &mut ConnectionManager<T>,
        index: usize,
    ) -> Result<PublishReport, PublishError> {
        if !connection.is_connected() {
            return Err(PublishError::NotConnected);
        }

        let device = registry
            .get_mut(index)
            .map_err(PublishError::InvalidSelection)?;
        let sample = generate(scenarios, device.scenario, &mut self.rng)?;
        device.advance_uptime();

        let payloads = CyclePayloads::build(device, sample, jiff::Timestamp::now(), &mut self.rng);
        let data_body = serde_json::to_vec(&payloads.telemetry)?;
        let status_body = serde_json::to_vec(&payloads.status)?;

        let data_topic = topic::data_topic(&device.id);
        let status_topic = topic::status_topic(&device.id);

        let data = TopicOutcome::from(connection.publish(&data_topic, data_body, false).await);
        if let TopicOutcome::Failed(e) = &data {
            error!(topic = %data_topic, error = %e, "Failed to publish telemetry");
        }
        let status = TopicOutcome::from(connection.publish(&status_topic, status_body, true).await);
        if let TopicOutcome::Failed(e) = &status {
            error!(topic = %status_topic, error = %e, "Failed to publish status");
        }

        info!(
            device_id = %device.id,
            uptime = device.uptime,
            water_level = payloads.telemetry.water_level,
            rainfall = payloads.telemetry.rainfall,
            battery = payloads.status.battery,
            "Published device cycle"
        );

        Ok(PublishReport {
            device_id: device.id.clone(),
            device_name: device.name.to_string(),
            payloads,
            data_topic,
            status_topic,
            data,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use awlr_core::{Device, Sample, ScenarioName};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn report(data: TopicOutcome) -> PublishReport {
        let device = Device::new("dev-9", "AWLR 9", ScenarioName::Waspada, 600);
        let sample = Sample {
            water_level: 25.5,
            rainfall: 2.3,
            battery: 70,
        };
        let now: jiff::Timestamp = "2024-05-01T00:00:00.5Z".parse().unwrap();
        let payloads = CyclePayloads::build(&device, sample, now, &mut StdRng::seed_from_u64(4));

        PublishReport {
            device_id: device.id.clone(),
            device_name: device.name.to_string(),
            data_topic: topic::data_topic(&device.id),
            status_topic: topic::status_topic(&device.id),
            payloads,
            data,
            status: TopicOutcome::Sent,
        }
    }

    #[test]
    fn debug_render_echoes_both_bodies() {
        let report = report(TopicOutcome::Sent);
        let sensor = serde_json::to_string(&report.payloads.telemetry).unwrap();
        let status = serde_json::to_string(&report.payloads.status).unwrap();

        let out = report.render(true);
        assert!(out.contains(&format!("[DEBUG] Sensor payload: {sensor}\n")), "{out}");
        assert!(out.contains(&format!("[DEBUG] Status payload: {status}\n")), "{out}");
        assert!(sensor.contains(r#""ketinggian_air":25.5"#));
        assert!(status.contains(r#""uptime":600"#));
    }

    #[test]
    fn plain_render_has_no_bodies() {
        let out = report(TopicOutcome::Sent).render(false);
        assert!(out.contains("[SEND] Sending to AWLR 9..."));
        assert!(out.contains("Water: 25.5 cm | Rain: 2.3 mm"));
        assert!(out.contains("[OK] Data sent to MQTT broker!"));
        assert!(!out.contains("[DEBUG]"));
    }

    #[test]
    fn failed_topic_is_reported() {
        let report = report(TopicOutcome::Failed(SendError::NotConnected));
        assert!(!report.is_complete());

        let out = report.render(false);
        assert!(out.contains("[ERROR] Failed to publish to iot/devices/dev-9/data"));
        assert!(out.contains("[WARN] Data only partially sent"));
    }
}
