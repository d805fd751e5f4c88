use std::fmt::Write as _;

use awlr_core::{DeviceRegistry, RegistryError, ScenarioTable};
use rand::Rng;
use tracing::info;

use crate::config::{Config, SimulatorConfig};
use crate::connection::{ConnectError, ConnectionManager, ConnectionState};
use crate::publisher::{PublishError, PublishReport, Publisher};
use crate::transport::Transport;

/// Ties the station registry, the broker session and the publisher together
/// behind the operations the command loop dispatches to.
pub struct Simulator<T: Transport, R> {
    scenarios: ScenarioTable,
    registry: DeviceRegistry,
    connection: ConnectionManager<T>,
    publisher: Publisher<R>,
    settings: SimulatorConfig,
}

impl<T: Transport, R: Rng> Simulator<T, R> {
    pub fn new(
        scenarios: ScenarioTable,
        registry: DeviceRegistry,
        connection: ConnectionManager<T>,
        rng: R,
        settings: SimulatorConfig,
    ) -> Self {
        Self {
            scenarios,
            registry,
            connection,
            publisher: Publisher::new(rng),
            settings,
        }
    }

    /// Build from configuration with the built-in scenario table.
    pub fn from_config(config: &Config, transport: T, rng: R) -> Result<Self, RegistryError> {
        let scenarios = ScenarioTable::builtin();
        let registry = DeviceRegistry::new(config.devices(), &scenarios)?;
        let connection = ConnectionManager::new(transport, config.broker.ack_wait());

        Ok(Self::new(
            scenarios,
            registry,
            connection,
            rng,
            config.simulator.clone(),
        ))
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn scenarios(&self) -> &ScenarioTable {
        &self.scenarios
    }

    pub fn settings(&self) -> &SimulatorConfig {
        &self.settings
    }

    pub fn connection(&mut self) -> &mut ConnectionManager<T> {
        &mut self.connection
    }

    pub fn state(&mut self) -> ConnectionState {
        self.connection.state()
    }

    pub async fn connect(&mut self) -> Result<(), ConnectError> {
        self.connection.connect().await
    }

    pub async fn publish(&mut self, index: usize) -> Result<PublishReport, PublishError> {
        self.publisher
            .publish(
                &self.scenarios,
                &mut self.registry,
                &mut self.connection,
                index,
            )
            .await
    }

    /// Publish one cycle for every station in registration order, pausing
    /// between stations. Stops early only if the session is lost.
    pub async fn publish_all(&mut self) -> Vec<Result<PublishReport, PublishError>> {
        let delay = self.settings.send_all_delay();
        let mut results = Vec::with_capacity(self.registry.len());

        for index in 0..self.registry.len() {
            if index > 0 {
                tokio::time::sleep(delay).await;
            }
            let result = self.publish(index).await;
            let lost = matches!(result, Err(PublishError::NotConnected));
            results.push(result);
            if lost {
                break;
            }
        }

        info!(devices = results.len(), "Sent to all devices");
        results
    }

    pub async fn reconnect(&mut self) -> Result<(), ConnectError> {
        info!("Reconnecting to MQTT broker");
        self.connection
            .reconnect(self.settings.reconnect_pause())
            .await
    }

    /// Close the broker session. Safe to call on every exit path.
    pub async fn shutdown(&mut self) {
        self.connection.disconnect().await;
    }

    /// The device menu with per-device scenario labels and the current
    /// connection state.
    pub fn render_menu(&mut self) -> String {
        let state = self.connection.state();
        let mut out = String::new();

        let _ = writeln!(out, "{}", "=".repeat(60));
        let _ = writeln!(out, "AWLR MQTT DUMMY SENSOR - {}", state.label());
        let _ = writeln!(out, "{}", "=".repeat(60));
        for (index, device) in self.registry.iter().enumerate() {
            let label = self
                .scenarios
                .get(device.scenario)
                .map(|s| s.description.as_ref())
                .unwrap_or(device.scenario.as_str());
            let _ = writeln!(out, "{}. {} - {}", index + 1, device.name, label);
        }
        let _ = writeln!(out, "{}", "-".repeat(60));
        let _ = writeln!(out, "A. Send to all devices");
        let _ = writeln!(out, "R. Reconnect MQTT");
        let _ = writeln!(out, "0. Exit");
        let _ = writeln!(out, "{}", "=".repeat(60));

        out
    }
}
