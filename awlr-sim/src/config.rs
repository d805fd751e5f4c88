use std::path::Path;
use std::time::Duration;

use awlr_core::{Device, DeviceRegistry};
use color_eyre::eyre::{WrapErr, eyre};
use serde::Deserialize;

use crate::connection::AckWait;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub broker: BrokerConfig,
    pub simulator: SimulatorConfig,
    /// Replaces the built-in station list when non-empty.
    pub devices: Vec<Device>,
    pub backend: Option<BackendConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// A real MQTT broker.
    Mqtt,
    /// In-process broker stand-in, nothing leaves the machine.
    Mock,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub transport: TransportKind,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Generated per process when absent.
    pub client_id: Option<String>,
    pub keep_alive_secs: u64,
    pub tls: bool,
    /// Interval between checks for the broker's connect acknowledgment.
    pub ack_poll_interval_ms: u64,
    /// Number of checks before giving up on the acknowledgment.
    pub ack_max_polls: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Echo both payload bodies after each publish.
    pub debug: bool,
    /// Pause between devices when sending to all of them.
    pub send_all_delay_ms: u64,
    /// Pause between disconnect and connect on reconnect.
    pub reconnect_pause_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Project base URL, e.g. `https://<project>.supabase.co`.
    pub url: String,
    /// Sent as a bearer token.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_ingest_function")]
    pub ingest_function: String,
    #[serde(default = "default_notify_function")]
    pub notify_function: String,
}

fn default_ingest_function() -> String {
    "mqtt-data-handler".to_owned()
}

fn default_notify_function() -> String {
    "telegram-notifications".to_owned()
}

impl Config {
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.broker.validate()?;
        Ok(config)
    }

    /// Apply `MQTT_*`, `DEBUG` and `BACKEND_*` overrides from the process
    /// environment.
    pub fn apply_env(&mut self) -> color_eyre::Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    pub fn apply_env_from<F>(&mut self, var: F) -> color_eyre::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = var("MQTT_BROKER") {
            self.broker.host = host;
        }
        if let Some(port) = var("MQTT_PORT") {
            self.broker.port = port
                .trim()
                .parse()
                .wrap_err_with(|| format!("invalid MQTT_PORT '{port}'"))?;
        }
        if let Some(username) = var("MQTT_USERNAME") {
            self.broker.username = username;
        }
        if let Some(password) = var("MQTT_PASSWORD") {
            self.broker.password = password;
        }
        if let Some(debug) = var("DEBUG") {
            self.simulator.debug = debug.trim().eq_ignore_ascii_case("true");
        }

        if let Some(url) = var("BACKEND_URL") {
            if let Some(backend) = self.backend.as_mut() {
                backend.url = url;
            } else {
                self.backend = Some(BackendConfig::with_url(url));
            }
        }
        if let Some(key) = var("BACKEND_API_KEY") {
            let Some(backend) = self.backend.as_mut() else {
                return Err(eyre!(
                    "BACKEND_API_KEY is set but no backend URL is configured"
                ));
            };
            backend.api_key = key;
        }

        self.broker.validate()
    }

    /// Configured stations, or the built-in four when none are listed.
    pub fn devices(&self) -> Vec<Device> {
        if self.devices.is_empty() {
            DeviceRegistry::builtin_devices()
        } else {
            self.devices.clone()
        }
    }
}

impl BackendConfig {
    pub fn with_url(url: String) -> Self {
        Self {
            url,
            api_key: String::new(),
            ingest_function: default_ingest_function(),
            notify_function: default_notify_function(),
        }
    }

    pub fn function_url(&self, function: &str) -> String {
        format!("{}/functions/v1/{function}", self.url.trim_end_matches('/'))
    }
}

/// Upper bound for `ack_poll_interval_ms`.
pub const MAX_ACK_POLL_INTERVAL_MS: u64 = 60_000;
/// Upper bound for `ack_max_polls`.
pub const MAX_ACK_POLLS: u32 = 1_000;

impl BrokerConfig {
    /// Reject acknowledgment waits that are empty or too long to schedule.
    pub fn validate(&self) -> color_eyre::Result<()> {
        if !(1..=MAX_ACK_POLL_INTERVAL_MS).contains(&self.ack_poll_interval_ms) {
            return Err(eyre!(
                "broker.ack_poll_interval_ms must be within 1..={MAX_ACK_POLL_INTERVAL_MS}, got {}",
                self.ack_poll_interval_ms
            ));
        }
        if !(1..=MAX_ACK_POLLS).contains(&self.ack_max_polls) {
            return Err(eyre!(
                "broker.ack_max_polls must be within 1..={MAX_ACK_POLLS}, got {}",
                self.ack_max_polls
            ));
        }
        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn ack_wait(&self) -> AckWait {
        AckWait {
            poll_interval: Duration::from_millis(self.ack_poll_interval_ms),
            max_polls: self.ack_max_polls,
        }
    }
}

impl SimulatorConfig {
    pub fn send_all_delay(&self) -> Duration {
        Duration::from_millis(self.send_all_delay_ms)
    }

    pub fn reconnect_pause(&self) -> Duration {
        Duration::from_millis(self.reconnect_pause_ms)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Mqtt,
            host: "localhost".to_owned(),
            port: 1883,
            username: String::new(),
            password: String::new(),
            client_id: None,
            keep_alive_secs: 60,
            tls: false,
            ack_poll_interval_ms: 500,
            ack_max_polls: 10,
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            debug: false,
            send_all_delay_ms: 1000,
            reconnect_pause_ms: 1000,
        }
    }
}
