pub mod backend;
pub mod config;
pub mod connection;
pub mod listener;
pub mod menu;
pub mod publisher;
pub mod simulator;
pub mod transport;

pub use backend::{BackendClient, BackendError, NotificationEvent, NotificationRequest};
pub use config::{BackendConfig, BrokerConfig, Config, SimulatorConfig, TransportKind};
pub use connection::{AckWait, ConnectError, ConnectionManager, ConnectionState, SendError};
pub use listener::{ListenerStats, run_listener};
pub use menu::{LoopExit, MenuChoice, MenuError, run_command_loop, spawn_line_reader};
pub use publisher::{PublishError, PublishReport, Publisher, TopicOutcome};
pub use simulator::Simulator;
pub use transport::mock::{MockAck, MockTransport, PublishedMessage};
pub use transport::mqtt::MqttTransport;
pub use transport::{ConnectionEvent, InboundMessage, Transport};
