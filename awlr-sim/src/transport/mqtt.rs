use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ConnectionEvent, EVENT_QUEUE_DEPTH, InboundMessage, REASON_SUCCESS, Transport};
use crate::config::BrokerConfig;

/// Capacity of rumqttc's outgoing request queue.
const REQUEST_CAPACITY: usize = 10;
/// How long an explicit disconnect waits for the DISCONNECT packet to flush.
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum MqttTransportError {
    #[error("no active MQTT session")]
    NoSession,
    #[error("mqtt client error: {0}")]
    Client(#[from] rumqttc::ClientError),
}

/// MQTT 3.1.1 transport backed by rumqttc.
pub struct MqttTransport {
    options: MqttOptions,
    endpoint: String,
    session: Option<Session>,
}

struct Session {
    client: AsyncClient,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl MqttTransport {
    pub fn new(config: &BrokerConfig) -> Self {
        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("awlr-sim-{:08x}", rand::random::<u32>()));

        let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        options.set_clean_session(true);
        if !config.username.is_empty() {
            options.set_credentials(config.username.clone(), config.password.clone());
        }
        if config.tls {
            options.set_transport(rumqttc::Transport::tls_with_default_config());
        }

        Self {
            options,
            endpoint: config.address(),
            session: None,
        }
    }

    fn client(&self) -> Result<&AsyncClient, MqttTransportError> {
        self.session
            .as_ref()
            .map(|s| &s.client)
            .ok_or(MqttTransportError::NoSession)
    }
}

#[async_trait]
impl Transport for MqttTransport {
    type Error = MqttTransportError;

    async fn connect(&mut self) -> Result<mpsc::Receiver<ConnectionEvent>, Self::Error> {
        if let Some(old) = self.session.take() {
            old.cancel.cancel();
        }

        let (client, eventloop) = AsyncClient::new(self.options.clone(), REQUEST_CAPACITY);
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let cancel = CancellationToken::new();

        debug!(endpoint = %self.endpoint, "Starting MQTT event loop");
        let task = tokio::spawn(run_event_loop(eventloop, tx, cancel.clone()));

        self.session = Some(Session {
            client,
            cancel,
            task,
        });

        Ok(rx)
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };

        if let Err(e) = session.client.disconnect().await {
            debug!(error = %e, "Event loop already stopped before disconnect");
        }
        let mut task = session.task;
        if tokio::time::timeout(DISCONNECT_GRACE, &mut task).await.is_err() {
            debug!("DISCONNECT not flushed within grace period");
        }
        session.cancel.cancel();

        Ok(())
    }

    fn abort(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel.cancel();
        }
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> Result<(), Self::Error> {
        self.client()?
            .publish(topic, QoS::AtMostOnce, retain, payload)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, filter: &str) -> Result<(), Self::Error> {
        self.client()?.subscribe(filter, QoS::AtMostOnce).await?;
        Ok(())
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }
}

/// Poll rumqttc's event loop and translate what matters into
/// [`ConnectionEvent`]s. Ends on cancellation, on a clean outgoing
/// DISCONNECT, or after reporting a refusal or a lost session.
async fn run_event_loop(
    mut eventloop: EventLoop,
    tx: mpsc::Sender<ConnectionEvent>,
    cancel: CancellationToken,
) {
    loop {
        let polled = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("MQTT event loop shutting down");
                break;
            }
            polled = eventloop.poll() => polled,
        };

        let event = match polled {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => match reason_code(ack.code) {
                REASON_SUCCESS => ConnectionEvent::Connected,
                code => ConnectionEvent::Refused { code },
            },
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                ConnectionEvent::Message(InboundMessage {
                    topic: publish.topic,
                    payload: publish.payload.to_vec(),
                })
            }
            Ok(Event::Incoming(Packet::Disconnect)) => ConnectionEvent::Lost {
                reason: "broker closed the session".to_owned(),
            },
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("DISCONNECT sent");
                break;
            }
            Ok(_) => continue,
            Err(ConnectionError::ConnectionRefused(code)) => ConnectionEvent::Refused {
                code: reason_code(code),
            },
            Err(e) => ConnectionEvent::Lost {
                reason: e.to_string(),
            },
        };

        let terminal = matches!(
            event,
            ConnectionEvent::Refused { .. } | ConnectionEvent::Lost { .. }
        );
        if tx.send(event).await.is_err() {
            debug!("Event queue closed, MQTT event loop shutting down");
            break;
        }
        if terminal {
            break;
        }
    }
}

/// MQTT 3.1.1 CONNACK return codes.
fn reason_code(code: ConnectReturnCode) -> u8 {
    match code {
        ConnectReturnCode::Success => 0,
        ConnectReturnCode::RefusedProtocolVersion => 1,
        ConnectReturnCode::BadClientId => 2,
        ConnectReturnCode::ServiceUnavailable => 3,
        ConnectReturnCode::BadUserNamePassword => 4,
        ConnectReturnCode::NotAuthorized => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connack_codes() {
        assert_eq!(reason_code(ConnectReturnCode::Success), REASON_SUCCESS);
        assert_eq!(reason_code(ConnectReturnCode::BadUserNamePassword), 4);
        assert_eq!(reason_code(ConnectReturnCode::NotAuthorized), 5);
    }

    #[tokio::test]
    async fn publish_without_session_fails() {
        let transport = MqttTransport::new(&BrokerConfig::default());
        assert!(matches!(
            transport.publish("t", b"x".to_vec(), false).await,
            Err(MqttTransportError::NoSession)
        ));
        assert_eq!(transport.endpoint(), "localhost:1883");
    }

    #[tokio::test]
    async fn disconnect_without_session_is_noop() {
        let mut transport = MqttTransport::new(&BrokerConfig::default());
        transport.disconnect().await.unwrap();
    }
}
