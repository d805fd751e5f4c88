use std::collections::VecDeque;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::transport::{ConnectionEvent, InboundMessage, Transport};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "[DISCONNECTED]",
            ConnectionState::Connecting => "[CONNECTING]",
            ConnectionState::Connected => "[CONNECTED]",
        }
    }
}

/// Bounded wait for the broker's connect acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckWait {
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl AckWait {
    pub fn budget(&self) -> Duration {
        self.poll_interval * self.max_polls
    }
}

impl Default for AckWait {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            max_polls: 10,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("connection refused by broker (reason code {code})")]
    Refused { code: u8 },
    #[error("connection timeout after {waited:?} waiting for broker acknowledgment")]
    Timeout { waited: Duration },
    #[error("transport error: {0}")]
    Transport(BoxError),
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("not connected to broker")]
    NotConnected,
    #[error("transport error: {0}")]
    Transport(BoxError),
}

/// Owns the broker session and is the only writer of [`ConnectionState`].
///
/// The transport's network task reports through a queue; state changes are
/// applied whenever the manager drains it, which happens on every query.
pub struct ConnectionManager<T: Transport> {
    transport: T,
    state: ConnectionState,
    ack_wait: AckWait,
    events: Option<mpsc::Receiver<ConnectionEvent>>,
    inbox: VecDeque<InboundMessage>,
    failure: Option<ConnectError>,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(transport: T, ack_wait: AckWait) -> Self {
        Self {
            transport,
            state: ConnectionState::Disconnected,
            ack_wait,
            events: None,
            inbox: VecDeque::new(),
            failure: None,
        }
    }

    pub fn endpoint(&self) -> String {
        self.transport.endpoint()
    }

    pub fn state(&mut self) -> ConnectionState {
        self.drain_events();
        self.state
    }

    pub fn is_connected(&mut self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Start a session and wait, in bounded steps, for the acknowledgment.
    ///
    /// A refusal or transport failure reported during the wait ends it early.
    /// When the budget runs out the session is torn down and the state goes
    /// back to `Disconnected`.
    pub async fn connect(&mut self) -> Result<(), ConnectError> {
        if self.is_connected() {
            debug!("Already connected");
            return Ok(());
        }

        let endpoint = self.transport.endpoint();
        info!(%endpoint, "Connecting to MQTT broker");

        self.state = ConnectionState::Connecting;
        self.failure = None;

        match self.transport.connect().await {
            Ok(events) => self.events = Some(events),
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                error!(error = %e, %endpoint, "Connection error");
                return Err(ConnectError::Transport(Box::new(e)));
            }
        }

        // Poll on a fixed schedule so the total wait never drifts past the budget.
        let started = Instant::now();
        for poll in 1..=self.ack_wait.max_polls {
            tokio::time::sleep_until(started + self.ack_wait.poll_interval * poll).await;
            self.drain_events();

            match self.state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Disconnected => {
                    return Err(self.failure.take().unwrap_or_else(|| {
                        ConnectError::Transport("session ended before acknowledgment".into())
                    }));
                }
                ConnectionState::Connecting => {}
            }
        }

        let waited = self.ack_wait.budget();
        error!(
            ?waited,
            %endpoint,
            "Connection timeout. Check broker address and credentials."
        );
        self.events = None;
        self.state = ConnectionState::Disconnected;
        self.transport.abort();
        Err(ConnectError::Timeout { waited })
    }

    /// Close the session. A no-op when already disconnected.
    pub async fn disconnect(&mut self) {
        if self.state() == ConnectionState::Disconnected {
            return;
        }

        info!("Disconnecting from MQTT broker");
        // Drop the queue first so the network task stops reporting.
        self.events = None;
        self.state = ConnectionState::Disconnected;
        if let Err(e) = self.transport.disconnect().await {
            warn!(error = %e, "Error while closing MQTT session");
        }
        info!("Disconnected from MQTT broker");
    }

    /// Disconnect, wait `pause`, connect again.
    pub async fn reconnect(&mut self, pause: Duration) -> Result<(), ConnectError> {
        self.disconnect().await;
        tokio::time::sleep(pause).await;
        self.connect().await
    }

    pub async fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> Result<(), SendError> {
        if !self.is_connected() {
            return Err(SendError::NotConnected);
        }
        self.transport
            .publish(topic, payload, retain)
            .await
            .map_err(|e| SendError::Transport(Box::new(e)))
    }

    pub async fn subscribe(&mut self, filter: &str) -> Result<(), SendError> {
        if !self.is_connected() {
            return Err(SendError::NotConnected);
        }
        self.transport
            .subscribe(filter)
            .await
            .map_err(|e| SendError::Transport(Box::new(e)))?;
        info!(filter, "Subscribed");
        Ok(())
    }

    /// Wait for the next message on a subscribed topic.
    ///
    /// Returns `None` once the session is gone.
    pub async fn next_message(&mut self) -> Option<InboundMessage> {
        loop {
            if let Some(message) = self.inbox.pop_front() {
                return Some(message);
            }
            let event = self.events.as_mut()?.recv().await;
            match event {
                Some(event) => self.apply(event),
                None => self.session_ended("event loop stopped"),
            }
        }
    }

    fn drain_events(&mut self) {
        loop {
            let Some(events) = self.events.as_mut() else {
                return;
            };
            match events.try_recv() {
                Ok(event) => self.apply(event),
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => {
                    self.session_ended("event loop stopped");
                    return;
                }
            }
        }
    }

    fn apply(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected => {
                self.state = ConnectionState::Connected;
                info!("MQTT connected successfully");
            }
            ConnectionEvent::Refused { code } => {
                self.state = ConnectionState::Disconnected;
                self.events = None;
                error!(code, "MQTT connection failed");
                self.failure = Some(ConnectError::Refused { code });
            }
            ConnectionEvent::Lost { reason } => self.session_ended(&reason),
            ConnectionEvent::Message(message) => self.inbox.push_back(message),
        }
    }

    fn session_ended(&mut self, reason: &str) {
        let previous = self.state;
        self.state = ConnectionState::Disconnected;
        self.events = None;

        match previous {
            ConnectionState::Connected => {
                warn!(reason, "Unexpected disconnection from MQTT broker");
            }
            ConnectionState::Connecting => {
                error!(reason, "Connection error");
                self.failure = Some(ConnectError::Transport(reason.into()));
            }
            ConnectionState::Disconnected => {}
        }
    }
}
