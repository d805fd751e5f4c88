use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use awlr_core::topic;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use super::{ConnectionEvent, EVENT_QUEUE_DEPTH, InboundMessage, Transport};

/// How the mock answers a connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockAck {
    /// Acknowledge immediately.
    Accept,
    /// Refuse with the given reason code.
    Refuse(u8),
    /// Never answer.
    Silent,
}

/// A message the mock accepted for publishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

#[derive(Debug, Error)]
pub enum MockTransportError {
    #[error("no active session")]
    NoSession,
    #[error("publish to {0} rejected")]
    Rejected(String),
    #[error("mutex poisoned: {0}")]
    MutexPoisoned(String),
}

impl<T> From<PoisonError<T>> for MockTransportError {
    fn from(err: PoisonError<T>) -> Self {
        MockTransportError::MutexPoisoned(err.to_string())
    }
}

/// In-process stand-in for a broker.
///
/// Clones share state, so a test can hand one clone to the connection manager
/// and keep another to inspect publishes or inject events. Published messages
/// are looped back to the session's own subscriptions.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

struct MockState {
    ack: MockAck,
    events: Option<mpsc::Sender<ConnectionEvent>>,
    published: Vec<PublishedMessage>,
    subscriptions: Vec<String>,
    failing_topics: HashSet<String>,
    connect_calls: usize,
    disconnect_calls: usize,
}

impl MockTransport {
    pub fn new(ack: MockAck) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                ack,
                events: None,
                published: Vec::new(),
                subscriptions: Vec::new(),
                failing_topics: HashSet::new(),
                connect_calls: 0,
                disconnect_calls: 0,
            })),
        }
    }

    pub fn accepting() -> Self {
        Self::new(MockAck::Accept)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MockState>, MockTransportError> {
        Ok(self.state.lock()?)
    }

    /// Change how later connects are answered.
    pub fn set_ack(&self, ack: MockAck) {
        if let Ok(mut state) = self.lock() {
            state.ack = ack;
        }
    }

    /// Reject every later publish to `topic`.
    pub fn fail_topic(&self, topic: impl Into<String>) {
        if let Ok(mut state) = self.lock() {
            state.failing_topics.insert(topic.into());
        }
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.lock()
            .map(|state| state.published.clone())
            .unwrap_or_default()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.lock()
            .map(|state| state.subscriptions.clone())
            .unwrap_or_default()
    }

    pub fn connect_calls(&self) -> usize {
        self.lock().map(|state| state.connect_calls).unwrap_or(0)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.lock().map(|state| state.disconnect_calls).unwrap_or(0)
    }

    /// End the session as if the network dropped. Returns `false` when no
    /// session is active.
    pub fn drop_session(&self, reason: &str) -> bool {
        let Ok(mut state) = self.lock() else {
            return false;
        };
        let Some(tx) = state.events.take() else {
            return false;
        };
        state.subscriptions.clear();
        tx.try_send(ConnectionEvent::Lost {
            reason: reason.to_owned(),
        })
        .is_ok()
    }

    /// Deliver a message as if the broker routed it to this session.
    pub fn deliver(&self, topic: &str, payload: impl Into<Vec<u8>>) -> bool {
        let Ok(state) = self.lock() else {
            return false;
        };
        let Some(tx) = state.events.as_ref() else {
            return false;
        };
        tx.try_send(ConnectionEvent::Message(InboundMessage {
            topic: topic.to_owned(),
            payload: payload.into(),
        }))
        .is_ok()
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = MockTransportError;

    async fn connect(&mut self) -> Result<mpsc::Receiver<ConnectionEvent>, Self::Error> {
        let mut state = self.lock()?;
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);

        state.connect_calls += 1;
        state.subscriptions.clear();

        let answer = match state.ack {
            MockAck::Accept => Some(ConnectionEvent::Connected),
            MockAck::Refuse(code) => Some(ConnectionEvent::Refused { code }),
            MockAck::Silent => None,
        };
        if let Some(event) = answer {
            // Fresh channel, cannot be full.
            let _ = tx.try_send(event);
        }

        state.events = Some(tx);
        Ok(rx)
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        let mut state = self.lock()?;
        state.disconnect_calls += 1;
        state.events = None;
        state.subscriptions.clear();
        Ok(())
    }

    fn abort(&mut self) {
        if let Ok(mut state) = self.lock() {
            state.events = None;
            state.subscriptions.clear();
        }
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> Result<(), Self::Error> {
        let mut state = self.lock()?;
        let Some(tx) = state.events.clone() else {
            return Err(MockTransportError::NoSession);
        };
        if state.failing_topics.contains(topic) {
            return Err(MockTransportError::Rejected(topic.to_owned()));
        }

        let looped_back = state
            .subscriptions
            .iter()
            .any(|filter| topic::matches_filter(filter, topic));
        if looped_back {
            let message = InboundMessage {
                topic: topic.to_owned(),
                payload: payload.clone(),
            };
            if tx.try_send(ConnectionEvent::Message(message)).is_err() {
                debug!(topic, "Loopback queue full, dropping message");
            }
        }

        state.published.push(PublishedMessage {
            topic: topic.to_owned(),
            payload,
            retain,
        });
        Ok(())
    }

    async fn subscribe(&self, filter: &str) -> Result<(), Self::Error> {
        let mut state = self.lock()?;
        if state.events.is_none() {
            return Err(MockTransportError::NoSession);
        }
        state.subscriptions.push(filter.to_owned());
        Ok(())
    }

    fn endpoint(&self) -> String {
        "mock".to_owned()
    }
}
