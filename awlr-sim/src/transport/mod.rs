pub mod mock;
pub mod mqtt;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Depth of the queue between a transport's network task and the
/// connection manager.
pub const EVENT_QUEUE_DEPTH: usize = 64;

/// Reason code reported for a successful connect or a clean disconnect.
pub const REASON_SUCCESS: u8 = 0;

/// A message delivered by the broker on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Events raised by a transport's network task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The broker acknowledged the session.
    Connected,
    /// The broker answered the connect with a non-zero reason code.
    Refused { code: u8 },
    /// The session ended without an explicit disconnect.
    Lost { reason: String },
    /// A message arrived on a subscribed topic.
    Message(InboundMessage),
}

/// Broker session driven by a background network task.
///
/// `connect` starts the session and returns the receiving end of the event
/// queue the network task writes to. Every later call to `connect` starts a
/// fresh session with a fresh queue.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Error type for this transport implementation.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Issue the session-establishment request. Success only means the
    /// request was issued; the outcome arrives on the returned queue.
    async fn connect(&mut self) -> Result<mpsc::Receiver<ConnectionEvent>, Self::Error>;

    /// Close the session and stop the network task.
    async fn disconnect(&mut self) -> Result<(), Self::Error>;

    /// Stop the network task without saying goodbye to the broker. Used when
    /// a session never got acknowledged.
    fn abort(&mut self);

    /// Publish with QoS 0.
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool)
    -> Result<(), Self::Error>;

    async fn subscribe(&self, filter: &str) -> Result<(), Self::Error>;

    /// `host:port` style label for display.
    fn endpoint(&self) -> String;
}
