use awlr_core::topic;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backend::{BackendClient, NotificationRequest};
use crate::connection::{ConnectionManager, SendError};
use crate::transport::{InboundMessage, Transport};

/// Counters reported when the listener stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStats {
    pub received: u64,
    pub ingested: u64,
    pub notified: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Subscribe to every device's data and status topics and print what arrives,
/// forwarding each message to `backend` when one is given.
///
/// Runs until cancelled or until the session ends. The connection must already
/// be established; teardown is left to the caller.
pub async fn run_listener<T: Transport>(
    connection: &mut ConnectionManager<T>,
    backend: Option<&BackendClient>,
    cancel: CancellationToken,
) -> Result<ListenerStats, SendError> {
    connection.subscribe(topic::ALL_DATA).await?;
    connection.subscribe(topic::ALL_STATUS).await?;

    let mut stats = ListenerStats::default();
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Listener shutting down");
                break;
            }
            message = connection.next_message() => message,
        };
        let Some(message) = message else {
            warn!("MQTT session ended, listener stopping");
            break;
        };

        stats.received += 1;
        info!(
            topic = %message.topic,
            payload = %message.payload_str(),
            "Message received"
        );
        println!("[RECV] {}: {}", message.topic, message.payload_str());

        if let Some(backend) = backend {
            forward(backend, &message, &mut stats).await;
        }
    }

    info!(
        received = stats.received,
        ingested = stats.ingested,
        notified = stats.notified,
        skipped = stats.skipped,
        failed = stats.failed,
        "Listener stopped"
    );
    Ok(stats)
}

/// Ingest first, then notify. Neither failure stops the listener.
async fn forward(backend: &BackendClient, message: &InboundMessage, stats: &mut ListenerStats) {
    match backend.ingest(message).await {
        Ok(()) => {
            stats.ingested += 1;
            info!(topic = %message.topic, "Forwarded to ingestion");
        }
        Err(e) => {
            stats.failed += 1;
            warn!(topic = %message.topic, error = %e, "Ingestion call failed");
        }
    }

    let request = match NotificationRequest::from_message(message) {
        Ok(request) => request,
        Err(e) => {
            stats.skipped += 1;
            warn!(error = %e, "Skipping notification");
            return;
        }
    };
    match backend.notify(&request).await {
        Ok(()) => {
            stats.notified += 1;
            info!(device_id = %request.device_id, event = ?request.event, "Notification sent");
        }
        Err(e) => {
            stats.failed += 1;
            warn!(device_id = %request.device_id, error = %e, "Notification call failed");
        }
    }
}
