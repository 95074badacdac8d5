//! Security event sink.
//!
//! Middleware records events without awaiting storage: each event goes onto
//! a bounded queue drained by a background task that appends to the
//! `SecurityLogStore`. A full queue or a failing store costs the event,
//! never the request.

use std::sync::Arc;

use airlink_core::models::security::{SecurityEventType, SecurityLogEntry};
use airlink_core::store::SecurityLogStore;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

enum Message {
    Event(SecurityLogEntry),
    /// Acknowledged once every earlier event has been processed.
    Flush(oneshot::Sender<()>),
}

/// Cloneable handle to the security event queue.
#[derive(Clone)]
pub struct SecurityLog {
    tx: mpsc::Sender<Message>,
}

impl SecurityLog {
    /// Create the queue and spawn its drain task on the current runtime.
    ///
    /// The task exits once every handle has been dropped.
    pub fn spawn(store: Arc<dyn SecurityLogStore>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(drain(store, rx));
        (Self { tx }, handle)
    }

    /// Queue an event. Never blocks and never fails the caller.
    pub fn record(
        &self,
        event_type: SecurityEventType,
        ip_address: &str,
        path: &str,
        user_id: Option<i64>,
    ) {
        debug!(event = %event_type, ip = %ip_address, path, ?user_id, "security event");
        let entry = SecurityLogEntry::new(event_type, ip_address, path, user_id);
        if let Err(e) = self.tx.try_send(Message::Event(entry)) {
            warn!(event = %event_type, "dropping security event: {e}");
        }
    }

    /// Wait until every event recorded before this call has been processed.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Message::Flush(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }
}

async fn drain(store: Arc<dyn SecurityLogStore>, mut rx: mpsc::Receiver<Message>) {
    while let Some(message) = rx.recv().await {
        match message {
            Message::Event(entry) => {
                if let Err(e) = store.append_security_event(&entry).await {
                    warn!(event = %entry.event_type, "failed to log security event: {e}");
                }
            }
            Message::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}
