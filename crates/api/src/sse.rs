//! Shared plumbing for the two streaming endpoints (`/sessions/qr`,
//! `/events`): returning a session's single-consumer receiver once its SSE
//! stream ends, whatever the reason (clean finish or client disconnect).

use std::sync::Arc;

use gateway::Session;
use tokio::sync::mpsc;

/// Leases a session's bounded QR-code receiver for the lifetime of one SSE
/// stream. The receiver is handed back to the session on drop, so a later
/// pairing attempt (or a reconnecting client) can pick the queue back up —
/// this runs whether the stream finished normally or the client vanished
/// mid-stream, since only `Drop` is guaranteed to fire in the latter case.
pub struct QrReceiverLease {
    session: Arc<Session>,
    rx: Option<mpsc::Receiver<String>>,
}

impl QrReceiverLease {
    pub fn new(session: Arc<Session>, rx: mpsc::Receiver<String>) -> Self {
        Self {
            session,
            rx: Some(rx),
        }
    }

    pub fn receiver_mut(&mut self) -> &mut mpsc::Receiver<String> {
        self.rx.as_mut().expect("receiver taken only on drop")
    }
}

impl Drop for QrReceiverLease {
    fn drop(&mut self) {
        if let Some(rx) = self.rx.take() {
            let session = self.session.clone();
            tokio::spawn(async move { session.return_qr_receiver(rx).await });
        }
    }
}

/// Same lease pattern for the normalized inbound-event queue.
pub struct EventReceiverLease {
    session: Arc<Session>,
    rx: Option<mpsc::Receiver<proto::NormalizedPayload>>,
}

impl EventReceiverLease {
    pub fn new(session: Arc<Session>, rx: mpsc::Receiver<proto::NormalizedPayload>) -> Self {
        Self {
            session,
            rx: Some(rx),
        }
    }

    pub fn receiver_mut(&mut self) -> &mut mpsc::Receiver<proto::NormalizedPayload> {
        self.rx.as_mut().expect("receiver taken only on drop")
    }
}

impl Drop for EventReceiverLease {
    fn drop(&mut self) {
        if let Some(rx) = self.rx.take() {
            let session = self.session.clone();
            tokio::spawn(async move { session.return_event_receiver(rx).await });
        }
    }
}
