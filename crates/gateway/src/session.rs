//! A single user's upstream connection, pairing state, and bounded inbound
//! queues.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use chrono::{DateTime, Utc};
use proto::{NormalizedPayload, PendingMediaRetry, UserId};
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use tracing::warn;
use upstream::UpstreamClient;

/// Capacity of the pending-QR-code queue (§3: bounded, drop-newest).
pub const QR_QUEUE_CAPACITY: usize = 10;
/// Capacity of the inbound normalized-event queue (§3: bounded, drop-newest).
pub const EVENT_QUEUE_CAPACITY: usize = 100;

/// One user's session: an owned upstream client, its device database path,
/// and the bounded queues that bridge the upstream dispatcher to the HTTP
/// surface.
pub struct Session {
    pub user_id: UserId,
    pub client: Arc<dyn UpstreamClient>,
    pub device_db_path: PathBuf,

    last_used_at: StdMutex<DateTime<Utc>>,

    qr_tx: mpsc::Sender<String>,
    qr_rx: Mutex<Option<mpsc::Receiver<String>>>,

    login_done_tx: watch::Sender<bool>,
    login_done_rx: watch::Receiver<bool>,

    event_tx: mpsc::Sender<NormalizedPayload>,
    event_rx: Mutex<Option<mpsc::Receiver<NormalizedPayload>>>,

    media_cache: RwLock<HashMap<String, Vec<u8>>>,
    pending_media_retries: RwLock<HashMap<String, PendingMediaRetry>>,
}

impl Session {
    pub fn new(user_id: UserId, client: Arc<dyn UpstreamClient>, device_db_path: PathBuf) -> Self {
        let (qr_tx, qr_rx) = mpsc::channel(QR_QUEUE_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (login_done_tx, login_done_rx) = watch::channel(false);

        Self {
            user_id,
            client,
            device_db_path,
            last_used_at: StdMutex::new(Utc::now()),
            qr_tx,
            qr_rx: Mutex::new(Some(qr_rx)),
            login_done_tx,
            login_done_rx,
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
            media_cache: RwLock::new(HashMap::new()),
            pending_media_retries: RwLock::new(HashMap::new()),
        }
    }

    /// Updates the last-used timestamp. Called on every lookup.
    pub fn touch(&self) {
        *self.last_used_at.lock().expect("last_used_at poisoned") = Utc::now();
    }

    pub fn last_used_at(&self) -> DateTime<Utc> {
        *self.last_used_at.lock().expect("last_used_at poisoned")
    }

    /// Non-blocking push of a pairing QR code; silently dropped if the
    /// 10-deep queue is full.
    pub fn push_qr_code(&self, code: String) {
        if self.qr_tx.try_send(code).is_err() {
            warn!(user_id = %self.user_id, "qr_codes queue full; dropping code");
        }
    }

    /// Takes ownership of the QR receiver for the duration of one SSE
    /// stream. Returns `None` if another subscriber already holds it.
    pub async fn take_qr_receiver(&self) -> Option<mpsc::Receiver<String>> {
        self.qr_rx.lock().await.take()
    }

    /// Returns the receiver once the SSE stream it was lent to ends, so a
    /// later pairing attempt can reuse the queue.
    pub async fn return_qr_receiver(&self, rx: mpsc::Receiver<String>) {
        *self.qr_rx.lock().await = Some(rx);
    }

    /// Marks this session's device as having completed pairing.
    pub fn mark_logged_in(&self) {
        let _ = self.login_done_tx.send(true);
    }

    pub fn is_logged_in_latch(&self) -> bool {
        *self.login_done_rx.borrow()
    }

    /// Resolves once pairing succeeds. Resolves immediately if it already
    /// has.
    pub async fn wait_logged_in(&self) {
        let mut rx = self.login_done_rx.clone();
        if *rx.borrow() {
            return;
        }
        let _ = rx.changed().await;
    }

    /// Non-blocking push of a normalized inbound payload; on overflow the
    /// new payload is dropped and a warning logged (bounded-buffer,
    /// drop-newest — a slow SSE consumer must never backpressure the
    /// upstream dispatcher).
    pub fn enqueue_event(&self, payload: NormalizedPayload) {
        if self.event_tx.try_send(payload).is_err() {
            warn!(user_id = %self.user_id, "event_queue full; dropping payload");
        }
    }

    pub async fn take_event_receiver(&self) -> Option<mpsc::Receiver<NormalizedPayload>> {
        self.event_rx.lock().await.take()
    }

    pub async fn return_event_receiver(&self, rx: mpsc::Receiver<NormalizedPayload>) {
        *self.event_rx.lock().await = Some(rx);
    }

    pub async fn cache_media(&self, message_id: String, bytes: Vec<u8>) {
        self.media_cache.write().await.insert(message_id, bytes);
    }

    /// Serves and removes a cached media entry in one step (cache entries
    /// are removed once served).
    pub async fn take_cached_media(&self, message_id: &str) -> Option<Vec<u8>> {
        self.media_cache.write().await.remove(message_id)
    }

    pub async fn insert_pending_retry(&self, retry: PendingMediaRetry) {
        self.pending_media_retries
            .write()
            .await
            .insert(retry.message_id.clone(), retry);
    }

    pub async fn take_pending_retry(&self, message_id: &str) -> Option<PendingMediaRetry> {
        self.pending_media_retries.write().await.remove(message_id)
    }

    pub async fn has_pending_retry(&self, message_id: &str) -> bool {
        self.pending_media_retries
            .read()
            .await
            .contains_key(message_id)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use proto::MediaDescriptor;
    use upstream::fake::{FakeUpstreamClient, FakeUpstreamScript};

    use super::*;

    fn test_session(user_id: u64) -> Session {
        let client: Arc<dyn UpstreamClient> =
            Arc::new(FakeUpstreamClient::new(FakeUpstreamScript::default()));
        Session::new(UserId::from(user_id), client, PathBuf::from("/tmp/user.db"))
    }

    #[tokio::test]
    async fn qr_queue_drops_beyond_capacity() {
        let session = test_session(1);
        for i in 0..QR_QUEUE_CAPACITY {
            session.push_qr_code(format!("code-{i}"));
        }
        // One more push beyond capacity must be silently dropped.
        session.push_qr_code("overflow".to_string());

        let mut rx = session.take_qr_receiver().await.expect("receiver present");
        let mut seen = 0;
        while tokio::time::timeout(Duration::from_millis(20), rx.recv())
            .await
            .ok()
            .flatten()
            .is_some()
        {
            seen += 1;
        }
        assert_eq!(seen, QR_QUEUE_CAPACITY);
    }

    #[tokio::test]
    async fn wait_logged_in_resolves_after_mark() {
        let session = Arc::new(test_session(2));
        assert!(!session.is_logged_in_latch());

        let waiter = {
            let session = session.clone();
            tokio::spawn(async move {
                session.wait_logged_in().await;
            })
        };

        session.mark_logged_in();
        tokio::time::timeout(Duration::from_millis(200), waiter)
            .await
            .expect("wait_logged_in should resolve")
            .expect("task should not panic");
        assert!(session.is_logged_in_latch());
    }

    #[tokio::test]
    async fn cached_media_is_removed_once_served() {
        let session = test_session(3);
        session.cache_media("m1".to_string(), vec![1, 2, 3]).await;
        assert_eq!(session.take_cached_media("m1").await, Some(vec![1, 2, 3]));
        assert_eq!(session.take_cached_media("m1").await, None);
    }

    #[tokio::test]
    async fn pending_retry_round_trips() {
        let session = test_session(4);
        session
            .insert_pending_retry(PendingMediaRetry {
                message_id: "m2".to_string(),
                media_key: "key".to_string(),
                is_ptt: true,
                descriptor: MediaDescriptor::default(),
            })
            .await;
        assert!(session.has_pending_retry("m2").await);
        assert!(session.take_pending_retry("m2").await.is_some());
        assert!(!session.has_pending_retry("m2").await);
    }
}
