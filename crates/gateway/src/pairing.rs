//! Pairing Pipeline: drives the upstream QR-code handshake into a session's
//! `qr_codes` queue and `login_done` latch (spec §4.2).

use std::sync::Arc;
use std::time::Duration;

use proto::{Error, PairingError, PairingEvent};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::session::Session;

/// Hard timeout for a single QR SSE stream.
pub const QR_STREAM_TIMEOUT: Duration = Duration::from_secs(120);

/// Outcome of `POST /sessions`.
pub enum PairingTrigger {
    /// No device identity yet; a QR pump was started (or was already
    /// running) and the caller should open the QR SSE stream.
    NeedsQr,
    /// Already paired and connected.
    Connected { phone: Option<String> },
}

/// Starts pairing if needed, or connects an already-paired session.
/// "Already connected" connect errors are tolerated as success.
pub async fn trigger_pairing(session: &Arc<Session>) -> Result<PairingTrigger, Error> {
    if session.client.is_logged_in() {
        ensure_connected(session).await?;
        return Ok(PairingTrigger::Connected {
            phone: session.client.phone_number(),
        });
    }

    let qr_rx = session
        .client
        .get_qr_channel()
        .await
        .map_err(|e| PairingError::StartFailed(e.to_string()))?;
    spawn_qr_pump(session.clone(), qr_rx);
    ensure_connected(session).await?;
    Ok(PairingTrigger::NeedsQr)
}

async fn ensure_connected(session: &Arc<Session>) -> Result<(), Error> {
    if session.client.is_connected() {
        return Ok(());
    }
    match session.client.connect().await {
        Ok(()) => Ok(()),
        Err(e) if is_already_connected(&e.to_string()) => Ok(()),
        Err(e) => Err(proto::UpstreamError::Connection(e.to_string()).into()),
    }
}

fn is_already_connected(message: &str) -> bool {
    message.to_lowercase().contains("already connected")
}

/// Forwards the upstream client's pairing event stream onto the session's
/// bounded `qr_codes` queue and `login_done` latch, then exits.
fn spawn_qr_pump(session: Arc<Session>, mut qr_rx: mpsc::Receiver<PairingEvent>) {
    tokio::spawn(async move {
        while let Some(event) = qr_rx.recv().await {
            match event {
                PairingEvent::Code(code) => {
                    debug!(user_id = %session.user_id, "pairing code received");
                    session.push_qr_code(code);
                }
                PairingEvent::Success => {
                    info!(user_id = %session.user_id, "pairing succeeded");
                    session.mark_logged_in();
                    break;
                }
            }
        }
    });
}

/// A single frame of the `/sessions/qr` SSE stream.
pub enum QrFrame {
    Qr(String),
    Success,
    Timeout,
}

/// Returns the deadline a QR SSE stream should be given at the moment it
/// starts. Callers must compute this once per stream and pass it to every
/// [`next_qr_frame`] call so the 2-minute cap is a single wall-clock
/// deadline, not a per-frame timer that a steady trickle of re-issued QR
/// codes could restart indefinitely.
pub fn qr_stream_deadline() -> Instant {
    Instant::now() + QR_STREAM_TIMEOUT
}

/// Waits for the next QR SSE frame: a new code, pairing success, or the
/// 2-minute hard `deadline` — whichever comes first. The caller is expected
/// to stop polling (and treat it as a clean end-of-stream) on client
/// disconnect, which is detected at the transport layer, not here.
pub async fn next_qr_frame(
    session: &Arc<Session>,
    qr_rx: &mut mpsc::Receiver<String>,
    deadline: Instant,
) -> QrFrame {
    if session.is_logged_in_latch() {
        return QrFrame::Success;
    }
    tokio::select! {
        code = qr_rx.recv() => match code {
            Some(code) => QrFrame::Qr(code),
            None => QrFrame::Timeout,
        },
        _ = session.wait_logged_in() => QrFrame::Success,
        _ = tokio::time::sleep_until(deadline) => QrFrame::Timeout,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use proto::UserId;
    use upstream::UpstreamClient;
    use upstream::fake::{FakeUpstreamClient, FakeUpstreamScript};

    use super::*;

    fn session_with(script: FakeUpstreamScript) -> Arc<Session> {
        let client: Arc<dyn UpstreamClient> = Arc::new(FakeUpstreamClient::new(script));
        Arc::new(Session::new(UserId::from(1), client, PathBuf::from("/tmp/u.db")))
    }

    #[tokio::test]
    async fn trigger_pairing_on_unpaired_session_starts_qr_pump() {
        let session = session_with(FakeUpstreamScript {
            qr_codes: vec!["CODE-A".to_string()],
            ..Default::default()
        });

        match trigger_pairing(&session).await.unwrap() {
            PairingTrigger::NeedsQr => {}
            PairingTrigger::Connected { .. } => panic!("expected needs_qr"),
        }

        let mut rx = session.take_qr_receiver().await.unwrap();
        let deadline = qr_stream_deadline();
        let frame = next_qr_frame(&session, &mut rx, deadline).await;
        assert!(matches!(frame, QrFrame::Qr(code) if code == "CODE-A"));

        let frame = next_qr_frame(&session, &mut rx, deadline).await;
        assert!(matches!(frame, QrFrame::Success));
        assert!(session.is_logged_in_latch());
    }

    #[tokio::test]
    async fn trigger_pairing_on_paired_session_reports_connected() {
        let session = session_with(FakeUpstreamScript {
            has_device_id: true,
            ..Default::default()
        });

        match trigger_pairing(&session).await.unwrap() {
            PairingTrigger::Connected { .. } => {}
            PairingTrigger::NeedsQr => panic!("expected connected"),
        }
        assert!(session.client.is_connected());
    }

    #[test]
    fn is_already_connected_is_case_insensitive() {
        assert!(is_already_connected("Already Connected"));
        assert!(!is_already_connected("connection refused"));
    }

    /// A steady trickle of re-issued QR codes must not push the 2-minute
    /// cap back: the deadline is computed once at stream start and every
    /// `next_qr_frame` call races against that same `Instant`.
    #[tokio::test(start_paused = true)]
    async fn deadline_is_not_extended_by_subsequent_frames() {
        let session = session_with(FakeUpstreamScript::default());
        let (tx, mut rx) = mpsc::channel::<String>(10);
        let deadline = qr_stream_deadline();

        tx.try_send("code-1".to_string()).unwrap();
        tokio::time::advance(Duration::from_secs(110)).await;
        let frame = next_qr_frame(&session, &mut rx, deadline).await;
        assert!(matches!(frame, QrFrame::Qr(code) if code == "code-1"));

        // A fresh code arrives well inside the original deadline...
        tx.try_send("code-2".to_string()).unwrap();
        let frame = next_qr_frame(&session, &mut rx, deadline).await;
        assert!(matches!(frame, QrFrame::Qr(code) if code == "code-2"));

        // ...but once the clock crosses the *original* deadline, the
        // stream still expires, even though frames kept arriving right up
        // until it did.
        tokio::time::advance(Duration::from_secs(15)).await;
        let frame = next_qr_frame(&session, &mut rx, deadline).await;
        assert!(matches!(frame, QrFrame::Timeout));
    }
}
