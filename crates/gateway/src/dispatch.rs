//! Wires a session's upstream event handler to the fan-out and media
//! pipelines (spec §4.3, §4.4). Registered exactly once per session, before
//! the session is exposed outside [`crate::manager::SessionManager`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;
use upstream::UpstreamEvent;

use crate::fanout;
use crate::media;
use crate::session::Session;

/// Registers the event handler and spawns the task that dispatches each
/// inbound upstream event to the fan-out (messages) or media pipeline
/// (`MediaRetry`).
pub fn spawn_session_dispatcher(session: Arc<Session>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<UpstreamEvent>();
    session.client.add_event_handler(tx);

    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                UpstreamEvent::Message(msg) => {
                    debug!(user_id = %session.user_id, message_id = %msg.id, "inbound upstream message");
                    fanout::handle_upstream_message(&session, msg);
                }
                UpstreamEvent::MediaRetry {
                    message_id,
                    ciphertext,
                } => {
                    media::handle_media_retry(&session, &message_id, &ciphertext).await;
                }
            }
        }
        debug!(user_id = %session.user_id, "session event handler closed");
    });
}
