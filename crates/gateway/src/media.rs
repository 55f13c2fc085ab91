//! Media Acquisition Pipeline: eager download on receive, retry with
//! backoff, and the `MediaRetry` correlation dance for voice notes whose
//! ciphertext is still mid-upload when the message arrives (spec §4.4).

use std::sync::Arc;
use std::time::Duration;

use proto::{MediaDescriptor, MediaError, PendingMediaRetry};
use tracing::warn;
use upstream::{AudioPayload, MediaRetryOutcome};

use crate::session::Session;

/// Cumulative delays (seconds, from message arrival) at which eager audio
/// download attempts run.
const AUDIO_RETRY_DELAYS_SECS: [u64; 5] = [0, 2, 5, 9, 12];

/// Backoffs (milliseconds) used by the on-demand `/media/download` path.
const ON_DEMAND_BACKOFFS_MS: [u64; 5] = [0, 500, 1000, 2000, 4000];

/// Spawns the detached eager-download task for an inbound image.
pub fn spawn_eager_image_download(
    session: Arc<Session>,
    message_id: String,
    descriptor: MediaDescriptor,
) {
    tokio::spawn(async move {
        match session.client.download(&descriptor).await {
            Ok(bytes) => session.cache_media(message_id, bytes).await,
            Err(e) => warn!(%message_id, error = %e, "eager image download failed"),
        }
    });
}

/// Spawns the detached eager-download task for an inbound audio/PTT
/// message, running the retry ladder and the MediaRetry nudge.
pub fn spawn_eager_audio_download(session: Arc<Session>, message_id: String, audio: AudioPayload) {
    tokio::spawn(async move {
        run_audio_retry_ladder(&session, &message_id, &audio).await;
    });
}

async fn run_audio_retry_ladder(session: &Arc<Session>, message_id: &str, audio: &AudioPayload) {
    let mut prev_secs = 0u64;
    let mut sent_early_receipt = false;

    for &cumulative_secs in AUDIO_RETRY_DELAYS_SECS.iter() {
        let delta = cumulative_secs - prev_secs;
        prev_secs = cumulative_secs;
        if delta > 0 {
            tokio::time::sleep(Duration::from_secs(delta)).await;
        }

        if !audio.descriptor.is_resolved() {
            continue;
        }

        match session.client.download(&audio.descriptor).await {
            Ok(bytes) if !bytes.is_empty() => {
                session.cache_media(message_id.to_string(), bytes).await;
                return;
            }
            Ok(_empty_stub) => {
                if !sent_early_receipt && audio.is_ptt {
                    sent_early_receipt = true;
                    let media_key = audio.descriptor.media_key.clone().unwrap_or_default();
                    if let Err(e) = session
                        .client
                        .send_media_retry_receipt(message_id, &media_key)
                        .await
                    {
                        warn!(%message_id, error = %e, "early media retry receipt failed");
                    }
                }
            }
            Err(e) => warn!(%message_id, error = %e, "eager audio download attempt failed"),
        }
    }

    if !audio.is_ptt {
        return;
    }

    let media_key = audio.descriptor.media_key.clone().unwrap_or_default();
    session
        .insert_pending_retry(PendingMediaRetry {
            message_id: message_id.to_string(),
            media_key: media_key.clone(),
            is_ptt: true,
            descriptor: audio.descriptor.clone(),
        })
        .await;

    if let Err(e) = session
        .client
        .send_media_retry_receipt(message_id, &media_key)
        .await
    {
        warn!(%message_id, error = %e, "media retry receipt failed; dropping pending entry");
        session.take_pending_retry(message_id).await;
    }
}

/// Handles an inbound `MediaRetry` upstream event: decrypts the
/// notification with the key recorded at eager-download time and, on
/// success, re-downloads from the fresh CDN path.
pub async fn handle_media_retry(session: &Arc<Session>, message_id: &str, ciphertext: &[u8]) {
    let Some(pending) = session.take_pending_retry(message_id).await else {
        return;
    };

    let outcome = match session
        .client
        .decrypt_media_retry(message_id, &pending.media_key, ciphertext)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(%message_id, error = %e, "media retry decrypt failed");
            return;
        }
    };

    let MediaRetryOutcome::Success { new_direct_path } = outcome else {
        warn!(%message_id, "media retry notification reported failure");
        return;
    };
    if new_direct_path.is_empty() {
        warn!(%message_id, "media retry success carried an empty direct_path");
        return;
    }

    let file_enc_sha256 = pending.descriptor.file_enc_sha256.clone().unwrap_or_default();
    let file_sha256 = pending.descriptor.file_sha256.clone().unwrap_or_default();

    match session
        .client
        .download_media_with_path(
            &new_direct_path,
            &file_enc_sha256,
            &file_sha256,
            &pending.media_key,
            "audio",
            "audio",
        )
        .await
    {
        Ok(bytes) if !bytes.is_empty() => {
            session.cache_media(message_id.to_string(), bytes).await;
        }
        Ok(_) => warn!(%message_id, "media retry re-download returned an empty stub"),
        Err(e) => warn!(%message_id, error = %e, "media retry re-download failed"),
    }
}

/// On-demand resolution for `POST /media/download`: serve from cache if
/// present, otherwise retry the download up to 5 times with the specified
/// backoffs.
pub async fn resolve_media_download(
    session: &Session,
    message_id: &str,
    descriptor: &MediaDescriptor,
) -> Result<Vec<u8>, MediaError> {
    if let Some(bytes) = session.take_cached_media(message_id).await {
        return Ok(bytes);
    }

    let (media_kind, mms_type) = descriptor.kind_and_mms_type();
    let direct_path = descriptor.direct_path.clone().unwrap_or_default();
    let file_enc_sha256 = descriptor.file_enc_sha256.clone().unwrap_or_default();
    let file_sha256 = descriptor.file_sha256.clone().unwrap_or_default();
    let media_key = descriptor.media_key.clone().unwrap_or_default();

    for &backoff_ms in ON_DEMAND_BACKOFFS_MS.iter() {
        if backoff_ms > 0 {
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        }
        let result = session
            .client
            .download_media_with_path(
                &direct_path,
                &file_enc_sha256,
                &file_sha256,
                &media_key,
                media_kind,
                mms_type,
            )
            .await;
        if let Ok(bytes) = result
            && !bytes.is_empty()
        {
            return Ok(bytes);
        }
    }

    Err(MediaError::Exhausted)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use proto::UserId;
    use upstream::UpstreamClient;
    use upstream::fake::{FakeUpstreamClient, FakeUpstreamScript};

    use super::*;

    fn resolved_descriptor() -> MediaDescriptor {
        MediaDescriptor {
            direct_path: Some("/v/abc".to_string()),
            media_key: Some("a2V5".to_string()),
            file_enc_sha256: Some("c2hh".to_string()),
            mime_type: Some("audio/ogg".to_string()),
            ..Default::default()
        }
    }

    fn session_with(script: FakeUpstreamScript) -> Session {
        let client: Arc<dyn UpstreamClient> = Arc::new(FakeUpstreamClient::new(script));
        Session::new(UserId::from(1), client, PathBuf::from("/tmp/user_1.db"))
    }

    #[tokio::test]
    async fn resolve_media_download_serves_from_cache_first() {
        let session = session_with(FakeUpstreamScript::default());
        session.cache_media("m1".to_string(), vec![9, 9, 9]).await;

        let bytes = resolve_media_download(&session, "m1", &resolved_descriptor())
            .await
            .expect("should serve from cache");
        assert_eq!(bytes, vec![9, 9, 9]);
        assert!(session.take_cached_media("m1").await.is_none());
    }

    #[tokio::test]
    async fn resolve_media_download_exhausts_after_five_empty_attempts() {
        let session = session_with(FakeUpstreamScript {
            retry_download_results: vec![vec![]],
            ..Default::default()
        });

        let err = resolve_media_download(&session, "m2", &resolved_descriptor())
            .await
            .expect_err("should exhaust retries");
        assert!(matches!(err, MediaError::Exhausted));
    }

    #[tokio::test]
    async fn media_retry_caches_bytes_on_success() {
        let session = Arc::new(session_with(FakeUpstreamScript {
            media_retry_outcome: Some(MediaRetryOutcome::Success {
                new_direct_path: "/v/fresh".to_string(),
            }),
            retry_download_results: vec![vec![1, 2, 3, 4]],
            ..Default::default()
        }));
        session
            .insert_pending_retry(PendingMediaRetry {
                message_id: "m3".to_string(),
                media_key: "a2V5".to_string(),
                is_ptt: true,
                descriptor: resolved_descriptor(),
            })
            .await;

        handle_media_retry(&session, "m3", b"ciphertext").await;

        assert!(session.take_cached_media("m3").await.is_some());
        assert!(!session.has_pending_retry("m3").await);
    }

    #[tokio::test]
    async fn media_retry_with_no_pending_entry_is_ignored() {
        let session = Arc::new(session_with(FakeUpstreamScript::default()));
        handle_media_retry(&session, "unknown", b"x").await;
        assert!(session.take_cached_media("unknown").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn audio_retry_ladder_caches_on_a_later_attempt() {
        let session = session_with(FakeUpstreamScript {
            download_results: vec![vec![], vec![], vec![7, 7, 7]],
            ..Default::default()
        });
        let audio = AudioPayload {
            is_ptt: true,
            descriptor: resolved_descriptor(),
        };

        // The paused clock auto-advances past each scheduled sleep since
        // nothing else is runnable in between attempts.
        run_audio_retry_ladder(&session, "m4", &audio).await;

        assert_eq!(session.take_cached_media("m4").await, Some(vec![7, 7, 7]));
    }

    #[tokio::test(start_paused = true)]
    async fn audio_retry_ladder_schedules_pending_retry_after_exhaustion() {
        let session = session_with(FakeUpstreamScript {
            download_results: vec![vec![]],
            ..Default::default()
        });
        let audio = AudioPayload {
            is_ptt: true,
            descriptor: resolved_descriptor(),
        };

        run_audio_retry_ladder(&session, "m5", &audio).await;

        assert!(session.has_pending_retry("m5").await);
        assert!(session.take_cached_media("m5").await.is_none());
    }
}
