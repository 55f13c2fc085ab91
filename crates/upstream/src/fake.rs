//! In-memory stand-in for the upstream client, used by the Session Manager
//! and Media Acquisition Pipeline test suites.
//!
//! Records every call it receives and lets a test script canned return
//! values ahead of time, so behaviors like "the first three downloads
//! return an empty stub, the fourth returns real bytes" are expressible
//! without a real network.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use proto::{Chat, GroupInfo, Jid, MediaDescriptor, PairingEvent, Participant};
use tokio::sync::mpsc;

use crate::client::{
    MediaRetryOutcome, SendResult, UpstreamClient, UpstreamClientFactory, UpstreamError,
    UpstreamEvent,
};

/// Scripted behavior for a [`FakeUpstreamClient`].
#[derive(Default)]
pub struct FakeUpstreamScript {
    /// Device identity already present at construction time (skips pairing).
    pub has_device_id: bool,
    /// QR codes to emit, in order, followed by a `success`.
    pub qr_codes: Vec<String>,
    /// Successive results for `download()`, consumed in order; once
    /// exhausted the last entry repeats.
    pub download_results: Vec<Vec<u8>>,
    /// Successive results for `download_media_with_path()`.
    pub retry_download_results: Vec<Vec<u8>>,
    /// Outcome `decrypt_media_retry` should report.
    pub media_retry_outcome: Option<MediaRetryOutcome>,
    /// When set, `connect()` fails with this message once, then succeeds.
    pub fail_connect_once: Option<String>,
    /// Chats returned by `list_chats()`.
    pub chats: Vec<Chat>,
    /// Group metadata returned by `group_info()`, keyed by jid.
    pub groups: Vec<(String, GroupInfo)>,
    /// Participants returned by `group_participants()`, keyed by group jid.
    pub participants: Vec<(String, Vec<Participant>)>,
}

#[derive(Default)]
struct FakeState {
    connected: bool,
    logged_in: bool,
    phone_number: Option<String>,
    download_calls: usize,
    retry_download_calls: usize,
    connect_attempts: usize,
    sent_messages: Vec<(String, String)>,
    retry_receipts_sent: Vec<String>,
    typing_calls: Vec<(String, bool)>,
    handler: Option<mpsc::UnboundedSender<UpstreamEvent>>,
}

/// Deterministic, call-recording double for [`UpstreamClient`].
pub struct FakeUpstreamClient {
    script: FakeUpstreamScript,
    state: Mutex<FakeState>,
}

impl FakeUpstreamClient {
    pub fn new(script: FakeUpstreamScript) -> Self {
        let logged_in = script.has_device_id;
        Self {
            script,
            state: Mutex::new(FakeState {
                logged_in,
                ..Default::default()
            }),
        }
    }

    /// Delivers an event directly to the registered handler, simulating the
    /// upstream dispatcher.
    pub fn emit(&self, event: UpstreamEvent) {
        let state = self.state.lock().expect("fake upstream state poisoned");
        if let Some(tx) = &state.handler {
            let _ = tx.send(event);
        }
    }

    pub fn sent_messages(&self) -> Vec<(String, String)> {
        self.state
            .lock()
            .expect("fake upstream state poisoned")
            .sent_messages
            .clone()
    }

    pub fn retry_receipts_sent(&self) -> Vec<String> {
        self.state
            .lock()
            .expect("fake upstream state poisoned")
            .retry_receipts_sent
            .clone()
    }

    pub fn typing_calls(&self) -> Vec<(String, bool)> {
        self.state
            .lock()
            .expect("fake upstream state poisoned")
            .typing_calls
            .clone()
    }

    fn record_send(&self, chat_jid: &Jid, label: &str) -> SendResult {
        let mut state = self.state.lock().expect("fake upstream state poisoned");
        state
            .sent_messages
            .push((chat_jid.as_str().to_string(), label.to_string()));
        SendResult {
            id: format!("fake-msg-{}", state.sent_messages.len()),
            timestamp: state.sent_messages.len() as i64,
        }
    }
}

#[async_trait]
impl UpstreamClient for FakeUpstreamClient {
    async fn connect(&self) -> Result<(), UpstreamError> {
        let mut state = self.state.lock().expect("fake upstream state poisoned");
        state.connect_attempts += 1;
        if let Some(msg) = &self.script.fail_connect_once
            && state.connect_attempts == 1
        {
            return Err(UpstreamError::Connection(msg.clone()));
        }
        state.connected = true;
        Ok(())
    }

    async fn disconnect(&self) {
        self.state.lock().expect("fake upstream state poisoned").connected = false;
    }

    fn is_connected(&self) -> bool {
        self.state.lock().expect("fake upstream state poisoned").connected
    }

    fn is_logged_in(&self) -> bool {
        self.state.lock().expect("fake upstream state poisoned").logged_in
    }

    fn phone_number(&self) -> Option<String> {
        self.state
            .lock()
            .expect("fake upstream state poisoned")
            .phone_number
            .clone()
    }

    async fn get_qr_channel(&self) -> Result<mpsc::Receiver<PairingEvent>, UpstreamError> {
        let (tx, rx) = mpsc::channel(self.script.qr_codes.len().max(1) + 1);
        for code in &self.script.qr_codes {
            let _ = tx.send(PairingEvent::Code(code.clone())).await;
        }
        let _ = tx.send(PairingEvent::Success).await;
        {
            let mut state = self.state.lock().expect("fake upstream state poisoned");
            state.logged_in = true;
            state.phone_number = Some("15555550000".to_string());
        }
        Ok(rx)
    }

    async fn send_message(&self, chat_jid: &Jid, text: &str) -> Result<SendResult, UpstreamError> {
        let mut state = self.state.lock().expect("fake upstream state poisoned");
        state
            .sent_messages
            .push((chat_jid.as_str().to_string(), text.to_string()));
        Ok(SendResult {
            id: format!("fake-msg-{}", state.sent_messages.len()),
            timestamp: state.sent_messages.len() as i64,
        })
    }

    async fn upload(
        &self,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<MediaDescriptor, UpstreamError> {
        Ok(MediaDescriptor {
            mime_type: Some(mime_type.to_string()),
            direct_path: Some("/v/fake-upload".to_string()),
            media_key: Some("ZmFrZS1rZXk=".to_string()),
            file_enc_sha256: Some("ZmFrZS1zaGE=".to_string()),
            file_sha256: Some("ZmFrZS1zaGEy".to_string()),
            file_length: Some(bytes.len() as u64),
            ..Default::default()
        })
    }

    async fn send_image(
        &self,
        chat_jid: &Jid,
        _bytes: &[u8],
        _mime_type: &str,
        caption: &str,
    ) -> Result<SendResult, UpstreamError> {
        Ok(self.record_send(chat_jid, &format!("image:{caption}")))
    }

    async fn send_audio(
        &self,
        chat_jid: &Jid,
        _bytes: &[u8],
        _mime_type: &str,
        ptt: bool,
        seconds: u32,
    ) -> Result<SendResult, UpstreamError> {
        Ok(self.record_send(chat_jid, &format!("audio:ptt={ptt}:s={seconds}")))
    }

    async fn send_location(
        &self,
        chat_jid: &Jid,
        latitude: f64,
        longitude: f64,
        name: &str,
        _address: &str,
    ) -> Result<SendResult, UpstreamError> {
        Ok(self.record_send(chat_jid, &format!("location:{latitude},{longitude},{name}")))
    }

    async fn send_reaction(
        &self,
        chat_jid: &Jid,
        message_id: &str,
        emoji: &str,
    ) -> Result<SendResult, UpstreamError> {
        Ok(self.record_send(chat_jid, &format!("react:{message_id}:{emoji}")))
    }

    async fn send_chat_presence(&self, chat_jid: &Jid, typing: bool) -> Result<(), UpstreamError> {
        self.state
            .lock()
            .expect("fake upstream state poisoned")
            .typing_calls
            .push((chat_jid.as_str().to_string(), typing));
        Ok(())
    }

    async fn list_chats(&self) -> Result<Vec<Chat>, UpstreamError> {
        Ok(self.script.chats.clone())
    }

    async fn group_info(&self, group_jid: &Jid) -> Result<GroupInfo, UpstreamError> {
        self.script
            .groups
            .iter()
            .find(|(jid, _)| jid == group_jid.as_str())
            .map(|(_, info)| info.clone())
            .ok_or_else(|| UpstreamError::RequestFailed("group not found".to_string()))
    }

    async fn group_participants(&self, group_jid: &Jid) -> Result<Vec<Participant>, UpstreamError> {
        Ok(self
            .script
            .participants
            .iter()
            .find(|(jid, _)| jid == group_jid.as_str())
            .map(|(_, p)| p.clone())
            .unwrap_or_default())
    }

    async fn download(&self, _descriptor: &MediaDescriptor) -> Result<Vec<u8>, UpstreamError> {
        let mut state = self.state.lock().expect("fake upstream state poisoned");
        let idx = state.download_calls;
        state.download_calls += 1;
        let results = &self.script.download_results;
        if results.is_empty() {
            return Ok(Vec::new());
        }
        Ok(results[idx.min(results.len() - 1)].clone())
    }

    async fn download_media_with_path(
        &self,
        _direct_path: &str,
        _file_enc_sha256: &str,
        _file_sha256: &str,
        _media_key: &str,
        _media_kind: &str,
        _mms_type: &str,
    ) -> Result<Vec<u8>, UpstreamError> {
        let mut state = self.state.lock().expect("fake upstream state poisoned");
        let idx = state.retry_download_calls;
        state.retry_download_calls += 1;
        let results = &self.script.retry_download_results;
        if results.is_empty() {
            return Ok(Vec::new());
        }
        Ok(results[idx.min(results.len() - 1)].clone())
    }

    async fn send_media_retry_receipt(
        &self,
        message_id: &str,
        _media_key: &str,
    ) -> Result<(), UpstreamError> {
        self.state
            .lock()
            .expect("fake upstream state poisoned")
            .retry_receipts_sent
            .push(message_id.to_string());
        Ok(())
    }

    async fn decrypt_media_retry(
        &self,
        _message_id: &str,
        _media_key: &str,
        _ciphertext: &[u8],
    ) -> Result<MediaRetryOutcome, UpstreamError> {
        Ok(self
            .script
            .media_retry_outcome
            .clone()
            .unwrap_or(MediaRetryOutcome::Failed))
    }

    fn add_event_handler(&self, tx: mpsc::UnboundedSender<UpstreamEvent>) {
        self.state.lock().expect("fake upstream state poisoned").handler = Some(tx);
    }
}

/// Builds [`FakeUpstreamClient`]s from a script, ignoring the requested
/// device-db path beyond recording it for inspection in tests.
pub struct FakeUpstreamClientFactory {
    pub has_device_id: bool,
}

impl FakeUpstreamClientFactory {
    pub fn new(has_device_id: bool) -> Self {
        Self { has_device_id }
    }
}

#[async_trait]
impl UpstreamClientFactory for FakeUpstreamClientFactory {
    async fn open(
        &self,
        _device_db_path: &Path,
        _media_http: reqwest::Client,
    ) -> Result<Box<dyn UpstreamClient>, UpstreamError> {
        Ok(Box::new(FakeUpstreamClient::new(FakeUpstreamScript {
            has_device_id: self.has_device_id,
            ..Default::default()
        })))
    }
}

/// Returns a plausible per-user device database path under `data_dir`,
/// matching the layout `DATA_DIR/user_<U>.db` from the session manager spec.
pub fn device_db_path(data_dir: &Path, user_id: u64) -> PathBuf {
    data_dir.join(format!("user_{user_id}.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_client_records_sent_messages() {
        let client = FakeUpstreamClient::new(FakeUpstreamScript::default());
        client
            .send_message(&Jid::from("1@s.whatsapp.net"), "hi")
            .await
            .expect("send should succeed");
        assert_eq!(
            client.sent_messages(),
            vec![("1@s.whatsapp.net".to_string(), "hi".to_string())]
        );
    }

    #[tokio::test]
    async fn fake_client_download_results_are_consumed_in_order() {
        let client = FakeUpstreamClient::new(FakeUpstreamScript {
            download_results: vec![vec![], vec![], vec![1, 2, 3]],
            ..Default::default()
        });
        let descriptor = MediaDescriptor::default();
        assert!(client.download(&descriptor).await.unwrap().is_empty());
        assert!(client.download(&descriptor).await.unwrap().is_empty());
        assert_eq!(client.download(&descriptor).await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn fake_client_looks_up_group_info_by_jid() {
        let client = FakeUpstreamClient::new(FakeUpstreamScript {
            groups: vec![(
                "120363@g.us".to_string(),
                GroupInfo {
                    jid: "120363@g.us".to_string(),
                    name: "Crew".to_string(),
                    owner_jid: "1@s.whatsapp.net".to_string(),
                    participant_count: 3,
                },
            )],
            ..Default::default()
        });
        let info = client
            .group_info(&Jid::from("120363@g.us"))
            .await
            .expect("group should be found");
        assert_eq!(info.name, "Crew");
        assert!(client.group_info(&Jid::from("unknown@g.us")).await.is_err());
    }

    #[tokio::test]
    async fn fake_client_records_typing_calls() {
        let client = FakeUpstreamClient::new(FakeUpstreamScript::default());
        client
            .send_chat_presence(&Jid::from("1@s.whatsapp.net"), true)
            .await
            .unwrap();
        assert_eq!(
            client.typing_calls(),
            vec![("1@s.whatsapp.net".to_string(), true)]
        );
    }

    #[tokio::test]
    async fn fake_client_connect_tolerates_scripted_single_failure() {
        let client = FakeUpstreamClient::new(FakeUpstreamScript {
            fail_connect_once: Some("already connecting".to_string()),
            ..Default::default()
        });
        assert!(client.connect().await.is_err());
        assert!(client.connect().await.is_ok());
        assert!(client.is_connected());
    }
}
