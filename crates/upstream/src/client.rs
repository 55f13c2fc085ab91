//! Capability interface around the upstream end-to-end-encrypted messaging
//! network.
//!
//! This is the only module allowed to name the upstream protocol library.
//! The Session Manager and Media Acquisition Pipeline depend only on
//! [`UpstreamClient`] / [`UpstreamClientFactory`], so they stay unit-testable
//! against [`crate::fake`] without a real network.

use std::path::Path;

use async_trait::async_trait;
use proto::{Chat, GroupInfo, Jid, MediaDescriptor, PairingEvent, Participant};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors surfaced by the upstream client wrapper.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("store error: {0}")]
    Store(String),
}

/// Structured content of a single inbound message, mirroring the subset of
/// upstream message kinds the fan-out understands (see extraction rules).
#[derive(Debug, Clone)]
pub enum MessageContent {
    Conversation(String),
    ExtendedText(String),
    Image(ImagePayload),
    Audio(AudioPayload),
    Location(LocationPayload),
    LiveLocation(LiveLocationPayload),
    Contact(ContactPayload),
    ContactsArray(Vec<ContactPayload>),
}

#[derive(Debug, Clone, Default)]
pub struct ImagePayload {
    pub caption: Option<String>,
    pub descriptor: MediaDescriptor,
}

#[derive(Debug, Clone, Default)]
pub struct AudioPayload {
    pub is_ptt: bool,
    pub descriptor: MediaDescriptor,
}

#[derive(Debug, Clone, Default)]
pub struct LocationPayload {
    pub latitude: f64,
    pub longitude: f64,
    pub name: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LiveLocationPayload {
    pub latitude: f64,
    pub longitude: f64,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ContactPayload {
    pub contact_name: String,
    pub contact_vcard: String,
}

/// A single inbound message as delivered by the upstream dispatcher, before
/// the fan-out extracts a [`proto::NormalizedPayload`] from it.
#[derive(Debug, Clone)]
pub struct UpstreamMessage {
    pub id: String,
    pub chat_jid: String,
    pub sender_jid: String,
    pub sender_name: String,
    pub timestamp: i64,
    pub is_from_me: bool,
    pub content: MessageContent,
}

/// Outcome of decrypting a `MediaRetry` notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaRetryOutcome {
    Success { new_direct_path: String },
    Failed,
}

/// Events the upstream dispatcher hands to a session's registered handler.
#[derive(Debug, Clone)]
pub enum UpstreamEvent {
    Message(UpstreamMessage),
    /// A request to re-fetch media after the eager download failed.
    MediaRetry {
        message_id: String,
        ciphertext: Vec<u8>,
    },
}

/// Result of a successful `SendMessage` call.
#[derive(Debug, Clone)]
pub struct SendResult {
    pub id: String,
    pub timestamp: i64,
}

/// One upstream-protocol session: owns a device identity and a live (or
/// not-yet-connected) connection to the network.
///
/// Implementations forward one-to-one onto the concrete protocol library;
/// [`crate::fake::FakeUpstreamClient`] is the in-memory stand-in used by
/// tests.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Connects to the network. Implementations must tolerate being called
    /// while already connected by treating it as success.
    async fn connect(&self) -> Result<(), UpstreamError>;

    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// True once a device identity has completed QR pairing.
    fn is_logged_in(&self) -> bool;

    /// The linked phone number, once logged in.
    fn phone_number(&self) -> Option<String>;

    /// Opens a channel of pairing events (`code`, `success`). Only
    /// meaningful while not yet logged in.
    async fn get_qr_channel(&self) -> Result<mpsc::Receiver<PairingEvent>, UpstreamError>;

    async fn send_message(&self, chat_jid: &Jid, text: &str) -> Result<SendResult, UpstreamError>;

    /// Uploads plaintext bytes and returns the descriptor needed to later
    /// reference them (url/direct_path/media_key/sha256 pair/length).
    async fn upload(&self, bytes: &[u8], mime_type: &str) -> Result<MediaDescriptor, UpstreamError>;

    /// Uploads and sends an image in one round-trip.
    async fn send_image(
        &self,
        chat_jid: &Jid,
        bytes: &[u8],
        mime_type: &str,
        caption: &str,
    ) -> Result<SendResult, UpstreamError>;

    /// Uploads and sends an audio clip, `ptt` marking it a voice note.
    async fn send_audio(
        &self,
        chat_jid: &Jid,
        bytes: &[u8],
        mime_type: &str,
        ptt: bool,
        seconds: u32,
    ) -> Result<SendResult, UpstreamError>;

    async fn send_location(
        &self,
        chat_jid: &Jid,
        latitude: f64,
        longitude: f64,
        name: &str,
        address: &str,
    ) -> Result<SendResult, UpstreamError>;

    async fn send_reaction(
        &self,
        chat_jid: &Jid,
        message_id: &str,
        emoji: &str,
    ) -> Result<SendResult, UpstreamError>;

    /// Sends a typing/paused composing indicator.
    async fn send_chat_presence(&self, chat_jid: &Jid, typing: bool) -> Result<(), UpstreamError>;

    async fn list_chats(&self) -> Result<Vec<Chat>, UpstreamError>;

    async fn group_info(&self, group_jid: &Jid) -> Result<GroupInfo, UpstreamError>;

    async fn group_participants(&self, group_jid: &Jid) -> Result<Vec<Participant>, UpstreamError>;

    /// Downloads media referenced by an inbound message's descriptor. A
    /// zero-length success is a valid outcome (the CDN "empty stub") and is
    /// not itself an error.
    async fn download(&self, descriptor: &MediaDescriptor) -> Result<Vec<u8>, UpstreamError>;

    /// Downloads media from a CDN path obtained out-of-band (e.g. via a
    /// `MediaRetry` response), bypassing the originally cached descriptor.
    async fn download_media_with_path(
        &self,
        direct_path: &str,
        file_enc_sha256: &str,
        file_sha256: &str,
        media_key: &str,
        media_kind: &str,
        mms_type: &str,
    ) -> Result<Vec<u8>, UpstreamError>;

    /// Asks the original sender's device to re-upload ciphertext for
    /// `message_id`.
    async fn send_media_retry_receipt(
        &self,
        message_id: &str,
        media_key: &str,
    ) -> Result<(), UpstreamError>;

    /// Decrypts a `MediaRetry` notification using the media key recorded at
    /// eager-download time.
    async fn decrypt_media_retry(
        &self,
        message_id: &str,
        media_key: &str,
        ciphertext: &[u8],
    ) -> Result<MediaRetryOutcome, UpstreamError>;

    /// Registers the session's sole event handler. Called exactly once,
    /// before the client is exposed outside the Session Manager.
    fn add_event_handler(&self, tx: mpsc::UnboundedSender<UpstreamEvent>);
}

/// Builds an [`UpstreamClient`] bound to a per-user device database,
/// configured with the media HTTP transport required by the CDN (see
/// [`crate::media_transport`]).
#[async_trait]
pub trait UpstreamClientFactory: Send + Sync {
    async fn open(
        &self,
        device_db_path: &Path,
        media_http: reqwest::Client,
    ) -> Result<Box<dyn UpstreamClient>, UpstreamError>;
}
