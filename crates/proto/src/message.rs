use serde::{Deserialize, Serialize};

/// Opaque positive-integer tenant key supplied by the caller.
///
/// Acts as the tenant key for all session state; `0` is never valid and is
/// rejected at the HTTP boundary before a `UserId` is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl UserId {
    /// Returns the raw numeric id.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UserId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// A protocol-native addressable identifier, e.g. `1555@s.whatsapp.net` or
/// `120363@g.us`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Jid(pub String);

impl Jid {
    /// Returns the raw jid string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A jid ending in `@g.us` addresses a group rather than a single user.
    pub fn is_group(&self) -> bool {
        self.0.ends_with("@g.us")
    }
}

impl std::fmt::Display for Jid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Jid {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Jid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Discriminator for the content carried by a normalized message payload.
///
/// Plain text carries no discriminator (`media_type` is absent on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Audio,
    Ptt,
    Location,
    LiveLocation,
    Contact,
}

/// Fields needed to (re)issue a media download, carried both on inbound
/// normalized payloads and on `/media/download` requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaDescriptor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_path: Option<String>,
    /// Base64-encoded media decryption key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_key: Option<String>,
    /// Base64-encoded SHA-256 of the ciphertext.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_enc_sha256: Option<String>,
    /// Base64-encoded SHA-256 of the plaintext.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_length: Option<u64>,
    #[serde(default)]
    pub is_ptt: bool,
}

impl MediaDescriptor {
    /// A descriptor is resolved once the CDN has a location and the keys
    /// needed to decrypt it are present.
    pub fn is_resolved(&self) -> bool {
        let has_location = self.direct_path.as_deref().is_some_and(|s| !s.is_empty())
            || self.url.as_deref().is_some_and(|s| !s.is_empty());
        let has_key = self.media_key.as_deref().is_some_and(|s| !s.is_empty());
        let has_enc_sha = self
            .file_enc_sha256
            .as_deref()
            .is_some_and(|s| !s.is_empty());
        has_location && has_key && has_enc_sha
    }

    /// Picks `(media_kind, mms_type)` from the mime prefix, per the on-demand
    /// download path. PTT audio still reports `mms_type = "audio"`.
    pub fn kind_and_mms_type(&self) -> (&'static str, &'static str) {
        match self.mime_type.as_deref() {
            Some(m) if m.starts_with("audio/") => ("audio", "audio"),
            Some(m) if m.starts_with("video/") => ("video", "video"),
            Some(m) if m.starts_with("image/") => ("image", "image"),
            _ => ("document", "document"),
        }
    }
}

/// A single-attempt, per-message correlation record bridging an eager media
/// download failure to a later `MediaRetry` response from the upstream
/// network.
#[derive(Debug, Clone)]
pub struct PendingMediaRetry {
    pub message_id: String,
    pub media_key: String,
    pub is_ptt: bool,
    pub descriptor: MediaDescriptor,
}

/// Normalized, content-typed record emitted for every inbound message the
/// fan-out decides to surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizedPayload {
    pub id: String,
    pub chat_jid: String,
    pub sender_jid: String,
    #[serde(default)]
    pub sender_name: String,
    pub timestamp: i64,
    pub is_from_me: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_enc_sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_length: Option<u64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_ptt: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_vcard: Option<String>,
}

impl NormalizedPayload {
    /// A payload is worth emitting iff it carries at least one non-empty
    /// content field beyond the common envelope.
    pub fn has_content(&self) -> bool {
        self.text.as_deref().is_some_and(|s| !s.is_empty())
            || self.media_type.is_some()
            || self.latitude.is_some()
            || self.contact_name.as_deref().is_some_and(|s| !s.is_empty())
    }

}

/// A single chat entry as returned by `GET /chats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub jid: String,
    pub name: String,
    pub is_group: bool,
}

/// Group metadata as returned by `GET /groups/info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupInfo {
    pub jid: String,
    pub name: String,
    pub owner_jid: String,
    pub participant_count: usize,
}

/// A single group member as returned by `GET /groups/participants`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub jid: String,
    pub is_admin: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_round_trips_display() {
        let id = UserId::from(42u64);
        assert_eq!(id.to_string(), "42");
        assert_eq!(id.as_u64(), 42);
    }

    #[test]
    fn jid_is_group_detects_g_us_suffix() {
        assert!(Jid::from("12345@g.us").is_group());
        assert!(!Jid::from("12345@s.whatsapp.net").is_group());
    }

    #[test]
    fn media_descriptor_is_resolved_requires_location_key_and_sha() {
        let mut desc = MediaDescriptor::default();
        assert!(!desc.is_resolved());

        desc.direct_path = Some("/v/abc".to_string());
        desc.media_key = Some("a2V5".to_string());
        desc.file_enc_sha256 = Some("c2hh".to_string());
        assert!(desc.is_resolved());
    }

    #[test]
    fn media_descriptor_kind_from_mime_prefix() {
        let mut desc = MediaDescriptor::default();
        desc.mime_type = Some("audio/ogg; codecs=opus".to_string());
        assert_eq!(desc.kind_and_mms_type(), ("audio", "audio"));

        desc.mime_type = Some("image/jpeg".to_string());
        assert_eq!(desc.kind_and_mms_type(), ("image", "image"));

        desc.mime_type = Some("application/pdf".to_string());
        assert_eq!(desc.kind_and_mms_type(), ("document", "document"));
    }

    #[test]
    fn normalized_payload_has_content_requires_non_empty_field() {
        let mut payload = NormalizedPayload {
            id: "m1".into(),
            chat_jid: "c@s.whatsapp.net".into(),
            sender_jid: "s@s.whatsapp.net".into(),
            timestamp: 1,
            ..Default::default()
        };
        assert!(!payload.has_content());

        payload.text = Some("hello".to_string());
        assert!(payload.has_content());
    }
}
