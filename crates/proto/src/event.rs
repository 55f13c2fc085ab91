use serde::{Deserialize, Serialize};

use crate::message::NormalizedPayload;

/// Discriminator tag on the `/events` SSE envelope.
pub const MESSAGE_EVENT_KIND: &str = "message";

/// Wire envelope written as the `data:` line of a `message` SSE frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: NormalizedPayload,
}

impl MessageEnvelope {
    pub fn new(payload: NormalizedPayload) -> Self {
        Self {
            kind: MESSAGE_EVENT_KIND.to_string(),
            payload,
        }
    }
}

/// Pairing pump events, forwarded from the upstream client's QR event
/// stream onto a session's `qr_codes` queue and `login_done` latch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingEvent {
    /// A QR string the caller should render/scan.
    Code(String),
    /// The device finished linking.
    Success,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_envelope_new_sets_discriminator() {
        let payload = NormalizedPayload {
            id: "m1".into(),
            chat_jid: "c@s.whatsapp.net".into(),
            sender_jid: "s@s.whatsapp.net".into(),
            timestamp: 10,
            ..Default::default()
        };
        let envelope = MessageEnvelope::new(payload);
        assert_eq!(envelope.kind, MESSAGE_EVENT_KIND);
    }

    #[test]
    fn pairing_event_variants_are_distinct() {
        assert_ne!(PairingEvent::Code("ABC".into()), PairingEvent::Success);
    }
}
