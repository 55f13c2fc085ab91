//! Inbound Event Fan-Out: translates upstream messages into normalized
//! payloads and enqueues them for SSE delivery (spec §4.3).

use proto::{MediaType, NormalizedPayload};
use upstream::{MessageContent, UpstreamMessage};

use crate::media;
use crate::session::Session;

fn base_payload(msg: &UpstreamMessage) -> NormalizedPayload {
    NormalizedPayload {
        id: msg.id.clone(),
        chat_jid: msg.chat_jid.clone(),
        sender_jid: msg.sender_jid.clone(),
        sender_name: msg.sender_name.clone(),
        timestamp: msg.timestamp,
        is_from_me: msg.is_from_me,
        ..Default::default()
    }
}

/// Applies the extraction rules of spec §4.3, returning every payload this
/// message should emit (zero for most non-content shapes, more than one for
/// a contacts array).
fn extract_payloads(msg: &UpstreamMessage) -> Vec<NormalizedPayload> {
    let mut payload = base_payload(msg);

    match &msg.content {
        MessageContent::Conversation(text) | MessageContent::ExtendedText(text) => {
            payload.text = Some(text.clone());
        }
        MessageContent::Image(image) => {
            payload.media_type = Some(MediaType::Image);
            payload.caption = image.caption.clone();
            payload.mime_type = image.descriptor.mime_type.clone();
            payload.url = image.descriptor.url.clone();
            payload.direct_path = image.descriptor.direct_path.clone();
            payload.media_key = image.descriptor.media_key.clone();
            payload.file_enc_sha256 = image.descriptor.file_enc_sha256.clone();
            payload.file_sha256 = image.descriptor.file_sha256.clone();
            payload.file_length = image.descriptor.file_length;
        }
        MessageContent::Audio(audio) => {
            payload.media_type = Some(if audio.is_ptt {
                MediaType::Ptt
            } else {
                MediaType::Audio
            });
            payload.is_ptt = audio.is_ptt;
            payload.mime_type = audio.descriptor.mime_type.clone();
            payload.url = audio.descriptor.url.clone();
            payload.direct_path = audio.descriptor.direct_path.clone();
            payload.media_key = audio.descriptor.media_key.clone();
            payload.file_enc_sha256 = audio.descriptor.file_enc_sha256.clone();
            payload.file_sha256 = audio.descriptor.file_sha256.clone();
            payload.file_length = audio.descriptor.file_length;
        }
        MessageContent::Location(loc) => {
            payload.media_type = Some(MediaType::Location);
            payload.latitude = Some(loc.latitude);
            payload.longitude = Some(loc.longitude);
            payload.address = loc.address.clone();
            payload.text = location_text(loc.name.as_deref(), loc.address.as_deref());
        }
        MessageContent::LiveLocation(loc) => {
            payload.media_type = Some(MediaType::LiveLocation);
            payload.latitude = Some(loc.latitude);
            payload.longitude = Some(loc.longitude);
            payload.caption = loc.caption.clone();
        }
        MessageContent::Contact(contact) => {
            payload.media_type = Some(MediaType::Contact);
            payload.contact_name = Some(contact.contact_name.clone());
            payload.contact_vcard = Some(contact.contact_vcard.clone());
        }
        MessageContent::ContactsArray(contacts) => {
            // The enclosing payload is never emitted; one payload per
            // contact is, each carrying the parent message id.
            return contacts
                .iter()
                .map(|contact| {
                    let mut p = base_payload(msg);
                    p.media_type = Some(MediaType::Contact);
                    p.contact_name = Some(contact.contact_name.clone());
                    p.contact_vcard = Some(contact.contact_vcard.clone());
                    p
                })
                .collect();
        }
    }

    vec![payload]
}

/// Formats location text as `"{name} - {address}"`, falling back to
/// whichever of the two is present.
fn location_text(name: Option<&str>, address: Option<&str>) -> Option<String> {
    match (name, address) {
        (Some(name), Some(address)) if !name.is_empty() && !address.is_empty() => {
            Some(format!("{name} - {address}"))
        }
        (Some(name), _) if !name.is_empty() => Some(name.to_string()),
        (_, Some(address)) if !address.is_empty() => Some(address.to_string()),
        _ => None,
    }
}

/// Handles one inbound upstream message: extracts normalized payload(s),
/// triggers eager media downloads, and enqueues every payload that carries
/// content.
pub fn handle_upstream_message(session: &std::sync::Arc<Session>, msg: UpstreamMessage) {
    if let MessageContent::Image(image) = &msg.content {
        media::spawn_eager_image_download(session.clone(), msg.id.clone(), image.descriptor.clone());
    }
    if let MessageContent::Audio(audio) = &msg.content {
        media::spawn_eager_audio_download(session.clone(), msg.id.clone(), audio.clone());
    }

    for payload in extract_payloads(&msg) {
        if payload.has_content() {
            session.enqueue_event(payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use upstream::{ContactPayload, LocationPayload};

    use super::*;

    fn sample_message(content: MessageContent) -> UpstreamMessage {
        UpstreamMessage {
            id: "m1".to_string(),
            chat_jid: "c@s.whatsapp.net".to_string(),
            sender_jid: "s@s.whatsapp.net".to_string(),
            sender_name: "Alice".to_string(),
            timestamp: 1234,
            is_from_me: false,
            content,
        }
    }

    #[test]
    fn conversation_text_maps_to_text_payload() {
        let payloads = extract_payloads(&sample_message(MessageContent::Conversation(
            "hello".to_string(),
        )));
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].text.as_deref(), Some("hello"));
        assert!(payloads[0].has_content());
    }

    #[test]
    fn location_text_prefers_name_and_address_combined() {
        let text = location_text(Some("Cafe"), Some("123 Main St"));
        assert_eq!(text.as_deref(), Some("Cafe - 123 Main St"));
        assert_eq!(location_text(Some("Cafe"), None).as_deref(), Some("Cafe"));
        assert_eq!(
            location_text(None, Some("123 Main St")).as_deref(),
            Some("123 Main St")
        );
        assert_eq!(location_text(None, None), None);
    }

    #[test]
    fn contacts_array_splits_into_one_payload_per_contact() {
        let payloads = extract_payloads(&sample_message(MessageContent::ContactsArray(vec![
            ContactPayload {
                contact_name: "A".to_string(),
                contact_vcard: "VCARD-A".to_string(),
            },
            ContactPayload {
                contact_name: "B".to_string(),
                contact_vcard: "VCARD-B".to_string(),
            },
        ])));
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0].contact_name.as_deref(), Some("A"));
        assert_eq!(payloads[1].contact_name.as_deref(), Some("B"));
        assert!(payloads.iter().all(|p| p.id == "m1"));
    }

    #[test]
    fn location_without_name_or_address_has_no_text_but_still_has_content() {
        let payloads = extract_payloads(&sample_message(MessageContent::Location(LocationPayload {
            latitude: 1.0,
            longitude: 2.0,
            name: None,
            address: None,
        })));
        assert_eq!(payloads[0].text, None);
        assert!(payloads[0].has_content());
    }
}
