//! Shared protocol types for the session manager, media pipeline, upstream
//! client wrapper, and HTTP surface.
//!
//! This crate defines the serializable domain model and the strongly-typed
//! error enums shared across the workspace. It names no transport and no
//! concrete upstream client.

pub mod error;
pub mod event;
pub mod message;

/// Re-export of all protocol error types.
pub use error::*;
/// Re-export of inbound event and SSE envelope types.
pub use event::{MESSAGE_EVENT_KIND, MessageEnvelope, PairingEvent};
/// Re-export of identifiers and the normalized message/domain model.
pub use message::{
    Chat, GroupInfo, Jid, MediaDescriptor, MediaType, NormalizedPayload, Participant,
    PendingMediaRetry, UserId,
};
