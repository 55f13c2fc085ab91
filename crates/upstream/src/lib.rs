//! Capability interface around the upstream end-to-end-encrypted messaging
//! network, plus the media HTTP transport and an in-memory fake used across
//! the workspace's test suites.

pub mod client;
pub mod fake;
pub mod media_transport;

pub use client::{
    AudioPayload, ContactPayload, ImagePayload, LiveLocationPayload, LocationPayload,
    MediaRetryOutcome, MessageContent, SendResult, UpstreamClient, UpstreamClientFactory,
    UpstreamError, UpstreamEvent, UpstreamMessage,
};
pub use media_transport::{MediaTransportError, build_media_client};
