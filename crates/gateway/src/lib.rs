//! Session Manager, Pairing Pipeline, Inbound Event Fan-Out, and Media
//! Acquisition Pipeline — the core subsystems fronting the upstream
//! end-to-end-encrypted messaging network.

pub mod backup;
pub mod config;
pub mod dispatch;
pub mod fanout;
pub mod manager;
pub mod media;
pub mod pairing;
pub mod session;

pub use config::GatewayConfig;
pub use manager::{SessionManager, SessionManagerConfig};
pub use pairing::{
    PairingTrigger, QR_STREAM_TIMEOUT, QrFrame, next_qr_frame, qr_stream_deadline, trigger_pairing,
};
pub use session::{EVENT_QUEUE_CAPACITY, QR_QUEUE_CAPACITY, Session};
