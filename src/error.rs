//! Crate-level error taxonomy.
//!
//! One variant per error kind named in the overlay's error-handling design.
//! Wire-level failures (malformed datagrams, transient socket errors,
//! send-queue overflow) are absorbed at the point they occur and logged via
//! `tracing` rather than surfaced through this type — see the listener and
//! sender loops.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, OverlayError>;

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("operation invoked on a listener before Start")]
    NotStarted,

    #[error("connect request used a transport address type this listener cannot serve")]
    WrongTaType,

    #[error("transport address authorizer denied this endpoint")]
    Unauthorized,

    #[error("send attempted on a closed edge")]
    EdgeClosed,

    #[error("malformed datagram: {reason}")]
    MalformedDatagram { reason: String },

    #[error("transient socket error")]
    SocketTransient(#[from] std::io::Error),

    #[error("Start called twice on the same listener")]
    RestartAttempted,
}
