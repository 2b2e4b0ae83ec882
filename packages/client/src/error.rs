//! Error types for the synchronizer.

use std::time::Duration;

use thiserror::Error;

/// Failure of a live transport (connection drop, handshake failure, heartbeat
/// timeout).
///
/// These are recovered by the reconnect policy and only ever surface to the
/// view as a connection state change.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Establishing the connection failed
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    /// The peer refused the session (STOMP ERROR frame, non-stream HTTP reply)
    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),

    /// The handshake did not finish in time
    #[error("Connect timed out after {0:?}")]
    Timeout(Duration),

    /// No frame or heartbeat from the peer within the grace window
    #[error("No heartbeat from peer within {0:?}")]
    HeartbeatTimeout(Duration),

    /// The peer closed the connection
    #[error("Connection closed by peer")]
    Closed,

    /// WebSocket level failure
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// HTTP level failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// An inbound payload that could not be decoded.
///
/// The offending frame is dropped; later frames are unaffected.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The wire frame itself is malformed
    #[error("Malformed frame: {0}")]
    Frame(String),

    /// The frame body is not the expected JSON entity
    #[error("Invalid {entity} payload: {source}")]
    Payload {
        entity: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl ParseError {
    pub(crate) fn payload(entity: &'static str, source: serde_json::Error) -> Self {
        Self::Payload { entity, source }
    }
}

/// Why an outbound operation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The connection is not in the `Connected` state
    NotConnected,
    /// No local identity has been set with `join`
    MissingIdentity,
    /// The identity or message text is blank
    EmptyInput,
    /// The synchronizer was torn down
    Closed,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected"),
            Self::MissingIdentity => write!(f, "no identity set, join first"),
            Self::EmptyInput => write!(f, "input is empty"),
            Self::Closed => write!(f, "connection closed"),
        }
    }
}

/// Synchronizer errors surfaced to callers.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Broker reported an error frame
    #[error("Broker reported error: {0}")]
    Protocol(String),

    /// Inbound payload could not be decoded
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Operation refused in the current state
    #[error("Operation rejected: {0}")]
    OperationRejected(RejectReason),

    /// One-shot baseline request failed
    #[error("Baseline request failed: {0}")]
    Baseline(#[from] reqwest::Error),
}

impl SyncError {
    /// Returns the rejection reason if this is an `OperationRejected` error.
    pub fn rejection(&self) -> Option<RejectReason> {
        match self {
            Self::OperationRejected(reason) => Some(*reason),
            _ => None,
        }
    }
}
