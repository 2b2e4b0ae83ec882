//! Live-state synchronizer library.
//!
//! Keeps a client-side view consistent with server state delivered over two
//! real-time transports: chat rooms over STOMP (WebSocket) and a metrics feed
//! over server-sent events. Each view merges a one-shot REST baseline with
//! the live stream, survives reconnects, and bounds what it keeps in memory.

// building blocks
pub mod config;
pub mod error;
pub mod sync;
pub mod transport;
pub mod types;

// synchronizers
pub mod baseline;
pub mod chat;
pub mod metrics;

// cli
pub mod formatter;
pub mod runner;
mod ui;

#[cfg(test)]
pub(crate) mod testing;

pub use chat::{ChatEvent, ChatRoom};
pub use error::{ParseError, RejectReason, SyncError, TransportError};
pub use metrics::{MetricsEvent, MetricsFeed};
pub use sync::ConnectionState;
