//! ライブ通信のトランスポート実装
//!
//! ## 概要
//!
//! このモジュールは、接続のライフサイクル管理と通信路の境界になる
//! `Transport` trait と、その具体的な実装を提供します。
//!
//! ## 実装
//!
//! - `stomp`: WebSocket 上の STOMP による Pub/Sub (チャット、プレゼンス)
//! - `sse`: HTTP 上の Server-Sent Events によるサーバープッシュ (メトリクス)
//!
//! トランスポートは 1 セッションの開始・受信・送信・終了だけを扱い、
//! 自分で再接続はしません。再接続は
//! [`ConnectionManager`](crate::sync::ConnectionManager) の責務です。

pub mod sse;
pub mod stomp;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;

pub use sse::{SseEvent, SseParser, SseTransport};
pub use stomp::{StompCommand, StompFrame, StompTransport};

/// Keep-alive intervals agreed for one session. `None` disables a direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatTerms {
    pub outgoing: Option<Duration>,
    pub incoming: Option<Duration>,
}

impl HeartbeatTerms {
    pub fn none() -> Self {
        Self::default()
    }
}

/// What a read from the transport produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound<F> {
    /// A decoded frame
    Frame(F),
    /// Peer activity without payload (keep-alive)
    Heartbeat,
}

/// One live connection to a peer.
///
/// All methods are driven from a single task; implementations do not need
/// interior synchronisation.
#[async_trait]
pub trait Transport: Send {
    /// Frames delivered to the synchronizer
    type Frame: Send + 'static;
    /// Frames the synchronizer may send
    type Outbound: Send + 'static;

    /// Open a session. Resolves once the peer acknowledged it.
    ///
    /// Must be cancel-safe: a dropped call keeps the handshake in flight and
    /// the next call resumes it instead of starting over. `close` abandons it.
    async fn open(&mut self) -> Result<HeartbeatTerms, TransportError>;

    /// Wait for the next inbound item. Must be cancel-safe.
    async fn recv(&mut self) -> Result<Inbound<Self::Frame>, TransportError>;

    async fn send(&mut self, frame: Self::Outbound) -> Result<(), TransportError>;

    async fn send_heartbeat(&mut self) -> Result<(), TransportError>;

    /// Release the session. Safe to call when nothing is open.
    async fn close(&mut self);
}
