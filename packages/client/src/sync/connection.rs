//! 1 本のトランスポート接続のライフサイクル管理
//!
//! ## 責務
//!
//! - 状態遷移 (Disconnected / Connecting / Connected / Reconnecting / Closed)
//! - 接続中の双方向ハートビート
//! - 通信エラー後の固定間隔での再接続
//! - タイマーを残さない、冪等な切断処理
//!
//! マネージャは [`ConnectionManager::next_event`] で駆動されます。
//! 接続タイムアウト・ハートビート・再接続待ちはすべて `self` に保持した期限
//! (deadline) として `next_event` の中でポーリングされるため、バックグラウンド
//! で動くタスクはなく、マネージャを破棄または切断すればすべて解除されます。

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, sleep_until, timeout_at};

use crate::config::ConnectionConfig;
use crate::error::{RejectReason, SyncError, TransportError};
use crate::transport::{HeartbeatTerms, Inbound, Transport};

use super::{ConnectionState, ReconnectPolicy};

/// Output of [`ConnectionManager::next_event`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent<F> {
    StateChanged(ConnectionState),
    Frame(F),
}

/// Heartbeat bookkeeping for one established session
struct Session {
    terms: HeartbeatTerms,
    grace: u32,
    last_sent: Instant,
    last_seen: Instant,
}

impl Session {
    fn new(terms: HeartbeatTerms, grace: u32) -> Self {
        let now = Instant::now();
        Self {
            terms,
            grace: grace.max(1),
            last_sent: now,
            last_seen: now,
        }
    }

    fn heartbeat_due(&self) -> Option<Instant> {
        self.terms.outgoing.map(|interval| self.last_sent + interval)
    }

    fn silence_limit(&self) -> Option<Duration> {
        self.terms.incoming.map(|interval| interval * self.grace)
    }

    fn peer_deadline(&self) -> Option<Instant> {
        self.silence_limit().map(|limit| self.last_seen + limit)
    }
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Owns one transport and its lifecycle state.
pub struct ConnectionManager<T: Transport> {
    name: String,
    transport: T,
    policy: ReconnectPolicy,
    connect_timeout: Duration,
    heartbeat_grace: u32,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    notifications: VecDeque<ConnectionState>,
    session: Option<Session>,
    connect_deadline: Option<Instant>,
    retry_at: Option<Instant>,
    failures: u32,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(name: impl Into<String>, transport: T, config: &ConnectionConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            name: name.into(),
            transport,
            policy: config.reconnect,
            connect_timeout: config.connect_timeout,
            heartbeat_grace: config.heartbeat.grace,
            state: ConnectionState::Disconnected,
            state_tx,
            notifications: VecDeque::new(),
            session: None,
            connect_deadline: None,
            retry_at: None,
            failures: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Observe state changes from elsewhere (UI, tests).
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// True while a reconnect is scheduled.
    pub fn has_pending_retry(&self) -> bool {
        self.retry_at.is_some()
    }

    /// Consecutive failures since the last successful open.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Start connecting. The handshake itself runs inside `next_event`.
    ///
    /// No-op unless `Disconnected`; refused once `Closed`.
    pub fn connect(&mut self) -> Result<(), SyncError> {
        match self.state {
            ConnectionState::Closed => Err(SyncError::OperationRejected(RejectReason::Closed)),
            ConnectionState::Disconnected => {
                tracing::info!("[{}] Connecting", self.name);
                self.transition(ConnectionState::Connecting);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Drive the connection until something observable happens.
    ///
    /// Returns `None` once the connection is idle (`Disconnected`) or torn down
    /// (`Closed`). Cancel-safe: dropping the future loses no frame and keeps
    /// every deadline, including the connect timeout of a handshake in flight.
    pub async fn next_event(&mut self) -> Option<ConnectionEvent<T::Frame>> {
        loop {
            if let Some(state) = self.notifications.pop_front() {
                return Some(ConnectionEvent::StateChanged(state));
            }
            match self.state {
                ConnectionState::Disconnected | ConnectionState::Closed => return None,
                ConnectionState::Connecting => self.open_session().await,
                ConnectionState::Reconnecting => {
                    if let Some(retry_at) = self.retry_at {
                        sleep_until(retry_at).await;
                    }
                    self.retry_at = None;
                    tracing::info!("[{}] Reconnecting (attempt {})", self.name, self.failures + 1);
                    self.transition(ConnectionState::Connecting);
                }
                ConnectionState::Connected => {
                    if let Some(frame) = self.pump().await {
                        return Some(ConnectionEvent::Frame(frame));
                    }
                }
            }
        }
    }

    /// Send one frame on the live session.
    ///
    /// Refused unless `Connected`. A write failure is treated like any other
    /// transport failure (reconnect) and also returned to the caller; the frame
    /// is not queued for later.
    pub async fn send(&mut self, frame: T::Outbound) -> Result<(), SyncError> {
        match self.state {
            ConnectionState::Connected => {}
            ConnectionState::Closed => {
                return Err(SyncError::OperationRejected(RejectReason::Closed));
            }
            _ => return Err(SyncError::OperationRejected(RejectReason::NotConnected)),
        }

        match self.transport.send(frame).await {
            Ok(()) => {
                if let Some(session) = self.session.as_mut() {
                    session.last_sent = Instant::now();
                }
                Ok(())
            }
            Err(error) => {
                self.fail(&error).await;
                Err(error.into())
            }
        }
    }

    /// Tear down for good. Idempotent.
    ///
    /// The state moves to `Closed` and the pending retry is dropped before the
    /// transport is closed, so a cancelled call still leaves nothing armed.
    pub async fn disconnect(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        tracing::info!("[{}] Disconnecting", self.name);
        self.retry_at = None;
        self.connect_deadline = None;
        self.session = None;
        self.notifications.clear();
        self.transition(ConnectionState::Closed);
        self.transport.close().await;
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        tracing::debug!("[{}] {} -> {}", self.name, self.state, next);
        self.state = next;
        self.state_tx.send_replace(next);
        self.notifications.push_back(next);
    }

    async fn open_session(&mut self) {
        let deadline = match self.connect_deadline {
            Some(deadline) => deadline,
            None => {
                let deadline = Instant::now() + self.connect_timeout;
                self.connect_deadline = Some(deadline);
                deadline
            }
        };
        let result = match timeout_at(deadline, self.transport.open()).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.connect_timeout)),
        };
        self.connect_deadline = None;
        match result {
            Ok(terms) => {
                tracing::info!("[{}] Connected", self.name);
                tracing::debug!("[{}] Heartbeat terms: {:?}", self.name, terms);
                self.session = Some(Session::new(terms, self.heartbeat_grace));
                self.failures = 0;
                self.transition(ConnectionState::Connected);
            }
            Err(error) => self.fail(&error).await,
        }
    }

    /// Wait for one inbound frame while servicing both heartbeat timers.
    async fn pump(&mut self) -> Option<T::Frame> {
        let Some(session) = self.session.as_ref() else {
            self.fail(&TransportError::Closed).await;
            return None;
        };
        let heartbeat_due = session.heartbeat_due();
        let peer_deadline = session.peer_deadline();
        let silence_limit = session.silence_limit().unwrap_or_default();

        tokio::select! {
            biased;

            inbound = self.transport.recv() => match inbound {
                Ok(inbound) => {
                    if let Some(session) = self.session.as_mut() {
                        session.last_seen = Instant::now();
                    }
                    match inbound {
                        Inbound::Frame(frame) => Some(frame),
                        Inbound::Heartbeat => {
                            tracing::trace!("[{}] Heartbeat received", self.name);
                            None
                        }
                    }
                }
                Err(error) => {
                    self.fail(&error).await;
                    None
                }
            },
            () = sleep_until_some(peer_deadline) => {
                self.fail(&TransportError::HeartbeatTimeout(silence_limit)).await;
                None
            }
            () = sleep_until_some(heartbeat_due) => {
                match self.transport.send_heartbeat().await {
                    Ok(()) => {
                        if let Some(session) = self.session.as_mut() {
                            session.last_sent = Instant::now();
                        }
                    }
                    Err(error) => self.fail(&error).await,
                }
                None
            }
        }
    }

    async fn fail(&mut self, error: &TransportError) {
        self.session = None;
        self.connect_deadline = None;
        self.failures = self.failures.saturating_add(1);
        match self.policy.next_delay(self.failures) {
            Some(delay) => {
                tracing::warn!(
                    "[{}] Connection lost: {}. Retrying in {:?}",
                    self.name,
                    error,
                    delay
                );
                self.retry_at = Some(Instant::now() + delay);
                self.transition(ConnectionState::Reconnecting);
            }
            None => {
                tracing::warn!("[{}] Connection lost: {}", self.name, error);
                self.retry_at = None;
                self.transition(ConnectionState::Disconnected);
            }
        }
        self.transport.close().await;
    }
}

impl<T: Transport> Drop for ConnectionManager<T> {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            self.retry_at = None;
            self.connect_deadline = None;
            self.state = ConnectionState::Closed;
            self.state_tx.send_replace(ConnectionState::Closed);
        }
    }
}
