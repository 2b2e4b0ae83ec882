//! チャットルームの同期を行うモジュール
//!
//! ## 責務
//!
//! - ルームのメッセージトピックとプレゼンストピックを購読する。(再)接続のたびに、
//!   新しいセッションのフレームを処理する前に購読し直す
//! - ライブメッセージを [`HistoryMerger`] に、ロスターを [`PresenceTracker`] に反映する
//! - 履歴ベースラインの取得は `join` の後にのみ許可する
//! - 参加通知とチャットメッセージを送信する。送信できない場合は黙って捨てずにエラーを返す

use std::collections::VecDeque;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::watch;

use crate::config::ConnectionConfig;
use crate::error::{ParseError, RejectReason, SyncError};
use crate::sync::{
    ConnectionEvent, ConnectionManager, ConnectionState, DedupPolicy, HistoryMerger,
    PresenceTracker, SubscriptionHandle, SubscriptionRegistry, Unsubscribed,
};
use crate::transport::{StompCommand, StompFrame, Transport};
use crate::types::{ChatMessage, JoinAnnouncement, PresenceSnapshot};

pub fn chat_topic(room_id: &str) -> String {
    format!("/topic/chat/{}", room_id)
}

pub fn presence_topic(room_id: &str) -> String {
    format!("/topic/presence/{}", room_id)
}

pub fn join_destination(room_id: &str) -> String {
    format!("/app/chat/join/{}", room_id)
}

pub fn send_destination(room_id: &str) -> String {
    format!("/app/chat/{}", room_id)
}

/// Callback for frames on a channel registered with [`ChatRoom::subscribe`].
pub type FrameHandler = Box<dyn FnMut(&StompFrame) + Send>;

enum Route {
    Messages,
    Presence,
    Custom(FrameHandler),
}

/// Something the view should react to.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    StateChanged(ConnectionState),
    Message(ChatMessage),
    Presence(PresenceSnapshot),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BaselineGate {
    /// No identity yet
    Closed,
    /// Joined, fetch not issued
    Ready,
    InFlight,
    Seeded,
}

/// Live view of one chat room.
pub struct ChatRoom<T>
where
    T: Transport<Frame = StompFrame, Outbound = StompFrame>,
{
    room_id: String,
    connection: ConnectionManager<T>,
    registry: SubscriptionRegistry<Route>,
    history: HistoryMerger<ChatMessage>,
    presence: PresenceTracker,
    identity: Option<String>,
    outbox: VecDeque<StompFrame>,
    events: VecDeque<ChatEvent>,
    gate: BaselineGate,
}

impl<T> ChatRoom<T>
where
    T: Transport<Frame = StompFrame, Outbound = StompFrame>,
{
    pub fn new(room_id: impl Into<String>, transport: T, config: &ConnectionConfig) -> Self {
        let room_id = room_id.into();
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(chat_topic(&room_id), Route::Messages);
        registry.subscribe(presence_topic(&room_id), Route::Presence);

        Self {
            connection: ConnectionManager::new(format!("chat:{}", room_id), transport, config),
            room_id,
            registry,
            history: HistoryMerger::default(),
            presence: PresenceTracker::new(),
            identity: None,
            outbox: VecDeque::new(),
            events: VecDeque::new(),
            gate: BaselineGate::Closed,
        }
    }

    /// Choose how baseline and live messages are merged. Only before seeding.
    pub fn with_dedup(mut self, policy: DedupPolicy) -> Self {
        if !self.history.is_seeded() {
            self.history = HistoryMerger::new(policy);
        }
        self
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Merged message view: baseline first, then live arrivals
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.history.view()
    }

    pub fn presence(&self) -> &PresenceSnapshot {
        self.presence.current()
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch_state()
    }

    /// Channels with a live wire subscription
    pub fn active_subscriptions(&self) -> Vec<String> {
        self.registry.channels()
    }

    pub fn has_pending_reconnect(&self) -> bool {
        self.connection.has_pending_retry()
    }

    pub fn connect(&mut self) -> Result<(), SyncError> {
        self.connection.connect()
    }

    /// Wait for the next change to surface to the view.
    ///
    /// Returns `None` once the connection is idle or closed. Cancel-safe.
    pub async fn next_event(&mut self) -> Option<ChatEvent> {
        loop {
            if let Some(event) = self.events.pop_front() {
                return Some(event);
            }
            if let Err(e) = self.flush_outbox().await {
                tracing::debug!("[{}] Outbox flush interrupted: {}", self.room_id, e);
            }
            match self.connection.next_event().await? {
                ConnectionEvent::StateChanged(state) => {
                    if state.is_connected() {
                        self.prepare_session();
                    }
                    return Some(ChatEvent::StateChanged(state));
                }
                ConnectionEvent::Frame(frame) => self.dispatch(frame),
            }
        }
    }

    /// Set the local identity and announce it to the room.
    ///
    /// Opens the baseline gate. When not connected the announcement is sent as
    /// part of the next session setup.
    pub async fn join(&mut self, user_name: &str) -> Result<(), SyncError> {
        let user_name = user_name.trim();
        if user_name.is_empty() {
            return Err(SyncError::OperationRejected(RejectReason::EmptyInput));
        }
        if self.connection.state().is_terminal() {
            return Err(SyncError::OperationRejected(RejectReason::Closed));
        }

        self.identity = Some(user_name.to_string());
        if self.gate == BaselineGate::Closed {
            self.gate = BaselineGate::Ready;
        }

        if self.connection.is_connected() {
            let frame = self.join_frame(user_name)?;
            self.flush_outbox().await?;
            self.connection.send(frame).await?;
            tracing::info!("[{}] Joined as '{}'", self.room_id, user_name);
        } else {
            tracing::info!(
                "[{}] Joined as '{}', announcement deferred until connected",
                self.room_id,
                user_name
            );
        }
        Ok(())
    }

    /// Publish a chat message under the joined identity.
    pub async fn send_message(&mut self, text: &str) -> Result<(), SyncError> {
        if self.connection.state().is_terminal() {
            return Err(SyncError::OperationRejected(RejectReason::Closed));
        }
        let Some(user_name) = self.identity.clone() else {
            return Err(SyncError::OperationRejected(RejectReason::MissingIdentity));
        };
        let text = text.trim();
        if text.is_empty() {
            return Err(SyncError::OperationRejected(RejectReason::EmptyInput));
        }
        if !self.connection.is_connected() {
            return Err(SyncError::OperationRejected(RejectReason::NotConnected));
        }

        let message = ChatMessage::outgoing(&self.room_id, user_name, text);
        let frame = StompFrame::send_json(
            &send_destination(&self.room_id),
            to_json("ChatMessage", &message)?,
        );
        self.flush_outbox().await?;
        self.connection.send(frame).await
    }

    /// Register an extra handler for `channel`.
    ///
    /// The wire subscription is issued on the next flush if connected, and on
    /// every later connect.
    pub fn subscribe(
        &mut self,
        channel: &str,
        handler: impl FnMut(&StompFrame) + Send + 'static,
    ) -> SubscriptionHandle {
        let (handle, wire) = self
            .registry
            .subscribe(channel, Route::Custom(Box::new(handler)));
        if let Some(wire) = wire
            && self.connection.is_connected()
        {
            self.outbox
                .push_back(StompFrame::subscribe(&wire.id, &wire.channel));
        }
        handle
    }

    /// Remove a handler. No frame reaches it after this returns.
    pub fn unsubscribe(&mut self, handle: &SubscriptionHandle) -> bool {
        match self.registry.unsubscribe(handle) {
            Unsubscribed::NotFound => false,
            Unsubscribed::Removed => true,
            Unsubscribed::ChannelReleased(wire) => {
                if self.connection.is_connected() {
                    self.outbox.push_back(StompFrame::unsubscribe(&wire.id));
                }
                true
            }
        }
    }

    /// Claim the baseline fetch.
    ///
    /// Returns the room id to fetch exactly once after `join`; `None` before
    /// joining, while a fetch is in flight, and after seeding.
    pub fn baseline_request(&mut self) -> Option<String> {
        if self.gate != BaselineGate::Ready {
            return None;
        }
        self.gate = BaselineGate::InFlight;
        Some(self.room_id.clone())
    }

    /// Install the fetched history under the live messages received so far.
    pub fn seed(&mut self, history: Vec<ChatMessage>) -> bool {
        self.gate = BaselineGate::Seeded;
        self.history.seed(history)
    }

    /// Re-open the gate after a failed fetch so it can be retried.
    pub fn baseline_failed(&mut self) {
        if self.gate == BaselineGate::InFlight {
            self.gate = BaselineGate::Ready;
        }
    }

    /// Tear the room down. Idempotent.
    ///
    /// Handlers and queued frames are dropped before the transport is closed.
    pub async fn disconnect(&mut self) {
        self.outbox.clear();
        self.events.clear();
        self.registry.clear();
        self.connection.disconnect().await;
    }

    fn join_frame(&self, user_name: &str) -> Result<StompFrame, SyncError> {
        let announcement = JoinAnnouncement {
            user_name: user_name.to_string(),
        };
        Ok(StompFrame::send_json(
            &join_destination(&self.room_id),
            to_json("JoinAnnouncement", &announcement)?,
        ))
    }

    /// Queue the session setup: every wire subscription, then the join.
    fn prepare_session(&mut self) {
        self.outbox.clear();
        for wire in self.registry.wire_subscriptions() {
            self.outbox
                .push_back(StompFrame::subscribe(&wire.id, &wire.channel));
        }
        if let Some(user_name) = self.identity.clone() {
            match self.join_frame(&user_name) {
                Ok(frame) => self.outbox.push_back(frame),
                Err(e) => tracing::warn!("[{}] {}", self.room_id, e),
            }
        }
        tracing::debug!(
            "[{}] Session setup queued ({} frames)",
            self.room_id,
            self.outbox.len()
        );
    }

    async fn flush_outbox(&mut self) -> Result<(), SyncError> {
        while self.connection.is_connected() {
            let Some(frame) = self.outbox.front().cloned() else {
                break;
            };
            self.connection.send(frame).await?;
            self.outbox.pop_front();
        }
        Ok(())
    }

    fn dispatch(&mut self, frame: StompFrame) {
        match frame.command {
            StompCommand::Message => {}
            StompCommand::Error => {
                let error = SyncError::Protocol(
                    frame
                        .header_value("message")
                        .unwrap_or(frame.body.as_str())
                        .to_string(),
                );
                tracing::warn!("[{}] {}", self.room_id, error);
                return;
            }
            other => {
                tracing::debug!("[{}] Ignoring {} frame", self.room_id, other);
                return;
            }
        }

        let Some(destination) = frame.destination() else {
            tracing::warn!("[{}] MESSAGE frame without destination dropped", self.room_id);
            return;
        };
        if !self.registry.contains(destination) {
            tracing::debug!(
                "[{}] Frame for unknown channel '{}' dropped",
                self.room_id,
                destination
            );
            return;
        }

        for route in self.registry.handlers_mut(destination) {
            match route {
                Route::Messages => match from_json::<ChatMessage>("ChatMessage", &frame.body) {
                    Ok(message) => {
                        self.history.append(message.clone());
                        self.events.push_back(ChatEvent::Message(message));
                    }
                    Err(e) => tracing::warn!("[{}] {}", self.room_id, e),
                },
                Route::Presence => {
                    match from_json::<PresenceSnapshot>("PresenceSnapshot", &frame.body) {
                        Ok(snapshot) => {
                            self.presence.apply_full_snapshot(snapshot.clone());
                            self.events.push_back(ChatEvent::Presence(snapshot));
                        }
                        Err(e) => tracing::warn!("[{}] {}", self.room_id, e),
                    }
                }
                Route::Custom(handler) => handler(&frame),
            }
        }
    }
}

fn to_json<S: Serialize>(entity: &'static str, value: &S) -> Result<String, SyncError> {
    serde_json::to_string(value).map_err(|e| ParseError::payload(entity, e).into())
}

fn from_json<D: DeserializeOwned>(entity: &'static str, body: &str) -> Result<D, ParseError> {
    serde_json::from_str(body).map_err(|e| ParseError::payload(entity, e))
}
