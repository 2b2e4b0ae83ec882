//! Metrics dashboard synchronizer.
//!
//! Keeps the newest snapshot and a bounded window of recent ones, fed by the
//! server-sent metrics stream and optionally seeded from the REST baseline.

use tokio::sync::watch;

use crate::config::ConnectionConfig;
use crate::error::{ParseError, SyncError};
use crate::sync::{ConnectionEvent, ConnectionManager, ConnectionState, RollingWindow};
use crate::transport::{SseEvent, Transport};
use crate::types::MetricsSnapshot;

#[derive(Debug, Clone, PartialEq)]
pub enum MetricsEvent {
    StateChanged(ConnectionState),
    Snapshot(MetricsSnapshot),
}

pub struct MetricsFeed<T>
where
    T: Transport<Frame = SseEvent>,
{
    connection: ConnectionManager<T>,
    current: Option<MetricsSnapshot>,
    window: RollingWindow<MetricsSnapshot>,
}

impl<T> MetricsFeed<T>
where
    T: Transport<Frame = SseEvent>,
{
    pub fn new(transport: T, config: &ConnectionConfig) -> Self {
        Self {
            connection: ConnectionManager::new("metrics", transport, config),
            current: None,
            window: RollingWindow::default(),
        }
    }

    /// Same as `new` with a window of `capacity` snapshots instead of 60.
    pub fn with_capacity(transport: T, config: &ConnectionConfig, capacity: usize) -> Self {
        Self {
            window: RollingWindow::new(capacity),
            ..Self::new(transport, config)
        }
    }

    /// Newest snapshot, live or baseline
    pub fn current(&self) -> Option<&MetricsSnapshot> {
        self.current.as_ref()
    }

    /// Recent snapshots, oldest first
    pub fn history(&self) -> &RollingWindow<MetricsSnapshot> {
        &self.window
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

    pub fn has_pending_reconnect(&self) -> bool {
        self.connection.has_pending_retry()
    }

    pub fn connect(&mut self) -> Result<(), SyncError> {
        self.connection.connect()
    }

    /// Seed from the REST baseline.
    ///
    /// The baseline is older than anything live: it only becomes `current`
    /// when nothing arrived yet, and only enters the window if there is room
    /// in front. Returns whether it entered the window.
    pub fn seed(&mut self, snapshot: MetricsSnapshot) -> bool {
        if self.current.is_none() {
            self.current = Some(snapshot.clone());
        }
        let stored = self.window.push_oldest(snapshot);
        if !stored {
            tracing::debug!("Metrics baseline dropped, window already full");
        }
        stored
    }

    /// Wait for the next change. Cancel-safe; `None` once idle or closed.
    pub async fn next_event(&mut self) -> Option<MetricsEvent> {
        loop {
            match self.connection.next_event().await? {
                ConnectionEvent::StateChanged(state) => {
                    return Some(MetricsEvent::StateChanged(state));
                }
                ConnectionEvent::Frame(event) => match decode(&event) {
                    Ok(snapshot) => {
                        self.current = Some(snapshot.clone());
                        self.window.push(snapshot.clone());
                        return Some(MetricsEvent::Snapshot(snapshot));
                    }
                    Err(e) => tracing::warn!("Dropping metrics event: {}", e),
                },
            }
        }
    }

    /// Stop the stream. Idempotent; collected snapshots stay readable.
    pub async fn disconnect(&mut self) {
        self.connection.disconnect().await;
    }
}

fn decode(event: &SseEvent) -> Result<MetricsSnapshot, ParseError> {
    serde_json::from_str(&event.data).map_err(|e| ParseError::payload("MetricsSnapshot", e))
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::time::Duration;

    use super::*;
    use crate::error::TransportError;
    use crate::sync::ReconnectPolicy;
    use crate::testing::{FakeRemote, FakeTransport, fake_transport};
    use crate::types::{DbMetrics, HttpMetrics, JvmMetrics};

    type Feed = MetricsFeed<FakeTransport<SseEvent, Infallible>>;
    type Remote = FakeRemote<SseEvent, Infallible>;

    fn snapshot(timestamp: i64) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp,
            jvm: JvmMetrics::default(),
            http: HttpMetrics::default(),
            db: DbMetrics::default(),
        }
    }

    fn event(timestamp: i64) -> SseEvent {
        SseEvent {
            data: serde_json::to_string(&snapshot(timestamp)).unwrap(),
            ..SseEvent::default()
        }
    }

    fn feed(capacity: usize) -> (Feed, Remote) {
        let (transport, remote) = fake_transport();
        let config = ConnectionConfig::event_stream("fake://metrics")
            .with_reconnect(ReconnectPolicy::fixed(Duration::from_millis(5000)));
        (MetricsFeed::with_capacity(transport, &config, capacity), remote)
    }

    async fn connected(capacity: usize) -> (Feed, Remote) {
        let (mut feed, remote) = feed(capacity);
        feed.connect().unwrap();
        feed.next_event().await;
        assert_eq!(
            feed.next_event().await,
            Some(MetricsEvent::StateChanged(ConnectionState::Connected))
        );
        (feed, remote)
    }

    fn timestamps(feed: &Feed) -> Vec<i64> {
        feed.history().iter().map(|s| s.timestamp).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshots_fill_window_in_arrival_order() {
        // テスト項目: 受信したスナップショットが到着順にウィンドウへ入り、最新が current になる
        // given (前提条件):
        let (mut feed, remote) = connected(60).await;
        remote.push_frame(event(1));
        remote.push_frame(event(2));

        // when (操作):
        feed.next_event().await;
        let last = feed.next_event().await;

        // then (期待する結果):
        assert_eq!(last, Some(MetricsEvent::Snapshot(snapshot(2))));
        assert_eq!(timestamps(&feed), vec![1, 2]);
        assert_eq!(feed.current().map(|s| s.timestamp), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_keeps_only_newest_sixty() {
        // テスト項目: 61 件目の受信で最も古いスナップショットが押し出される
        // given (前提条件):
        let (mut feed, remote) = connected(60).await;
        for timestamp in 1..=61 {
            remote.push_frame(event(timestamp));
        }

        // when (操作):
        for _ in 0..61 {
            feed.next_event().await;
        }

        // then (期待する結果):
        assert_eq!(feed.history().len(), 60);
        assert_eq!(timestamps(&feed).first(), Some(&2));
        assert_eq!(timestamps(&feed).last(), Some(&61));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_event_is_skipped() {
        // テスト項目: JSON として解析できないイベントは破棄され、次のイベントは処理される
        // given (前提条件):
        let (mut feed, remote) = connected(60).await;
        remote.push_frame(SseEvent {
            data: "not json".into(),
            ..SseEvent::default()
        });
        remote.push_frame(event(5));

        // when (操作):
        let next = feed.next_event().await;

        // then (期待する結果):
        assert_eq!(next, Some(MetricsEvent::Snapshot(snapshot(5))));
        assert_eq!(feed.history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_baseline_seed_is_older_than_live() {
        // テスト項目: ベースラインは最古の位置に入り、ライブ受信で current が置き換わる
        // given (前提条件):
        let (mut feed, remote) = connected(60).await;
        feed.seed(snapshot(100));
        let seeded_current = feed.current().map(|s| s.timestamp);
        remote.push_frame(event(200));

        // when (操作):
        feed.next_event().await;

        // then (期待する結果):
        assert_eq!(seeded_current, Some(100));
        assert_eq!(feed.current().map(|s| s.timestamp), Some(200));
        assert_eq!(timestamps(&feed), vec![100, 200]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_baseline_does_not_displace_live_data() {
        // テスト項目: ウィンドウが満杯の後に届いたベースラインは無視され、current も変わらない
        // given (前提条件):
        let (mut feed, remote) = connected(2).await;
        remote.push_frame(event(1));
        remote.push_frame(event(2));
        feed.next_event().await;
        feed.next_event().await;

        // when (操作):
        let stored = feed.seed(snapshot(0));

        // then (期待する結果):
        assert!(!stored);
        assert_eq!(timestamps(&feed), vec![1, 2]);
        assert_eq!(feed.current().map(|s| s.timestamp), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_end_reconnects_and_disconnect_clears_timer() {
        // テスト項目: ストリーム終了で再接続待ちに入り、disconnect() で待機が解除される
        // given (前提条件):
        let (mut feed, remote) = connected(60).await;
        remote.push_error(TransportError::Closed);

        // when (操作):
        let state = feed.next_event().await;
        let pending = feed.has_pending_reconnect();
        feed.disconnect().await;
        feed.disconnect().await;

        // then (期待する結果):
        assert_eq!(state, Some(MetricsEvent::StateChanged(ConnectionState::Reconnecting)));
        assert!(pending);
        assert!(!feed.has_pending_reconnect());
        assert_eq!(feed.state(), ConnectionState::Closed);
        assert!(!feed.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_with_undefined_heap_max_is_kept() {
        // テスト項目: ヒープ上限が未定義 (heapMax = -1) のスナップショットも破棄されずウィンドウに入る
        // given (前提条件):
        let (mut feed, remote) = connected(60).await;
        let mut body = serde_json::to_value(snapshot(7)).unwrap();
        body["jvm"]["heapMax"] = serde_json::json!(-1);
        remote.push_frame(SseEvent {
            data: body.to_string(),
            ..SseEvent::default()
        });

        // when (操作):
        let next = tokio::time::timeout(Duration::from_secs(1), feed.next_event()).await;

        // then (期待する結果):
        assert!(matches!(next, Ok(Some(MetricsEvent::Snapshot(s))) if s.jvm.heap_max == -1));
        assert_eq!(feed.history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_during_reconnect_delay_releases_feed() {
        // テスト項目: 再接続待ちの途中でフィードを破棄すると Closed が通知され、再接続は行われない
        // given (前提条件):
        let (mut feed, remote) = connected(60).await;
        remote.push_error(TransportError::Closed);
        assert_eq!(
            feed.next_event().await,
            Some(MetricsEvent::StateChanged(ConnectionState::Reconnecting))
        );
        let observer = feed.watch_state();
        let opens_before = remote.opens();

        // when (操作):
        drop(feed);
        tokio::time::advance(Duration::from_secs(10)).await;

        // then (期待する結果):
        assert_eq!(*observer.borrow(), ConnectionState::Closed);
        assert_eq!(remote.opens(), opens_before);
    }
}
