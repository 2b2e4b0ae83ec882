//! Wire entities exchanged with the backend.
//!
//! Field names follow the backend's camelCase JSON.

use serde::{Deserialize, Serialize};

/// A chat message, either from the history baseline or the live channel.
///
/// `created_at` and `id` are server-assigned and absent on messages that have
/// not been persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub room_id: String,
    pub user_name: String,
    pub message_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl ChatMessage {
    /// Create an unsent message (no id, no server timestamp)
    pub fn outgoing(
        room_id: impl Into<String>,
        user_name: impl Into<String>,
        message_text: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            room_id: room_id.into(),
            user_name: user_name.into(),
            message_text: message_text.into(),
            created_at: None,
        }
    }
}

/// Payload announcing that a user joined a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinAnnouncement {
    pub user_name: String,
}

/// Full roster of a room; every broadcast replaces the previous one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceSnapshot {
    pub active_users: Vec<String>,
    pub user_count: u32,
}

/// One telemetry point pushed by the metrics stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Epoch milliseconds
    pub timestamp: i64,
    pub jvm: JvmMetrics,
    pub http: HttpMetrics,
    pub db: DbMetrics,
}

/// Memory and thread counters.
///
/// Byte counters are signed: the backend reports `-1` when a memory pool has no
/// defined maximum.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JvmMetrics {
    pub heap_used: i64,
    pub heap_committed: i64,
    pub heap_max: i64,
    pub non_heap_used: i64,
    pub active_threads: u32,
    pub peak_threads: u32,
    pub daemon_threads: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpMetrics {
    pub total_requests: u64,
    pub requests_per_second: f64,
    pub average_response_time: f64,
    pub active_connections: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbMetrics {
    pub average_query_time: f64,
    pub active_connections: u64,
    pub total_queries: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_from_history_json() {
        // テスト項目: 履歴 API の JSON が ChatMessage にデコードされる
        // given (前提条件):
        let json = r#"{"id":7,"roomId":"general","userName":"alice","messageText":"hi","createdAt":"2024-05-01T12:00:00"}"#;

        // when (操作):
        let message: ChatMessage = serde_json::from_str(json).unwrap();

        // then (期待する結果):
        assert_eq!(message.id, Some(7));
        assert_eq!(message.user_name, "alice");
        assert_eq!(message.created_at.as_deref(), Some("2024-05-01T12:00:00"));
    }

    #[test]
    fn test_outgoing_chat_message_omits_server_fields() {
        // テスト項目: 未送信メッセージは id と createdAt を含まずにシリアライズされる
        // given (前提条件):
        let message = ChatMessage::outgoing("general", "alice", "hello");

        // when (操作):
        let json = serde_json::to_value(&message).unwrap();

        // then (期待する結果):
        assert_eq!(
            json,
            serde_json::json!({"roomId":"general","userName":"alice","messageText":"hello"})
        );
    }

    #[test]
    fn test_presence_snapshot_from_broadcast_json() {
        // テスト項目: プレゼンス通知の JSON が PresenceSnapshot にデコードされる
        // given (前提条件):
        let json = r#"{"activeUsers":["alice","bob"],"userCount":2}"#;

        // when (操作):
        let snapshot: PresenceSnapshot = serde_json::from_str(json).unwrap();

        // then (期待する結果):
        assert_eq!(snapshot.active_users, vec!["alice", "bob"]);
        assert_eq!(snapshot.user_count, 2);
    }

    #[test]
    fn test_metrics_snapshot_missing_group_is_rejected() {
        // テスト項目: グループが欠けたメトリクスはデコードエラーになる
        // given (前提条件):
        let json = r#"{"timestamp":1,"jvm":{}}"#;

        // when (操作):
        let result = serde_json::from_str::<MetricsSnapshot>(json);

        // then (期待する結果):
        assert!(result.is_err());
    }

    #[test]
    fn test_metrics_snapshot_with_undefined_heap_max() {
        // テスト項目: 上限未定義 (heapMax = -1) のメトリクスもデコードできる
        // given (前提条件):
        let json = r#"{"timestamp":1,
            "jvm":{"heapUsed":10,"heapCommitted":20,"heapMax":-1,"nonHeapUsed":5,
                   "activeThreads":3,"peakThreads":4,"daemonThreads":1},
            "http":{"totalRequests":0,"requestsPerSecond":0.0,"averageResponseTime":0.0,"activeConnections":0},
            "db":{"averageQueryTime":0.0,"activeConnections":0,"totalQueries":0}}"#;

        // when (操作):
        let snapshot: MetricsSnapshot = serde_json::from_str(json).unwrap();

        // then (期待する結果):
        assert_eq!(snapshot.jvm.heap_max, -1);
        assert_eq!(snapshot.jvm.heap_used, 10);
    }
}
