//! Text rendering for the CLI views.

use nagare_shared::time::{millis_to_clock, now_millis, server_time_of_day};

use crate::error::RejectReason;
use crate::sync::{ConnectionState, RollingWindow};
use crate::types::{ChatMessage, MetricsSnapshot, PresenceSnapshot};

const RULE: &str = "============================================================";
const THIN_RULE: &str = "------------------------------------------------------------";
const MIB: f64 = 1024.0 * 1024.0;

/// Message formatter for the chat view
pub struct MessageFormatter;

impl MessageFormatter {
    /// Format the roster of a room, marking the local user with "(me)"
    pub fn format_presence(snapshot: &PresenceSnapshot, me: Option<&str>) -> String {
        let mut output = String::new();
        output.push_str(&format!("\n\n{}\n", RULE));
        output.push_str(&format!("Online ({}):\n", snapshot.user_count));

        if snapshot.active_users.is_empty() {
            output.push_str("(No participants)\n");
        } else {
            for user in &snapshot.active_users {
                let me_suffix = if Some(user.as_str()) == me { " (me)" } else { "" };
                output.push_str(&format!("{}{}\n", user, me_suffix));
            }
        }

        output.push_str(&format!("{}\n", RULE));
        output
    }

    /// Format a chat message
    ///
    /// Messages without a server timestamp show the local receive time.
    pub fn format_chat_message(message: &ChatMessage) -> String {
        let sent_at = match &message.created_at {
            Some(raw) => server_time_of_day(raw),
            None => millis_to_clock(now_millis()).unwrap_or_default(),
        };
        format!(
            "\n\n{}\n@{}: {}\nsent at {}\n{}\n",
            THIN_RULE, message.user_name, message.message_text, sent_at, THIN_RULE
        )
    }

    /// Format the history baseline as a compact block
    pub fn format_history(room_id: &str, messages: &[ChatMessage]) -> String {
        let mut output = format!("\n{}\nHistory of #{}:\n", RULE, room_id);
        if messages.is_empty() {
            output.push_str("(No messages yet)\n");
        }
        for message in messages {
            let at = message
                .created_at
                .as_deref()
                .map(server_time_of_day)
                .unwrap_or_else(|| "--:--:--".to_string());
            output.push_str(&format!(
                "[{}] @{}: {}\n",
                at, message.user_name, message.message_text
            ));
        }
        output.push_str(&format!("{}\n", RULE));
        output
    }

    pub fn format_state_change(state: ConnectionState) -> String {
        let detail = match state {
            ConnectionState::Connecting => "connecting...",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "connection lost, retrying",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Closed => "closed",
        };
        format!("\n* {}\n", detail)
    }

    pub fn format_rejection(reason: RejectReason) -> String {
        format!("! not sent: {}\n", reason)
    }
}

/// Formatter for the metrics view
pub struct MetricsFormatter;

impl MetricsFormatter {
    /// One line per snapshot
    pub fn format_snapshot(snapshot: &MetricsSnapshot) -> String {
        let clock = millis_to_clock(snapshot.timestamp).unwrap_or_else(|| "--:--:--".into());
        format!(
            "[{}] heap {}/{} MiB | threads {} | http {:.2} req/s {:.1} ms ({} conn) | db {:.1} ms ({} conn)",
            clock,
            mebibytes(snapshot.jvm.heap_used),
            mebibytes(snapshot.jvm.heap_max),
            snapshot.jvm.active_threads,
            snapshot.http.requests_per_second,
            snapshot.http.average_response_time,
            snapshot.http.active_connections,
            snapshot.db.average_query_time,
            snapshot.db.active_connections,
        )
    }

    /// Averages over the rolling window
    pub fn format_window_summary(window: &RollingWindow<MetricsSnapshot>) -> String {
        if window.is_empty() {
            return "(no samples)".to_string();
        }
        let count = window.len() as f64;
        let rps = window.iter().map(|s| s.http.requests_per_second).sum::<f64>() / count;
        let latency = window.iter().map(|s| s.http.average_response_time).sum::<f64>() / count;
        let peak_heap = window.iter().map(|s| s.jvm.heap_used).max().unwrap_or_default();
        format!(
            "last {} samples: avg {:.2} req/s, avg {:.1} ms, peak heap {} MiB",
            window.len(),
            rps,
            latency,
            mebibytes(peak_heap)
        )
    }
}

/// Negative byte counts mean "undefined" and render as `?`
fn mebibytes(bytes: i64) -> String {
    if bytes < 0 {
        "?".to_string()
    } else {
        format!("{:.1}", bytes as f64 / MIB)
    }
}
