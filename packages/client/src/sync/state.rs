//! Connection lifecycle states.

/// Lifecycle state of one transport connection.
///
/// ```text
/// Disconnected --connect()--> Connecting --open--> Connected
/// Connected/Connecting --error, auto retry--> Reconnecting --delay--> Connecting
/// Connected/Connecting --error, no retry--> Disconnected
/// any non-terminal --disconnect()--> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not connected, waiting for `connect()`.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Session established.
    Connected,
    /// Waiting out the reconnect delay.
    Reconnecting,
    /// Torn down by the caller. Terminal.
    Closed,
}

impl ConnectionState {
    /// Returns true if the session is established.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns true for the terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Reconnecting => write!(f, "Reconnecting"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_display() {
        // テスト項目: 各状態が表示用文字列に変換される
        // given (前提条件):
        let states = [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Reconnecting,
            ConnectionState::Closed,
        ];

        // when (操作):
        let rendered: Vec<String> = states.iter().map(ToString::to_string).collect();

        // then (期待する結果):
        assert_eq!(
            rendered,
            ["Disconnected", "Connecting", "Connected", "Reconnecting", "Closed"]
        );
    }

    #[test]
    fn test_connection_state_checks() {
        // テスト項目: 状態判定メソッドが正しく分類する
        // given (前提条件) / when (操作) / then (期待する結果):
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Reconnecting.is_connected());

        assert!(ConnectionState::Closed.is_terminal());
        assert!(!ConnectionState::Disconnected.is_terminal());
    }
}
