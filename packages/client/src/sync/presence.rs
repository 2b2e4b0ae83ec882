//! Latest presence roster for a room.

use crate::types::PresenceSnapshot;

/// Holds the most recent roster broadcast.
///
/// Each snapshot replaces the previous one wholesale; last arrival wins.
#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    current: PresenceSnapshot,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the roster unconditionally
    pub fn apply_full_snapshot(&mut self, snapshot: PresenceSnapshot) {
        tracing::debug!(
            user_count = snapshot.user_count,
            "Presence roster replaced"
        );
        self.current = snapshot;
    }

    pub fn current(&self) -> &PresenceSnapshot {
        &self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(users: &[&str]) -> PresenceSnapshot {
        PresenceSnapshot {
            active_users: users.iter().map(|u| u.to_string()).collect(),
            user_count: users.len() as u32,
        }
    }

    #[test]
    fn test_second_snapshot_replaces_first_without_residue() {
        // テスト項目: 2 回目のスナップショットが 1 回目を完全に置き換える
        // given (前提条件):
        let mut tracker = PresenceTracker::new();
        tracker.apply_full_snapshot(roster(&["alice", "bob", "carol"]));

        // when (操作):
        tracker.apply_full_snapshot(roster(&["dave"]));

        // then (期待する結果):
        assert_eq!(tracker.current(), &roster(&["dave"]));
        assert!(!tracker.current().active_users.contains(&"alice".to_string()));
    }

    #[test]
    fn test_empty_snapshot_clears_roster() {
        // テスト項目: 空のスナップショットで名簿が空になる
        // given (前提条件):
        let mut tracker = PresenceTracker::new();
        tracker.apply_full_snapshot(roster(&["alice"]));

        // when (操作):
        tracker.apply_full_snapshot(roster(&[]));

        // then (期待する結果):
        assert_eq!(tracker.current().user_count, 0);
        assert!(tracker.current().active_users.is_empty());
    }
}
