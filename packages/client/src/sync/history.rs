//! Baseline + live merge for chat history.
//!
//! The view is always `baseline ++ live`, each part in arrival order. With the
//! default policy no deduplication happens, so a message that lands in both
//! the history response and the live channel (sent between join and the end
//! of the baseline fetch) shows up twice, and a live message that arrives
//! before the baseline resolves is still listed after it.

use std::collections::HashSet;

use crate::types::ChatMessage;

/// Entities that may carry a server-assigned identity.
pub trait Identified {
    fn identity(&self) -> Option<i64>;
}

impl Identified for ChatMessage {
    fn identity(&self) -> Option<i64> {
        self.id
    }
}

/// How overlap between baseline and live entries is handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DedupPolicy {
    /// Keep every entry (default)
    #[default]
    KeepAll,
    /// Hide live entries whose id already appears in the baseline
    ById,
}

/// Combines a once-fetched baseline with a live tail.
#[derive(Debug, Clone)]
pub struct HistoryMerger<T> {
    baseline: Vec<T>,
    live: Vec<T>,
    seeded: bool,
    policy: DedupPolicy,
    baseline_ids: HashSet<i64>,
}

impl<T: Identified> Default for HistoryMerger<T> {
    fn default() -> Self {
        Self::new(DedupPolicy::default())
    }
}

impl<T: Identified> HistoryMerger<T> {
    pub fn new(policy: DedupPolicy) -> Self {
        Self {
            baseline: Vec::new(),
            live: Vec::new(),
            seeded: false,
            policy,
            baseline_ids: HashSet::new(),
        }
    }

    /// Install the baseline. Only the first call has an effect.
    ///
    /// Returns false if a baseline was already seeded.
    pub fn seed(&mut self, baseline: Vec<T>) -> bool {
        if self.seeded {
            tracing::warn!("Baseline already seeded, ignoring {} entries", baseline.len());
            return false;
        }
        self.baseline_ids = baseline.iter().filter_map(Identified::identity).collect();
        self.baseline = baseline;
        self.seeded = true;
        true
    }

    /// Append a live entry to the tail
    pub fn append(&mut self, entry: T) {
        self.live.push(entry);
    }

    /// Iterate the merged view: baseline first, then live
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.baseline
            .iter()
            .chain(self.live.iter().filter(|entry| !self.is_duplicate(entry)))
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.baseline.is_empty() && self.live.is_empty()
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    fn is_duplicate(&self, entry: &T) -> bool {
        match (self.policy, entry.identity()) {
            (DedupPolicy::ById, Some(id)) => self.baseline_ids.contains(&id),
            _ => false,
        }
    }
}

impl<T: Identified + Clone> HistoryMerger<T> {
    /// Snapshot of the merged view
    pub fn view(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(user: &str, text: &str) -> ChatMessage {
        ChatMessage::outgoing("general", user, text)
    }

    fn persisted(id: i64, user: &str, text: &str) -> ChatMessage {
        ChatMessage {
            id: Some(id),
            ..msg(user, text)
        }
    }

    #[test]
    fn test_view_is_baseline_then_live() {
        // テスト項目: seed([m1, m2]) の後に append(m3) すると [m1, m2, m3] になる
        // given (前提条件):
        let mut merger = HistoryMerger::default();
        let (m1, m2, m3) = (msg("a", "1"), msg("b", "2"), msg("c", "3"));
        merger.seed(vec![m1.clone(), m2.clone()]);

        // when (操作):
        merger.append(m3.clone());

        // then (期待する結果):
        assert_eq!(merger.view(), vec![m1, m2, m3]);
    }

    #[test]
    fn test_baseline_resolving_after_live_messages_still_comes_first() {
        // テスト項目: ライブメッセージの後に履歴が届いても履歴が先頭に並ぶ
        // given (前提条件):
        let mut merger = HistoryMerger::default();
        merger.append(msg("b", "yo"));
        merger.append(msg("a", "later"));

        // when (操作):
        merger.seed(vec![msg("a", "hi")]);

        // then (期待する結果):
        let texts: Vec<_> = merger.iter().map(|m| m.message_text.as_str()).collect();
        assert_eq!(texts, ["hi", "yo", "later"]);
    }

    #[test]
    fn test_overlap_is_kept_by_default() {
        // テスト項目: デフォルトでは履歴とライブの重複を除去しない
        // given (前提条件):
        let mut merger = HistoryMerger::default();
        merger.append(persisted(5, "a", "dup"));

        // when (操作):
        merger.seed(vec![persisted(5, "a", "dup")]);

        // then (期待する結果):
        assert_eq!(merger.len(), 2);
    }

    #[test]
    fn test_dedup_by_id_hides_live_copies() {
        // テスト項目: ById ポリシーでは履歴にある id のライブメッセージが隠される
        // given (前提条件):
        let mut merger = HistoryMerger::new(DedupPolicy::ById);
        merger.append(persisted(5, "a", "dup"));
        merger.append(msg("b", "unsaved"));
        merger.append(persisted(6, "c", "new"));

        // when (操作):
        merger.seed(vec![persisted(4, "a", "old"), persisted(5, "a", "dup")]);

        // then (期待する結果):
        let ids: Vec<_> = merger.iter().map(|m| m.id).collect();
        assert_eq!(ids, [Some(4), Some(5), None, Some(6)]);
    }

    #[test]
    fn test_seed_only_once() {
        // テスト項目: 2 回目の seed は無視される
        // given (前提条件):
        let mut merger = HistoryMerger::default();
        assert!(merger.seed(vec![msg("a", "first")]));

        // when (操作):
        let accepted = merger.seed(vec![msg("b", "second")]);

        // then (期待する結果):
        assert!(!accepted);
        assert_eq!(merger.view(), vec![msg("a", "first")]);
    }
}
