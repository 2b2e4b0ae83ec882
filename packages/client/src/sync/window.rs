//! Bounded, oldest-evicting buffer for time-series retention.

use std::collections::VecDeque;

/// Capacity used for the metrics chart history.
pub const DEFAULT_WINDOW_CAPACITY: usize = 60;

/// Ordered buffer that never holds more than `capacity` items.
///
/// Items are kept oldest-first in arrival order; appending past capacity
/// evicts from the front.
#[derive(Debug, Clone)]
pub struct RollingWindow<T> {
    capacity: usize,
    items: VecDeque<T>,
}

impl<T> Default for RollingWindow<T> {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

impl<T> RollingWindow<T> {
    /// Create an empty window. A capacity of zero retains nothing.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    /// Append an item, evicting the oldest entries on overflow.
    ///
    /// Returns the number of evicted items.
    pub fn push(&mut self, item: T) -> usize {
        self.items.push_back(item);
        let mut evicted = 0;
        while self.items.len() > self.capacity {
            self.items.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Insert an item as the oldest entry if there is room.
    ///
    /// Returns false (and drops the item) when the window is already full,
    /// since the item would be the first to go.
    pub fn push_oldest(&mut self, item: T) -> bool {
        if self.items.len() >= self.capacity {
            return false;
        }
        self.items.push_front(item);
        true
    }

    /// Iterate oldest-first
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Clone> RollingWindow<T> {
    /// Snapshot of the retained items, oldest-first
    pub fn items(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_keeps_last_capacity_items_in_order() {
        // テスト項目: 任意の回数 push しても最新 min(n, capacity) 件が到着順で保持される
        // given (前提条件):
        for capacity in [1usize, 3, 60] {
            for n in 0..(capacity * 3) {
                let mut window = RollingWindow::new(capacity);

                // when (操作):
                for i in 0..n {
                    window.push(i);
                    assert!(window.len() <= capacity);
                }

                // then (期待する結果):
                let expected: Vec<usize> = (n.saturating_sub(capacity)..n).collect();
                assert_eq!(window.items(), expected);
            }
        }
    }

    #[test]
    fn test_push_reports_evictions() {
        // テスト項目: 容量超過時に追い出した件数が返される
        // given (前提条件):
        let mut window = RollingWindow::new(2);
        window.push("a");
        window.push("b");

        // when (操作):
        let evicted = window.push("c");

        // then (期待する結果):
        assert_eq!(evicted, 1);
        assert_eq!(window.items(), vec!["b", "c"]);
    }

    #[test]
    fn test_default_capacity_is_sixty() {
        // テスト項目: デフォルト容量は 60
        // given (前提条件):
        let mut window: RollingWindow<u32> = RollingWindow::default();

        // when (操作):
        for i in 0..100 {
            window.push(i);
        }

        // then (期待する結果):
        assert_eq!(window.len(), 60);
        assert_eq!(window.iter().next(), Some(&40));
    }

    #[test]
    fn test_push_oldest_only_when_room() {
        // テスト項目: push_oldest は空きがある場合のみ先頭に挿入する
        // given (前提条件):
        let mut window = RollingWindow::new(2);
        window.push(2);

        // when (操作):
        let inserted = window.push_oldest(1);
        let rejected = window.push_oldest(0);

        // then (期待する結果):
        assert!(inserted);
        assert!(!rejected);
        assert_eq!(window.items(), vec![1, 2]);
    }

    #[test]
    fn test_zero_capacity_retains_nothing() {
        // テスト項目: 容量 0 のウィンドウは何も保持しない
        // given (前提条件):
        let mut window = RollingWindow::new(0);

        // when (操作):
        window.push(1);

        // then (期待する結果):
        assert!(window.is_empty());
    }
}
