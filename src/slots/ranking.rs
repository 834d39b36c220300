//! Ordering of per-slot key counts.

use serde::Serialize;

/// Key count observed for one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotKeyCount {
    pub slot: u16,
    pub count: i64,
}

impl SlotKeyCount {
    pub fn new(slot: u16, count: i64) -> Self {
        Self { slot, count }
    }
}

impl std::fmt::Display for SlotKeyCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{} {}}}", self.slot, self.count)
    }
}

/// Sort descending by count. Ties keep their input order.
pub fn rank_by_key_count(mut pairs: Vec<SlotKeyCount>) -> Vec<SlotKeyCount> {
    pairs.sort_by(|a, b| b.count.cmp(&a.count));
    pairs
}
