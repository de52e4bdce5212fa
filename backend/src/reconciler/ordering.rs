//! List ordering helpers
//!
//! Pure functions over ordered lists; nothing here knows about rendering or
//! pointer input.

use crate::chat::models::{Expert, Session};

/// Sort sessions most recently updated first
///
/// The sort is stable so sessions with equal timestamps keep their relative
/// order.
pub fn sort_sessions_by_recency(sessions: &mut [Session]) {
    sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
}

/// Move the item at `from` so it ends up at index `to`
///
/// Returns `false` (leaving the list untouched) when either index is out of
/// range or the move is a no-op.
pub fn move_item<T>(items: &mut Vec<T>, from: usize, to: usize) -> bool {
    if from == to || from >= items.len() || to >= items.len() {
        return false;
    }
    let item = items.remove(from);
    items.insert(to, item);
    true
}

/// Rewrite sort orders to match list position
///
/// Returns `(id, new_sort_order)` for every expert whose order changed.
pub fn normalize_sort_order(experts: &mut [Expert]) -> Vec<(String, i64)> {
    let mut changed = Vec::new();
    for (index, expert) in experts.iter_mut().enumerate() {
        let order = index as i64;
        if expert.sort_order != order {
            expert.sort_order = order;
            changed.push((expert.id.clone(), order));
        }
    }
    changed
}
