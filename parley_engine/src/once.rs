//! Shared record of one-shot content that has already been shown.
//!
//! A [`OnceTracker`] is a cheap handle: clones share the same state, so a
//! host can hand one tracker to every runner belonging to a save slot and
//! persist it alongside the rest of the save data.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

/// Serializable contents of a [`OnceTracker`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnceState {
    /// Ids of `<<once>>` blocks that have run.
    #[serde(default)]
    pub once_seen: BTreeSet<String>,
    /// `title#index` keys of node-group members selected through `when: once`.
    #[serde(default)]
    pub node_group_once_seen: BTreeSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct OnceTracker {
    inner: Arc<Mutex<OnceState>>,
}

impl OnceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker seeded from previously saved state.
    pub fn restore(state: OnceState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, OnceState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current state, e.g. for saving.
    pub fn snapshot(&self) -> OnceState {
        self.lock().clone()
    }

    pub fn has_seen(&self, id: &str) -> bool {
        self.lock().once_seen.contains(id)
    }

    /// Mark a once-block as shown. Returns `true` if it had not been seen.
    pub fn mark_seen(&self, id: &str) -> bool {
        self.lock().once_seen.insert(id.to_string())
    }

    pub fn node_seen(&self, title: &str, index: usize) -> bool {
        self.lock().node_group_once_seen.contains(&node_key(title, index))
    }

    pub fn mark_node_seen(&self, title: &str, index: usize) -> bool {
        self.lock().node_group_once_seen.insert(node_key(title, index))
    }

    /// True when both handles share the same underlying state.
    pub fn shares_state_with(&self, other: &OnceTracker) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

fn node_key(title: &str, index: usize) -> String {
    format!("{title}#{index}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let tracker = OnceTracker::new();
        let other = tracker.clone();
        assert!(tracker.mark_seen("A#once#0"));
        assert!(!other.mark_seen("A#once#0"));
        assert!(other.has_seen("A#once#0"));
        assert!(tracker.shares_state_with(&other));
        assert!(!tracker.shares_state_with(&OnceTracker::new()));
    }

    #[test]
    fn node_keys_are_per_index() {
        let tracker = OnceTracker::new();
        tracker.mark_node_seen("Work", 0);
        assert!(tracker.node_seen("Work", 0));
        assert!(!tracker.node_seen("Work", 1));
        assert_eq!(
            tracker.snapshot().node_group_once_seen.into_iter().collect::<Vec<_>>(),
            vec!["Work#0".to_string()]
        );
    }

    #[test]
    fn state_survives_a_json_round_trip() {
        let tracker = OnceTracker::new();
        tracker.mark_seen("Intro#once#0");
        tracker.mark_node_seen("Shop", 2);
        let json = serde_json::to_string(&tracker.snapshot()).unwrap();
        let restored = OnceTracker::restore(serde_json::from_str(&json).unwrap());
        assert!(restored.has_seen("Intro#once#0"));
        assert!(restored.node_seen("Shop", 2));
        assert_eq!(restored.snapshot(), tracker.snapshot());
    }
}
