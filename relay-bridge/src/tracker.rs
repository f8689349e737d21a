//! Session recency tracking.
//!
//! Records the last-activity timestamp of every open session and
//! answers "which session is least recently active" when the capacity
//! bound forces an eviction.
//!
//! Not internally synchronized. The coordinator serializes access,
//! since both the poll loop and result handling touch recency.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Last-activity timestamps of the currently open sessions.
#[derive(Debug, Default)]
pub struct SessionTracker {
    sessions: HashMap<String, DateTime<Utc>>,
}

impl SessionTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record activity on a session, inserting it if unknown.
    pub fn touch(&mut self, key: &str, at: DateTime<Utc>) {
        self.sessions.insert(key.to_string(), at);
    }

    /// Least recently active session, or `None` when nothing is tracked.
    ///
    /// Equal timestamps are broken by map iteration order, which is not
    /// stable across runs. No caller depends on a specific tie order.
    pub fn oldest(&self) -> Option<(String, DateTime<Utc>)> {
        self.sessions
            .iter()
            .min_by_key(|(_, at)| **at)
            .map(|(key, at)| (key.clone(), *at))
    }

    /// Stop tracking a session. Returns its last timestamp if known.
    pub fn remove(&mut self, key: &str) -> Option<DateTime<Utc>> {
        self.sessions.remove(key)
    }

    /// True when the session is currently tracked.
    pub fn contains(&self, key: &str) -> bool {
        self.sessions.contains_key(key)
    }

    /// Number of tracked sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True when nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Forget all sessions.
    pub fn clear(&mut self) {
        self.sessions.clear();
    }
}
