//! Browser history abstraction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use tracing::debug;

/// How a query string change is committed to browser history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryMode {
    /// Add a new navigable entry (`pushState`).
    Push,
    /// Overwrite the current entry (`replaceState`).
    #[default]
    Replace,
}

impl HistoryMode {
    /// Combine the modes of two touched bindings. Push wins.
    pub fn merge(self, other: HistoryMode) -> HistoryMode {
        if self == HistoryMode::Push || other == HistoryMode::Push {
            HistoryMode::Push
        } else {
            HistoryMode::Replace
        }
    }

    /// Map the boolean `history` flag used in declarations.
    pub fn from_flag(push: bool) -> Self {
        if push {
            HistoryMode::Push
        } else {
            HistoryMode::Replace
        }
    }
}

/// Browser history trait for different hosts.
///
/// Commits are fire-and-forget: implementations must not block and the
/// engine never waits for an acknowledgement.
pub trait HistoryBackend: Send + Sync {
    /// Get the backend name (e.g., "memory").
    fn name(&self) -> &str;

    /// Overwrite the current history entry with `search`.
    fn replace_state(&self, search: &str);

    /// Append a new history entry for `search`.
    fn push_state(&self, search: &str);

    /// Dispatch to `push_state` or `replace_state`.
    fn commit(&self, mode: HistoryMode, search: &str) {
        match mode {
            HistoryMode::Push => self.push_state(search),
            HistoryMode::Replace => self.replace_state(search),
        }
    }
}

/// A single recorded history commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Search string (`?a=b` or empty) after the commit.
    pub search: String,
    /// How the entry was written.
    pub mode: HistoryMode,
    /// When the commit happened.
    pub committed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    stack: Vec<String>,
    log: Vec<HistoryEntry>,
}

/// In-memory history backend.
///
/// Useful for testing and for the CLI. Keeps the navigable stack plus a
/// log of every commit.
#[derive(Debug)]
pub struct MemoryHistory {
    inner: RwLock<Inner>,
}

impl MemoryHistory {
    /// Create a history whose current entry is `initial_search`.
    pub fn new(initial_search: impl Into<String>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                stack: vec![initial_search.into()],
                log: Vec::new(),
            }),
        }
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        f(&mut inner)
    }

    /// Current (top) entry.
    pub fn current(&self) -> String {
        self.with_inner(|inner| inner.stack.last().cloned().unwrap_or_default())
    }

    /// Number of navigable entries.
    pub fn len(&self) -> usize {
        self.with_inner(|inner| inner.stack.len())
    }

    /// Check if the stack is empty. A fresh history holds one entry.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every commit in order.
    pub fn log(&self) -> Vec<HistoryEntry> {
        self.with_inner(|inner| inner.log.clone())
    }

    /// Navigable stack, oldest first.
    pub fn entries(&self) -> Vec<String> {
        self.with_inner(|inner| inner.stack.clone())
    }

    /// Count commits written with `mode`.
    pub fn count(&self, mode: HistoryMode) -> usize {
        self.with_inner(|inner| inner.log.iter().filter(|e| e.mode == mode).count())
    }

    fn record(&self, mode: HistoryMode, search: &str) {
        debug!(?mode, search, "History commit");
        self.with_inner(|inner| {
            match mode {
                HistoryMode::Push => inner.stack.push(search.to_string()),
                HistoryMode::Replace => match inner.stack.last_mut() {
                    Some(top) => *top = search.to_string(),
                    None => inner.stack.push(search.to_string()),
                },
            }
            inner.log.push(HistoryEntry {
                search: search.to_string(),
                mode,
                committed_at: Utc::now(),
            });
        });
    }
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new("")
    }
}

impl HistoryBackend for MemoryHistory {
    fn name(&self) -> &str {
        "memory"
    }

    fn replace_state(&self, search: &str) {
        self.record(HistoryMode::Replace, search);
    }

    fn push_state(&self, search: &str) {
        self.record(HistoryMode::Push, search);
    }
}
