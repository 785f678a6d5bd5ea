//! Window-scoped query string state for querysync.
//!
//! This module provides the ordered key/value store that mirrors
//! `location.search`, the wire encoding used to serialize it, and a
//! trait-based interface for the browser history API so tests can swap in
//! an in-memory fake.
//!
//! # Design Principles
//! - Values are held fully decoded; encoding happens only on serialize
//! - Insertion order is preserved for deterministic output
//! - The store and history are injected through [`Window`], never global

pub mod bracket;
pub mod encoding;
pub mod history;
pub mod store;
pub mod window;

pub use bracket::{is_under, join_key, segments_under, split_key};
pub use history::{HistoryBackend, HistoryEntry, HistoryMode, MemoryHistory};
pub use store::QueryStringStore;
pub use window::Window;
