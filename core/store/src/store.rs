//! Ordered query string store.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::bracket::is_under;
use crate::encoding;

/// The current query string as an ordered key/value mapping.
///
/// Values are stored fully decoded. Insertion order is preserved across
/// mutations, so overwriting a key keeps its position and deleting then
/// re-adding moves it to the end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryStringStore {
    entries: IndexMap<String, String>,
}

impl QueryStringStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store from a `location.search` string.
    pub fn from_search(search: &str) -> Self {
        let mut store = Self::new();
        store.initialize_from(search);
        store
    }

    /// Replace the contents with the pairs parsed from `search`.
    ///
    /// A leading `?` is optional. When a key repeats, the first position
    /// and the last value are kept.
    pub fn initialize_from(&mut self, search: &str) {
        self.entries.clear();
        for (key, value) in encoding::parse(search) {
            if key.is_empty() {
                continue;
            }
            self.entries.insert(key, value);
        }
        debug!(keys = self.entries.len(), "Initialized query string store");
    }

    /// Get the decoded value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Check whether `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or overwrite `key`. Returns true if the store changed.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        let value = value.into();
        if self.entries.get(&key) == Some(&value) {
            return false;
        }
        trace!(%key, %value, "Query key set");
        self.entries.insert(key, value);
        true
    }

    /// Remove `key`. Returns true if it was present.
    pub fn delete(&mut self, key: &str) -> bool {
        let removed = self.entries.shift_remove(key).is_some();
        if removed {
            trace!(key, "Query key deleted");
        }
        removed
    }

    /// Keys equal to `base` or nested beneath it in bracket notation.
    pub fn keys_under(&self, base: &str) -> Vec<String> {
        self.entries
            .keys()
            .filter(|k| is_under(k, base))
            .cloned()
            .collect()
    }

    /// Iterate over entries in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize in display form, without a leading `?`.
    pub fn serialize(&self) -> String {
        encoding::to_display(self.iter())
    }

    /// Serialize as strict `application/x-www-form-urlencoded`.
    pub fn serialize_form(&self) -> String {
        encoding::to_form(self.iter())
    }

    /// Serialize as a `location.search` value: `?…`, or empty.
    pub fn to_search(&self) -> String {
        if self.is_empty() {
            String::new()
        } else {
            format!("?{}", self.serialize())
        }
    }
}
