//! Window-scoped handle over the store and browser history.

use std::sync::{Arc, RwLock};
use tracing::debug;

use querysync_common::{Error, Result};

use crate::history::{HistoryBackend, HistoryMode, MemoryHistory};
use crate::store::QueryStringStore;

/// The shared query string state of one browser window.
///
/// Cloning is cheap and every clone observes the same store and history.
/// The store is initialized from `location.search` once, when the window
/// is opened.
#[derive(Clone)]
pub struct Window {
    store: Arc<RwLock<QueryStringStore>>,
    history: Arc<dyn HistoryBackend>,
}

impl Window {
    /// Open a window at `search`, committing through `history`.
    pub fn open(search: &str, history: Arc<dyn HistoryBackend>) -> Self {
        debug!(search, backend = history.name(), "Opening window");
        Self {
            store: Arc::new(RwLock::new(QueryStringStore::from_search(search))),
            history,
        }
    }

    /// Open a window backed by a fresh [`MemoryHistory`].
    pub fn in_memory(search: &str) -> (Self, Arc<MemoryHistory>) {
        let history = Arc::new(MemoryHistory::new(QueryStringStore::from_search(search).to_search()));
        (Self::open(search, history.clone()), history)
    }

    /// Run `f` with shared access to the store.
    pub fn read<R>(&self, f: impl FnOnce(&QueryStringStore) -> R) -> Result<R> {
        let store = self
            .store
            .read()
            .map_err(|e| Error::Poisoned(e.to_string()))?;
        Ok(f(&store))
    }

    /// Run `f` with exclusive access to the store.
    pub fn write<R>(&self, f: impl FnOnce(&mut QueryStringStore) -> R) -> Result<R> {
        let mut store = self
            .store
            .write()
            .map_err(|e| Error::Poisoned(e.to_string()))?;
        Ok(f(&mut store))
    }

    /// Get a copy of the decoded value for `key`.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.read(|store| store.get(key).map(String::from))
    }

    /// Current `location.search`.
    pub fn search(&self) -> Result<String> {
        self.read(QueryStringStore::to_search)
    }

    /// Snapshot of the store.
    pub fn snapshot(&self) -> Result<QueryStringStore> {
        self.read(Clone::clone)
    }

    /// Commit the current store to history and return the search string.
    pub fn commit(&self, mode: HistoryMode) -> Result<String> {
        let search = self.search()?;
        self.history.commit(mode, &search);
        Ok(search)
    }

    /// The history backend.
    pub fn history(&self) -> &Arc<dyn HistoryBackend> {
        &self.history
    }
}

impl std::fmt::Debug for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Window")
            .field("store", &self.store)
            .field("history", &self.history.name())
            .finish()
    }
}
