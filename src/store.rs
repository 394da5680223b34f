//! Durable session cache.
//!
//! The last known connection (a connected flag and the active address) is
//! written to per-origin storage so a page reload can reconnect without
//! prompting the user again. It is a cache, not a source of truth: the live
//! provider response always wins once it arrives.

use crate::error::StoreError;

pub const CONNECTED_KEY: &str = "walletConnected";
pub const ADDRESS_KEY: &str = "walletAddress";

/// Sentinel written under [`CONNECTED_KEY`] while a session is cached.
const CONNECTED_SENTINEL: &str = "true";

/// Raw string key-value storage the session store writes through.
///
/// In the browser this is `window.localStorage`; tests and non-browser
/// hosts use [`MemoryStore`].
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str);
}

/// Persists the connected flag and active address as a pair.
///
/// Writes are sequential best-effort; a partially present pair is treated
/// as "not connected" on load rather than an error.
pub struct SessionStore<K> {
    backend: K,
}

impl<K: KeyValueStore> SessionStore<K> {
    pub fn new(backend: K) -> Self {
        Self { backend }
    }

    /// Cache `address` as the connected session.
    pub fn save(&self, address: &str) -> Result<(), StoreError> {
        self.backend.set(CONNECTED_KEY, CONNECTED_SENTINEL)?;
        self.backend.set(ADDRESS_KEY, address)
    }

    /// The cached address, if a complete session pair is present.
    pub fn load(&self) -> Option<String> {
        let connected = self.backend.get(CONNECTED_KEY)?;
        if connected != CONNECTED_SENTINEL {
            return None;
        }
        self.backend.get(ADDRESS_KEY)
    }

    /// Drop the cached session. Absent entries are not an error.
    pub fn clear(&self) {
        self.backend.remove(CONNECTED_KEY);
        self.backend.remove(ADDRESS_KEY);
    }
}

impl<K: KeyValueStore> KeyValueStore for std::rc::Rc<K> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) {
        (**self).remove(key)
    }
}

/// In-memory [`KeyValueStore`], for tests and non-browser hosts.
#[derive(Default)]
pub struct MemoryStore {
    entries: std::cell::RefCell<std::collections::HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .borrow_mut()
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.entries.borrow_mut().remove(key);
    }
}

/// `window.localStorage` backend.
#[cfg(target_arch = "wasm32")]
pub struct BrowserStorage {
    storage: web_sys::Storage,
}

#[cfg(target_arch = "wasm32")]
impl BrowserStorage {
    /// `None` when there is no window or local storage is disabled
    /// (private browsing modes, storage partitioning).
    pub fn open() -> Option<Self> {
        let storage = web_sys::window()?.local_storage().ok()??;
        Some(Self { storage })
    }
}

#[cfg(target_arch = "wasm32")]
impl KeyValueStore for BrowserStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.storage.get_item(key).ok().flatten()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.storage
            .set_item(key, value)
            .map_err(|error| StoreError(format!("{error:?}")))
    }

    fn remove(&self, key: &str) {
        if let Err(error) = self.storage.remove_item(key) {
            log::warn!("failed to remove `{key}' from local storage: {error:?}");
        }
    }
}
