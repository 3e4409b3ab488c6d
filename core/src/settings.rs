//! Credential and device settings storage.

use std::collections::HashMap;

use parking_lot::RwLock;

/// Well-known settings keys.
pub mod keys {
    pub const AUTHORIZATION: &str = "authorization";
    pub const ACCOUNT_ID: &str = "account_id";
    pub const MID: &str = "mid";
    pub const DEVICE_ID: &str = "device_id";
    pub const UUID: &str = "uuid";
    pub const PHONE_ID: &str = "phone_id";
    pub const ADVERTISING_ID: &str = "advertising_id";
}

/// Durable key/value storage for session credentials and device identity.
///
/// Implementations are handed to the client explicitly; nothing in the crate
/// reaches for a process-wide store.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// In-memory store, suitable for tests and short-lived sessions.
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<HashMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.values.write().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.values.write().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove() {
        let store = MemorySettings::new();
        assert_eq!(store.get(keys::MID), None);
        store.set(keys::MID, "abc");
        assert_eq!(store.get(keys::MID).as_deref(), Some("abc"));
        store.set(keys::MID, "def");
        assert_eq!(store.get(keys::MID).as_deref(), Some("def"));
        store.remove(keys::MID);
        assert_eq!(store.get(keys::MID), None);
    }
}
