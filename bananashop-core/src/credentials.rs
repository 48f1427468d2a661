//! Credential persistence seam
//!
//! The API key is the only state that survives a restart. The core reads and
//! writes it through [`CredentialStore`]; the editor binary backs it with a
//! config file.

use std::collections::HashMap;

/// Key name under which the API key is stored
pub const API_KEY_NAME: &str = "banana-api-key";

/// Opaque string storage keyed by name
pub trait CredentialStore {
    fn get(&self, key: &str) -> Option<String>;

    /// Store a value; an empty value removes the key
    fn set(&mut self, key: &str, value: &str);
}

/// Process-lifetime credential storage
#[derive(Debug, Default, Clone)]
pub struct MemoryCredentialStore {
    values: HashMap<String, String>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        if value.is_empty() {
            self.values.remove(key);
        } else {
            self.values.insert(key.to_string(), value.to_string());
        }
    }
}
