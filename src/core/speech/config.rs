//! Key/value settings replayed into every outgoing request.

use std::collections::HashMap;

use parking_lot::RwLock;

/// Settings store for the speech client.
///
/// Recognized keys include `lang`, `codec`, `vt`, `stack`, `voice_trigger`,
/// `trigger_start`, `trigger_length` and `voice_power`; unknown keys are
/// stored and forwarded opaquely.
#[derive(Debug, Default)]
pub struct SpeechConfig {
    entries: RwLock<HashMap<String, String>>,
}

impl SpeechConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.write().insert(key.into(), value.into());
    }

    /// Returns the stored value for `key`, or `default` when absent.
    pub fn get(&self, key: &str, default: &str) -> String {
        self.entries
            .read()
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }
}
