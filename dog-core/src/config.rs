//! # Configuration
//!
//! A flat string key/value store. Keys are dotted (`store.cache_dir`) and
//! values are parsed on read through a [`DogConfigSnapshot`].
//!
//! ```rust
//! use dog_core::DogConfig;
//!
//! let mut cfg = DogConfig::new();
//! cfg.set("http.port", "5055");
//! cfg.set_default("http.host", "127.0.0.1");
//!
//! let snap = cfg.snapshot();
//! assert_eq!(snap.get_u64("http.port"), Some(5055));
//! assert_eq!(snap.get("http.host"), Some("127.0.0.1"));
//! ```
//!
//! Environment overrides use a prefix and double underscores as separators:
//! `BLOBSERVER__STORE__CACHE_DIR=/var/cache` becomes `store.cache_dir`.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct DogConfig {
    values: HashMap<String, String>,
}

impl DogConfig {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    /// Set `key` only if nothing has set it yet.
    pub fn set_default<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.entry(key.into()).or_insert_with(|| value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Import every `PREFIX__A__B=value` variable as `a.b = value`.
    ///
    /// Returns how many keys were imported.
    pub fn load_env(&mut self, prefix: &str) -> usize {
        self.load_vars(prefix, std::env::vars())
    }

    /// Same as [`DogConfig::load_env`] over an explicit variable list.
    pub fn load_vars<I>(&mut self, prefix: &str, vars: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let prefix = format!("{}__", prefix.trim_end_matches('_'));
        let mut n = 0;
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(&prefix) {
                let normalized = stripped.to_lowercase().replace("__", ".");
                if normalized.is_empty() {
                    continue;
                }
                self.values.insert(normalized, value);
                n += 1;
            }
        }
        n
    }

    pub fn snapshot(&self) -> DogConfigSnapshot {
        DogConfigSnapshot::new(self.values.clone())
    }
}

/// Immutable, typed view of a [`DogConfig`].
#[derive(Debug, Clone, Default)]
pub struct DogConfigSnapshot {
    map: HashMap<String, String>,
}

impl DogConfigSnapshot {
    pub(crate) fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.trim().parse::<u64>().ok())
    }

    /// Accepts `true/false`, `1/0`, `yes/no`, `on/off`.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)?.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        }
    }
}
