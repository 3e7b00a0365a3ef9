//! # Configuration
//!
//! A string key/value store on the app, mirroring Feathers' `app.set()` /
//! `app.get()`. Hooks see an immutable [`CrmConfigSnapshot`] taken when the
//! call starts.
//!
//! ```rust
//! use crm_core::CrmApp;
//! let app = CrmApp::<(), ()>::new();
//!
//! app.set("mail.from", "crm@example.com");
//! assert_eq!(app.get("mail.from"), Some("crm@example.com".to_string()));
//! ```
//!
//! Environment overrides use a prefix and `__` as the path separator:
//! `CRM__MAIL__FROM=ops@example.com` becomes `mail.from`.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct CrmConfig {
    values: HashMap<String, String>,
}

impl CrmConfig {
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

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Copy every `PREFIX__A__B=v` pair into `a.b = v`.
    pub fn load_env_vars<I>(&mut self, prefix: &str, vars: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut loaded = 0;
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(prefix) {
                let normalized = stripped.trim_start_matches('_').to_lowercase().replace("__", ".");
                if normalized.is_empty() {
                    continue;
                }
                self.set(normalized, value);
                loaded += 1;
            }
        }
        loaded
    }

    pub fn snapshot(&self) -> CrmConfigSnapshot {
        CrmConfigSnapshot::new(self.values.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CrmConfigSnapshot {
    map: HashMap<String, String>,
}

impl CrmConfigSnapshot {
    pub(crate) fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.parse::<usize>().ok())
    }

    /// Comma separated list, blanks dropped.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default()
    }
}
