use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Immutable copy of the environment taken before a child starts.
///
/// A snapshot never aliases the live table: mutations to either side after
/// capture do not affect the other.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn vars(&self) -> &HashMap<String, String> {
        &self.vars
    }
}

/// Shared, mutable environment mapping scoped to the host process.
///
/// The supervisor mutates this table for the child (PORT, NODE_ENV) and
/// passes copies of its contents to spawn calls; the ambient process
/// environment is never touched. Multiple targets sharing one table and
/// mutating the same keys concurrently must be serialized by the caller.
#[derive(Clone, Default)]
pub struct EnvTable {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl EnvTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table populated from the host process environment.
    pub fn from_process_env() -> Self {
        Self {
            inner: Arc::new(Mutex::new(std::env::vars().collect())),
        }
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.lock().unwrap().insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().unwrap().get(key).cloned()
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.inner.lock().unwrap().remove(key)
    }

    /// Deep copy of the current mapping, for handing to spawn calls.
    pub fn to_map(&self) -> HashMap<String, String> {
        self.inner.lock().unwrap().clone()
    }

    /// Deep-copy the current mapping into a snapshot.
    ///
    /// If the copy lacks a case-exact `PATH` entry but holds a
    /// differently-cased variant (seen as `Path` on Windows), the variant
    /// is renamed to `PATH` in the snapshot and the original removed, so
    /// case-sensitive consumers keep working after a restore.
    pub fn capture(&self) -> EnvSnapshot {
        let mut vars = self.inner.lock().unwrap().clone();

        if !vars.contains_key("PATH") {
            let variant = vars
                .keys()
                .find(|key| key.eq_ignore_ascii_case("PATH"))
                .cloned();
            if let Some(variant) = variant {
                if let Some(value) = vars.remove(&variant) {
                    debug!(renamed = %variant, "Normalized PATH casing in environment snapshot");
                    vars.insert("PATH".to_string(), value);
                }
            }
        }

        EnvSnapshot { vars }
    }

    /// Replace the live mapping wholesale with a deep copy of the snapshot.
    ///
    /// Keys added since the capture (e.g. the injected PORT) are discarded;
    /// nothing is merged.
    pub fn restore(&self, snapshot: &EnvSnapshot) {
        *self.inner.lock().unwrap() = snapshot.vars.clone();
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            inner: Arc::new(Mutex::new(
                iter.into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            )),
        }
    }
}

impl fmt::Debug for EnvTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvTable")
            .field("len", &self.inner.lock().unwrap().len())
            .finish()
    }
}
