use crate::ProcessId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Handle to a running server: either a spawned OS process or code loaded
/// into the host process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerHandle {
    /// A spawned child process, killable by PID.
    Spawned { pid: ProcessId, command: String },
    /// Code loaded in-process; termination is a no-op.
    InProcess { script: String },
}

impl ServerHandle {
    /// Get the process ID (None for in-process handles)
    pub fn pid(&self) -> Option<ProcessId> {
        match self {
            ServerHandle::Spawned { pid, .. } => Some(*pid),
            ServerHandle::InProcess { .. } => None,
        }
    }

    pub fn is_killable(&self) -> bool {
        self.pid().is_some()
    }

    /// Human-readable description of what the handle is running.
    pub fn describe(&self) -> &str {
        match self {
            ServerHandle::Spawned { command, .. } => command,
            ServerHandle::InProcess { script } => script,
        }
    }
}

/// Process-wide table mapping a target name to its live server handle.
///
/// The table outlives any single supervisor instance; live-reload cycles
/// construct fresh supervisors that find the previous child here. A target
/// maps to at most one handle at a time.
#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    inner: Arc<Mutex<HashMap<String, ServerHandle>>>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, target: &str) -> Option<ServerHandle> {
        self.inner.lock().unwrap().get(target).cloned()
    }

    /// Register a handle for a target, displacing any previous one.
    pub fn set(&self, target: impl Into<String>, handle: ServerHandle) {
        self.inner.lock().unwrap().insert(target.into(), handle);
    }

    /// Release a target's entry, returning the handle it held.
    pub fn clear(&self, target: &str) -> Option<ServerHandle> {
        self.inner.lock().unwrap().remove(target)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}
