use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Unique identifier for an OS process.
pub type ProcessId = u32;

/// Result of a termination attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationResult {
    /// The termination signal was delivered.
    Success,
    /// The process was not found (already exited).
    ProcessNotFound,
    /// Insufficient privileges to signal the process.
    AccessDenied,
    /// Termination is not implemented on this platform.
    NotSupported,
    /// Operation failed with a specific error message.
    Failed(String),
}

/// Outcome of a direct-children lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildDiscovery {
    /// PIDs of the direct children found.
    Found(Vec<ProcessId>),
    /// No discovery strategy is implemented on this platform.
    NotSupported,
    /// Discovery was attempted and failed.
    Failed(String),
}

/// Discovery and termination of a process tree, one level deep.
///
/// Only direct children of the root are discovered; grandchildren are
/// deliberately not pursued. Failure to find or signal one descendant
/// never aborts termination of its siblings or of the root itself.
#[async_trait]
pub trait TreeTerminator: Send + Sync {
    /// Find the direct children of `pid`, one level only.
    async fn find_direct_children(&self, pid: ProcessId) -> ChildDiscovery;

    /// Send a graceful termination signal to a single process.
    async fn signal(&self, pid: ProcessId) -> TerminationResult;

    /// Terminate the tree rooted at `pid`: discovered children first, then
    /// the root. Discovery and per-child signal failures are logged and
    /// swallowed; a missing root is a debug-level diagnostic, not an error.
    async fn terminate_tree(&self, pid: ProcessId) -> TerminationResult {
        match self.find_direct_children(pid).await {
            ChildDiscovery::Found(children) => {
                for child in children {
                    match self.signal(child).await {
                        TerminationResult::Success | TerminationResult::ProcessNotFound => {}
                        result => {
                            warn!(pid = %child, result = ?result, "Failed to terminate child process");
                        }
                    }
                }
            }
            ChildDiscovery::NotSupported => {
                info!("Child process discovery is not supported on this platform");
            }
            ChildDiscovery::Failed(error) => {
                warn!(pid = %pid, error = %error, "Error discovering child processes");
            }
        }

        match self.signal(pid).await {
            TerminationResult::ProcessNotFound => {
                debug!(pid = %pid, "Process not found.");
                TerminationResult::ProcessNotFound
            }
            result => result,
        }
    }
}

/// Terminator for platforms with neither a discovery strategy nor a
/// signaling primitive. Discovery reports `NotSupported`; signaling logs a
/// notice and reports `NotSupported`.
pub struct UnsupportedTreeTerminator;

#[async_trait]
impl TreeTerminator for UnsupportedTreeTerminator {
    async fn find_direct_children(&self, _pid: ProcessId) -> ChildDiscovery {
        ChildDiscovery::NotSupported
    }

    async fn signal(&self, pid: ProcessId) -> TerminationResult {
        warn!(pid = %pid, "Process termination is not supported on this platform");
        TerminationResult::NotSupported
    }
}
