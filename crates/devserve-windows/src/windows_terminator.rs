#[cfg(windows)]
mod windows_impl {
    use async_trait::async_trait;
    use devserve_core::{ChildDiscovery, ProcessId, TerminationResult, TreeTerminator};
    use std::sync::Mutex;
    use sysinfo::System;
    use tokio::process::Command;
    use tracing::{debug, info, warn};

    /// Windows terminator: graceful `taskkill` per PID plus direct-child
    /// discovery through the system process table.
    pub struct WindowsTreeTerminator {
        system: Mutex<System>,
    }

    impl WindowsTreeTerminator {
        pub fn new() -> Self {
            Self {
                system: Mutex::new(System::new()),
            }
        }

        /// Ask `taskkill` to terminate a single process. Without `/F` the
        /// process receives a close request rather than a hard kill.
        async fn taskkill(&self, pid: ProcessId) -> TerminationResult {
            let pid_string = pid.to_string();
            let output = match Command::new("taskkill")
                .args(["/PID", &pid_string])
                .output()
                .await
            {
                Ok(output) => output,
                Err(e) => {
                    warn!(pid = %pid, error = %e, "Failed to run taskkill");
                    return TerminationResult::Failed(format!("taskkill failed: {e}"));
                }
            };

            if output.status.success() {
                info!(pid = %pid, "Sent termination request to process");
                return TerminationResult::Success;
            }

            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("not found") {
                debug!(pid = %pid, "Process not found (already terminated)");
                TerminationResult::ProcessNotFound
            } else if stderr.contains("Access is denied") {
                warn!(pid = %pid, "Permission denied to terminate process");
                TerminationResult::AccessDenied
            } else {
                warn!(pid = %pid, stderr = %stderr, "taskkill reported an error");
                TerminationResult::Failed(format!("taskkill: {}", stderr.trim()))
            }
        }
    }

    impl Default for WindowsTreeTerminator {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl TreeTerminator for WindowsTreeTerminator {
        async fn find_direct_children(&self, pid: ProcessId) -> ChildDiscovery {
            let mut system = self.system.lock().unwrap();
            system.refresh_processes_specifics(
                sysinfo::ProcessesToUpdate::All,
                true,
                sysinfo::ProcessRefreshKind::default(),
            );

            // One level only; grandchildren are not pursued.
            let children: Vec<ProcessId> = system
                .processes()
                .iter()
                .filter(|(_, process)| {
                    process.parent().map(|parent| parent.as_u32()) == Some(pid)
                })
                .map(|(child, _)| child.as_u32())
                .collect();

            debug!(pid = %pid, count = children.len(), "Discovered direct child processes");
            ChildDiscovery::Found(children)
        }

        async fn signal(&self, pid: ProcessId) -> TerminationResult {
            self.taskkill(pid).await
        }
    }
}

#[cfg(windows)]
pub use windows_impl::WindowsTreeTerminator;

// Stub so the crate still compiles on non-Windows systems.
#[cfg(not(windows))]
pub struct WindowsTreeTerminator;

#[cfg(not(windows))]
impl WindowsTreeTerminator {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(not(windows))]
impl Default for WindowsTreeTerminator {
    fn default() -> Self {
        Self::new()
    }
}
