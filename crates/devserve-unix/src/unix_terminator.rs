#[cfg(unix)]
mod unix_impl {
    use async_trait::async_trait;
    use devserve_core::{ChildDiscovery, ProcessId, TerminationResult, TreeTerminator};
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid as NixPid;
    use std::sync::Mutex;
    use sysinfo::System;
    use tracing::{debug, info, warn};

    /// Unix terminator: SIGTERM delivery plus direct-child discovery
    /// through the system process table.
    pub struct UnixTreeTerminator {
        system: Mutex<System>,
    }

    impl UnixTreeTerminator {
        pub fn new() -> Self {
            Self {
                system: Mutex::new(System::new()),
            }
        }
    }

    impl Default for UnixTreeTerminator {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl TreeTerminator for UnixTreeTerminator {
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
            let nix_pid = NixPid::from_raw(pid as i32);

            match signal::kill(nix_pid, Signal::SIGTERM) {
                Ok(()) => {
                    info!(pid = %pid, "Sent SIGTERM to process");
                    TerminationResult::Success
                }
                Err(nix::errno::Errno::ESRCH) => {
                    debug!(pid = %pid, "Process not found (already terminated)");
                    TerminationResult::ProcessNotFound
                }
                Err(nix::errno::Errno::EPERM) => {
                    warn!(pid = %pid, "Permission denied to terminate process");
                    TerminationResult::AccessDenied
                }
                Err(e) => {
                    warn!(pid = %pid, error = %e, "Failed to send SIGTERM to process");
                    TerminationResult::Failed(format!("SIGTERM failed: {e}"))
                }
            }
        }
    }

}

#[cfg(unix)]
pub use unix_impl::UnixTreeTerminator;

// Stub so the crate still compiles on non-Unix systems.
#[cfg(not(unix))]
pub struct UnixTreeTerminator;

#[cfg(not(unix))]
impl UnixTreeTerminator {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(not(unix))]
impl Default for UnixTreeTerminator {
    fn default() -> Self {
        Self::new()
    }
}
