//! Devserve - supervised dev-server lifecycle for task runners
//!
//! A single-process supervisor that starts a managed server child
//! (background or foreground mode), tracks it by target name in a
//! process-wide registry, and guarantees clean teardown - direct child
//! processes included - before signaling completion to the caller.
//! Environment variables injected for the child (PORT, NODE_ENV) are
//! restored from a snapshot when the cycle ends.

mod monitor;
mod platform;
mod supervisor;

pub use platform::{platform_name, platform_terminator};
pub use supervisor::{Supervisor, SupervisorState};

// Re-export core functionality
pub use devserve_core::*;
