//! Windows tree termination: graceful `taskkill` signaling and
//! direct-child discovery through the system process table.

mod windows_terminator;

pub use windows_terminator::WindowsTreeTerminator;
