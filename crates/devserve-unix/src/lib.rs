//! Unix tree termination: SIGTERM delivery via `nix` and direct-child
//! discovery through the system process table.

mod unix_terminator;

pub use unix_terminator::UnixTreeTerminator;
