use devserve_core::TreeTerminator;
use std::sync::Arc;

/// Select the tree terminator for the current platform at compile time.
///
/// Platforms with neither signal delivery nor process-table discovery get
/// the core stub, which logs a "not supported" notice instead of failing.
pub fn platform_terminator() -> Arc<dyn TreeTerminator> {
    #[cfg(unix)]
    return Arc::new(devserve_unix::UnixTreeTerminator::new());

    #[cfg(windows)]
    return Arc::new(devserve_windows::WindowsTreeTerminator::new());

    #[cfg(not(any(unix, windows)))]
    return Arc::new(devserve_core::UnsupportedTreeTerminator);
}

/// Get the platform name for logging and debugging
pub fn platform_name() -> &'static str {
    #[cfg(unix)]
    return "unix";

    #[cfg(windows)]
    return "windows";

    #[cfg(not(any(unix, windows)))]
    return "unsupported";
}
