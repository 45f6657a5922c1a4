//! Daemon root directory and socket path defaults

use std::path::{Path, PathBuf};

/// Name of the Unix socket inside the daemon root.
pub const SOCKET_NAME: &str = "daemon.socket";

/// Default daemon root when neither `--root` nor `CRADLE_ROOT` is given.
pub const DEFAULT_ROOT: &str = "/var/lib/cradle";

/// Get the daemon root from the `CRADLE_ROOT` env var or the system default
///
/// Returns:
/// - `$CRADLE_ROOT` if set (for development)
/// - `/var/lib/cradle` otherwise (production)
pub fn default_root() -> PathBuf {
    std::env::var("CRADLE_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_ROOT))
}

/// Socket path for a given daemon root.
#[must_use]
pub fn socket_path(root: &Path) -> PathBuf {
    root.join(SOCKET_NAME)
}
