//! Well-known paths and defaults for the node plugin.

use std::path::PathBuf;

use once_cell::sync::Lazy;

/// Name the plugin registers with the orchestrator.
pub const DRIVER_NAME: &str = "justmount.csi.driver";

/// Vendor version reported by the identity service.
pub const DRIVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Endpoint the plugin serves on when none is configured.
pub const DEFAULT_ENDPOINT: &str = "unix:///var/lib/kubelet/plugins/justmount/csi.sock";

/// Live mount table of the calling process.
pub const DEFAULT_MOUNT_TABLE: &str = "/proc/self/mountinfo";

/// Directories probed for `mount.<fstype>` helpers when `PATH` has none.
pub const HELPER_SEARCH_DIRS: &[&str] = &[
    "/sbin",
    "/usr/sbin",
    "/bin",
    "/usr/bin",
    "/usr/local/sbin",
    "/usr/local/bin",
];

/// Context key holding the fallback filesystem type.
pub const CTX_FS_TYPE: &str = "fsType";
/// Context key holding the octal permission mask applied after staging.
pub const CTX_FILE_MODE: &str = "fileMode";
/// Context key holding the mount source.
pub const CTX_SOURCE: &str = "source";
/// Context key holding comma-separated mount options.
pub const CTX_MOUNT_OPTIONS: &str = "mountOptions";

/// Endpoint, overridable with `CSI_ENDPOINT`.
pub static ENDPOINT: Lazy<String> =
    Lazy::new(|| std::env::var("CSI_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()));

/// Host name of this node, or `unknown`.
pub static HOST_NAME: Lazy<String> = Lazy::new(|| {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .ok()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok().filter(|h| !h.is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
});

/// Default helper search directories as owned paths.
#[must_use]
pub fn helper_search_dirs() -> Vec<PathBuf> {
    HELPER_SEARCH_DIRS.iter().map(PathBuf::from).collect()
}
