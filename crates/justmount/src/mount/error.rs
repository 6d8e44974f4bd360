//! Classified mount failures.

use std::io;

use thiserror::Error;

/// A failed mount attempt, classified so callers can give actionable advice.
#[derive(Error, Debug)]
pub enum MountError {
    /// The kernel has no built-in driver for the filesystem type.
    #[error("no such device: kernel has no driver for fsType {fs_type:?}")]
    NoSuchDevice {
        /// Requested filesystem type.
        fs_type: String,
        /// Underlying OS error.
        #[source]
        cause: io::Error,
    },

    /// Insufficient privilege or a missing capability.
    #[error("permission denied: {cause}")]
    PermissionDenied {
        /// Underlying OS error.
        #[source]
        cause: io::Error,
    },

    /// No `mount.<fstype>` helper could be located.
    #[error("mount helper {program} not found in PATH or {searched}")]
    HelperNotFound {
        /// Helper program name.
        program: String,
        /// Directories probed after `PATH`.
        searched: String,
    },

    /// The helper ran and exited unsuccessfully.
    #[error("mount helper {program} failed ({status}): {output}")]
    HelperFailed {
        /// Helper program name.
        program: String,
        /// Exit status description.
        status: String,
        /// Combined stdout/stderr, trimmed.
        output: String,
    },

    /// Any other OS failure.
    #[error("{0}")]
    Os(#[from] io::Error),
}

impl MountError {
    /// Classify an OS error returned by a mount call.
    #[must_use]
    pub fn classify(err: io::Error, fs_type: &str) -> Self {
        if is_no_such_device(&err) {
            Self::NoSuchDevice {
                fs_type: fs_type.to_string(),
                cause: err,
            }
        } else if is_permission_error(&err) {
            Self::PermissionDenied { cause: err }
        } else {
            Self::Os(err)
        }
    }
}

/// Whether the error means the kernel lacks a driver for the fs type.
#[must_use]
pub fn is_no_such_device(err: &io::Error) -> bool {
    if err.raw_os_error() == Some(libc::ENODEV) {
        return true;
    }
    err.to_string().to_lowercase().contains("no such device")
}

/// Whether the error means the caller lacks privilege.
#[must_use]
pub fn is_permission_error(err: &io::Error) -> bool {
    if matches!(err.raw_os_error(), Some(libc::EPERM | libc::EACCES)) {
        return true;
    }
    let msg = err.to_string().to_lowercase();
    msg.contains("permission denied") || msg.contains("operation not permitted")
}

/// Advice naming the capability a privileged mount needs.
#[must_use]
pub fn capability_hint() -> String {
    use caps::{CapSet, Capability};

    match caps::has_cap(None, CapSet::Effective, Capability::CAP_SYS_ADMIN) {
        Ok(true) => "the process holds CAP_SYS_ADMIN; check seccomp/AppArmor policy and that \
                     /dev/fuse is available for FUSE filesystems"
            .to_string(),
        Ok(false) => "the process lacks CAP_SYS_ADMIN; run the node plugin privileged or grant \
                      CAP_SYS_ADMIN, and make /dev/fuse available for FUSE filesystems"
            .to_string(),
        Err(err) => {
            tracing::debug!(error = %err, "Unable to read effective capabilities");
            "ensure the node plugin has CAP_SYS_ADMIN (or is privileged), and /dev/fuse is \
             available for FUSE filesystems"
                .to_string()
        }
    }
}
