//! Mount backends.

use std::ffi::{CString, OsStr};
use std::fmt;
use std::io;
use std::path::Path;

use rustix::mount::{MountFlags, UnmountFlags};

use super::table::MountTableReader;

/// Primitive mount operations, swappable between the real kernel and an
/// in-memory fake.
pub trait Mounter: Send + Sync + fmt::Debug {
    /// Mount `source` on `target`. The source is passed to the kernel
    /// byte for byte.
    fn mount(
        &self,
        source: &OsStr,
        target: &Path,
        fstype: &str,
        flags: MountFlags,
        data: &str,
    ) -> io::Result<()>;

    /// Unmount `target`.
    fn unmount(&self, target: &Path, flags: UnmountFlags) -> io::Result<()>;

    /// Whether `path` is currently a mount point.
    fn is_mount_point(&self, path: &Path) -> io::Result<bool>;
}

/// Production backend calling mount(2)/umount2(2) directly.
#[derive(Debug, Clone, Default)]
pub struct SyscallMounter {
    table: MountTableReader,
}

impl SyscallMounter {
    /// Create a backend that reads mount state from `table`.
    #[must_use]
    pub const fn new(table: MountTableReader) -> Self {
        Self { table }
    }
}

impl Mounter for SyscallMounter {
    fn mount(
        &self,
        source: &OsStr,
        target: &Path,
        fstype: &str,
        flags: MountFlags,
        data: &str,
    ) -> io::Result<()> {
        tracing::debug!(
            source = %source.to_string_lossy(),
            target = %target.display(),
            fstype,
            ?flags,
            data,
            "Mounting filesystem"
        );

        let fstype_c =
            CString::new(fstype).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let data_c =
            CString::new(data).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        rustix::mount::mount(source, target, fstype_c.as_c_str(), flags, data_c.as_c_str())
            .map_err(io::Error::from)
    }

    fn unmount(&self, target: &Path, flags: UnmountFlags) -> io::Result<()> {
        tracing::debug!(target = %target.display(), ?flags, "Unmounting filesystem");

        rustix::mount::unmount(target, flags).map_err(io::Error::from)
    }

    fn is_mount_point(&self, path: &Path) -> io::Result<bool> {
        self.table.is_mount_point(path)
    }
}
