//! In-memory mount backend and helper for tests and dry runs.

use std::collections::{HashMap, HashSet};
use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use rustix::mount::{MountFlags, UnmountFlags};

use super::error::MountError;
use super::helper::{HelperInvocation, MountHelper};
use super::mounter::Mounter;
use super::table::clean_path;

/// A call recorded by [`FakeMounter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountCall {
    /// A mount call.
    Mount {
        /// Mount source.
        source: OsString,
        /// Mount target.
        target: PathBuf,
        /// Filesystem type (empty for bind mounts).
        fstype: String,
        /// Flags passed.
        flags: MountFlags,
        /// Data string passed.
        data: String,
    },
    /// An unmount call.
    Unmount {
        /// Unmount target.
        target: PathBuf,
    },
}

#[derive(Debug, Default)]
struct FakeState {
    mounted: HashSet<PathBuf>,
    /// Paths that become mounted once queried this many more times.
    pending: HashMap<PathBuf, usize>,
    calls: Vec<MountCall>,
    queries: usize,
    mount_errno: Option<i32>,
    unmount_errno: Option<i32>,
}

/// Mount backend that keeps its mount table in memory.
///
/// Successful mounts mark the target mounted; unmounts clear it. Failures
/// can be scripted per operation with a raw OS error number.
#[derive(Debug, Default)]
pub struct FakeMounter {
    state: Mutex<FakeState>,
}

impl FakeMounter {
    /// Create an empty fake.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent mount fail with `errno`.
    #[must_use]
    pub fn failing_mount(self, errno: i32) -> Self {
        self.state.lock().mount_errno = Some(errno);
        self
    }

    /// Make every subsequent unmount fail with `errno`.
    #[must_use]
    pub fn failing_unmount(self, errno: i32) -> Self {
        self.state.lock().unmount_errno = Some(errno);
        self
    }

    /// Mark `path` mounted without recording a call.
    pub fn mark_mounted(&self, path: impl AsRef<Path>) {
        self.state.lock().mounted.insert(clean_path(path.as_ref()));
    }

    /// Report `path` as mounted only after it has been queried `queries`
    /// times, simulating asynchronous mount propagation.
    pub fn mount_after_queries(&self, path: impl AsRef<Path>, queries: usize) {
        self.state
            .lock()
            .pending
            .insert(clean_path(path.as_ref()), queries);
    }

    /// Recorded calls, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<MountCall> {
        self.state.lock().calls.clone()
    }

    /// Number of recorded mount calls.
    #[must_use]
    pub fn mount_count(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, MountCall::Mount { .. }))
            .count()
    }

    /// Number of mount-point queries answered.
    #[must_use]
    pub fn query_count(&self) -> usize {
        self.state.lock().queries
    }
}

impl Mounter for FakeMounter {
    fn mount(
        &self,
        source: &OsStr,
        target: &Path,
        fstype: &str,
        flags: MountFlags,
        data: &str,
    ) -> io::Result<()> {
        let mut state = self.state.lock();
        state.calls.push(MountCall::Mount {
            source: source.to_os_string(),
            target: target.to_path_buf(),
            fstype: fstype.to_string(),
            flags,
            data: data.to_string(),
        });
        if let Some(errno) = state.mount_errno {
            return Err(io::Error::from_raw_os_error(errno));
        }
        state.mounted.insert(clean_path(target));
        Ok(())
    }

    fn unmount(&self, target: &Path, _flags: UnmountFlags) -> io::Result<()> {
        let mut state = self.state.lock();
        state.calls.push(MountCall::Unmount {
            target: target.to_path_buf(),
        });
        if let Some(errno) = state.unmount_errno {
            return Err(io::Error::from_raw_os_error(errno));
        }
        if state.mounted.remove(&clean_path(target)) {
            Ok(())
        } else {
            Err(io::Error::from_raw_os_error(libc::EINVAL))
        }
    }

    fn is_mount_point(&self, path: &Path) -> io::Result<bool> {
        let path = clean_path(path);
        let mut state = self.state.lock();
        state.queries += 1;

        if let Some(remaining) = state.pending.get_mut(&path) {
            if *remaining == 0 {
                state.pending.remove(&path);
                state.mounted.insert(path.clone());
            } else {
                *remaining -= 1;
                return Ok(false);
            }
        }
        Ok(state.mounted.contains(&path))
    }
}

/// Helper strategy that records invocations instead of spawning programs.
#[derive(Debug, Default)]
pub struct RecordingHelper {
    invocations: Mutex<Vec<HelperInvocation>>,
    exit_code: Option<i32>,
}

impl RecordingHelper {
    /// A helper that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A helper that always exits with `code`.
    #[must_use]
    pub fn failing(code: i32) -> Self {
        Self {
            invocations: Mutex::new(Vec::new()),
            exit_code: Some(code),
        }
    }

    /// Invocations seen so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<HelperInvocation> {
        self.invocations.lock().clone()
    }
}

#[async_trait]
impl MountHelper for RecordingHelper {
    async fn run(&self, invocation: &HelperInvocation) -> Result<(), MountError> {
        self.invocations.lock().push(invocation.clone());
        match self.exit_code {
            None => Ok(()),
            Some(code) => Err(MountError::HelperFailed {
                program: invocation.program(),
                status: format!("exit status: {code}"),
                output: String::new(),
            }),
        }
    }
}
