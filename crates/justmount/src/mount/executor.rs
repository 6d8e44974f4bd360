//! Mount execution with helper-program fallback.

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustix::mount::{MountFlags, UnmountFlags};

use super::error::MountError;
use super::helper::{HelperInvocation, MountHelper};
use super::mounter::Mounter;
use super::options::MountOptions;

/// A resolved mount to perform.
#[derive(Debug, Clone)]
pub struct MountRequest {
    /// Mount source.
    pub source: String,
    /// Mount target.
    pub target: PathBuf,
    /// Filesystem type.
    pub fs_type: String,
    /// Parsed flags and data.
    pub options: MountOptions,
    /// Option string as supplied, forwarded verbatim to helpers.
    pub raw_options: String,
}

/// How a mount was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountOutcome {
    /// The kernel mounted it directly.
    Kernel,
    /// An external `mount.<fstype>` helper mounted it.
    Helper,
}

/// Performs mounts through a [`Mounter`] backend, falling back to a
/// [`MountHelper`] when the kernel lacks a driver.
#[derive(Debug, Clone)]
pub struct MountExecutor {
    mounter: Arc<dyn Mounter>,
    helper: Arc<dyn MountHelper>,
}

impl MountExecutor {
    /// Create an executor over the given backend and helper strategy.
    pub fn new(mounter: Arc<dyn Mounter>, helper: Arc<dyn MountHelper>) -> Self {
        Self { mounter, helper }
    }

    /// Mount `request`, retrying through the helper on "no such device".
    pub async fn mount(&self, request: &MountRequest) -> Result<MountOutcome, MountError> {
        let data = request.options.data_string();
        let Err(err) = self.mounter.mount(
            OsStr::new(&request.source),
            &request.target,
            &request.fs_type,
            request.options.flags,
            &data,
        ) else {
            return Ok(MountOutcome::Kernel);
        };

        match MountError::classify(err, &request.fs_type) {
            MountError::NoSuchDevice { .. } => {
                tracing::info!(
                    fs_type = %request.fs_type,
                    source = %request.source,
                    target = %request.target.display(),
                    options = %request.raw_options,
                    "Kernel mount returned ENODEV, trying helper"
                );

                let invocation = HelperInvocation {
                    fs_type: request.fs_type.clone(),
                    source: request.source.clone(),
                    target: request.target.clone(),
                    options: request.raw_options.clone(),
                };
                self.helper.run(&invocation).await?;

                tracing::info!(
                    helper = %invocation.program(),
                    target = %request.target.display(),
                    "Mount helper succeeded"
                );
                Ok(MountOutcome::Helper)
            }
            other => Err(other),
        }
    }

    /// Bind-mount `source` onto `target`.
    pub fn bind(&self, source: &Path, target: &Path) -> io::Result<()> {
        tracing::debug!(
            source = %source.display(),
            target = %target.display(),
            "Creating bind mount"
        );

        self.mounter
            .mount(source.as_os_str(), target, "", MountFlags::BIND, "")
    }

    /// Unmount `target`. Errors are returned unclassified.
    pub fn unmount(&self, target: &Path) -> io::Result<()> {
        self.mounter.unmount(target, UnmountFlags::empty())
    }

    /// Whether `path` is currently a mount point.
    pub fn is_mount_point(&self, path: &Path) -> io::Result<bool> {
        self.mounter.is_mount_point(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount::fake::{FakeMounter, MountCall, RecordingHelper};

    fn request(fs_type: &str, options: &str) -> MountRequest {
        MountRequest {
            source: "gluster:media".to_string(),
            target: PathBuf::from("/stage/vol"),
            fs_type: fs_type.to_string(),
            options: MountOptions::parse(options),
            raw_options: options.to_string(),
        }
    }

    #[tokio::test]
    async fn kernel_mount_passes_flags_and_data() {
        let fake = Arc::new(FakeMounter::new());
        let helper = Arc::new(RecordingHelper::new());
        let executor = MountExecutor::new(fake.clone(), helper.clone());

        let outcome = executor
            .mount(&request("tmpfs", "ro,size=1m"))
            .await
            .unwrap();

        assert_eq!(outcome, MountOutcome::Kernel);
        assert!(helper.invocations().is_empty());
        assert_eq!(
            fake.calls(),
            vec![MountCall::Mount {
                source: "gluster:media".into(),
                target: PathBuf::from("/stage/vol"),
                fstype: "tmpfs".to_string(),
                flags: MountFlags::RDONLY,
                data: "size=1m".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn enodev_falls_back_to_helper() {
        let fake = Arc::new(FakeMounter::new().failing_mount(libc::ENODEV));
        let helper = Arc::new(RecordingHelper::new());
        let executor = MountExecutor::new(fake, helper.clone());

        let outcome = executor
            .mount(&request("glusterfs", "rw,allow_other"))
            .await
            .unwrap();

        assert_eq!(outcome, MountOutcome::Helper);
        assert_eq!(
            helper.invocations(),
            vec![HelperInvocation {
                fs_type: "glusterfs".to_string(),
                source: "gluster:media".to_string(),
                target: PathBuf::from("/stage/vol"),
                options: "rw,allow_other".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn helper_failure_is_hard() {
        let fake = Arc::new(FakeMounter::new().failing_mount(libc::ENODEV));
        let executor = MountExecutor::new(fake, Arc::new(RecordingHelper::failing(32)));

        let err = executor.mount(&request("glusterfs", "")).await.unwrap_err();
        assert!(matches!(err, MountError::HelperFailed { .. }));
    }

    #[tokio::test]
    async fn other_errors_skip_helper() {
        let fake = Arc::new(FakeMounter::new().failing_mount(libc::EPERM));
        let helper = Arc::new(RecordingHelper::new());
        let executor = MountExecutor::new(fake, helper.clone());

        let err = executor.mount(&request("glusterfs", "")).await.unwrap_err();
        assert!(matches!(err, MountError::PermissionDenied { .. }));
        assert!(helper.invocations().is_empty());
    }

    #[test]
    fn bind_uses_bind_flag() {
        let fake = Arc::new(FakeMounter::new());
        let executor = MountExecutor::new(fake.clone(), Arc::new(RecordingHelper::new()));

        executor
            .bind(Path::new("/stage/vol"), Path::new("/pods/a"))
            .unwrap();

        assert!(executor.is_mount_point(Path::new("/pods/a")).unwrap());
        assert!(matches!(
            &fake.calls()[0],
            MountCall::Mount { flags, fstype, .. } if *flags == MountFlags::BIND && fstype.is_empty()
        ));
    }

    #[test]
    fn bind_passes_non_utf8_source_unchanged() {
        use std::os::unix::ffi::OsStrExt;

        let fake = Arc::new(FakeMounter::new());
        let executor = MountExecutor::new(fake.clone(), Arc::new(RecordingHelper::new()));
        let source = Path::new(OsStr::from_bytes(b"/stage/vol-\xff"));

        executor.bind(source, Path::new("/pods/a")).unwrap();

        match &fake.calls()[0] {
            MountCall::Mount { source: passed, .. } => {
                assert_eq!(passed.as_bytes(), b"/stage/vol-\xff");
            }
            other => panic!("unexpected call {other:?}"),
        }
    }
}
