//! Staging: the single global mount per volume.

use std::fs::{self, DirBuilder, Permissions};
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::Path;

use justmount_common::{NodeError, NodeResult};

use super::locks::PathLocks;
use super::request::{StageRequest, UnstageRequest};
use crate::mount::{MountError, MountExecutor, MountOptions, MountRequest, capability_hint};

/// Drives stage/unstage of the per-volume staging mount.
#[derive(Debug, Clone)]
pub struct StageController {
    executor: MountExecutor,
    locks: PathLocks,
}

impl StageController {
    /// Create a controller over `executor`.
    #[must_use]
    pub const fn new(executor: MountExecutor, locks: PathLocks) -> Self {
        Self { executor, locks }
    }

    /// Mount the volume source at the staging path.
    ///
    /// Succeeds without remounting when the staging path is already a mount
    /// point.
    pub async fn stage(&self, req: &StageRequest) -> NodeResult<()> {
        let params = req.params()?;
        let path = req.staging_target_path.as_path();

        tracing::info!(
            fs_type = %params.fs_type,
            source = %params.source,
            options = %params.mount_options,
            "Staging volume"
        );

        ensure_dir(path)
            .map_err(|e| NodeError::internal(format!("failed to create staging path: {e}")))?;

        let _guard = self.locks.lock(path).await;

        match self.executor.is_mount_point(path) {
            Ok(true) => {
                tracing::info!("Staging path already mounted");
                return Ok(());
            }
            Ok(false) => {}
            Err(err) => {
                tracing::debug!(error = %err, "Mount point check failed, mounting anyway");
            }
        }

        let request = MountRequest {
            source: params.source.clone(),
            target: path.to_path_buf(),
            fs_type: params.fs_type.clone(),
            options: MountOptions::parse(&params.mount_options),
            raw_options: params.mount_options.clone(),
        };

        tracing::debug!(
            flags = ?request.options.flags,
            data = %request.options.data_string(),
            readonly = request.options.readonly(),
            "Mounting staging path"
        );

        let outcome = self.executor.mount(&request).await.map_err(|err| {
            tracing::warn!(
                fs_type = %params.fs_type,
                source = %params.source,
                options = %params.mount_options,
                error = %err,
                "Mount failed"
            );
            mount_failure(&params.fs_type, err)
        })?;

        // mount(2) can reset the directory's permission bits.
        fs::set_permissions(path, Permissions::from_mode(params.file_mode)).map_err(|e| {
            NodeError::internal(format!("failed to set file mode after mount: {e}"))
        })?;

        tracing::info!(?outcome, mode = format_args!("{:o}", params.file_mode), "Volume staged");
        Ok(())
    }

    /// Unmount the staging path.
    ///
    /// Not idempotent: unmounting a path that is not mounted fails.
    pub async fn unstage(&self, req: &UnstageRequest) -> NodeResult<()> {
        req.validate()?;
        let path = req.staging_target_path.as_path();

        let _guard = self.locks.lock(path).await;

        self.executor.unmount(path).map_err(|e| {
            NodeError::internal(format!("failed to unmount staging target path: {e}"))
        })?;

        tracing::info!("Volume unstaged");
        Ok(())
    }
}

/// Create `path` and missing parents with mode 0755.
pub(crate) fn ensure_dir(path: &Path) -> std::io::Result<()> {
    DirBuilder::new().recursive(true).mode(0o755).create(path)
}

fn mount_failure(fs_type: &str, err: MountError) -> NodeError {
    match err {
        MountError::HelperNotFound { .. } | MountError::HelperFailed { .. } => {
            NodeError::internal(format!(
                "failed to mount volume (fsType={fs_type:?}): syscall mount returned ENODEV and \
                 helper failed; ensure mount.{fs_type} is installed in the node image and \
                 /dev/fuse is available, or ensure kernel support for {fs_type}. helper error: {err}"
            ))
        }
        MountError::PermissionDenied { cause } => NodeError::internal(format!(
            "failed to mount volume (fsType={fs_type:?}): permission denied; {}. mount error: {cause}",
            capability_hint()
        )),
        other => NodeError::internal(format!("failed to mount volume (fsType={fs_type:?}): {other}")),
    }
}
