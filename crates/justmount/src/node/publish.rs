//! Publishing: per-consumer bind mounts of the staging mount.

use std::fs;
use std::io;
use std::path::Path;

use justmount_common::{NodeError, NodeResult};

use super::locks::PathLocks;
use super::request::{PublishRequest, UnpublishRequest};
use super::stage::ensure_dir;
use crate::config::{CleanupPolicy, RetryPolicy};
use crate::mount::MountExecutor;

/// Drives publish/unpublish of bind mounts.
#[derive(Debug, Clone)]
pub struct PublishController {
    executor: MountExecutor,
    locks: PathLocks,
    retry: RetryPolicy,
    cleanup: CleanupPolicy,
}

impl PublishController {
    /// Create a controller over `executor`.
    #[must_use]
    pub const fn new(
        executor: MountExecutor,
        locks: PathLocks,
        retry: RetryPolicy,
        cleanup: CleanupPolicy,
    ) -> Self {
        Self {
            executor,
            locks,
            retry,
            cleanup,
        }
    }

    /// Bind-mount the staging path onto the target path.
    ///
    /// Fails with `FailedPrecondition` if the staging path never becomes a
    /// mount point within the retry budget.
    pub async fn publish(&self, req: &PublishRequest) -> NodeResult<()> {
        req.validate()?;
        let staging = req.staging_target_path.as_path();
        let target = req.target_path.as_path();

        tracing::info!("Publishing volume");

        ensure_dir(target)
            .map_err(|e| NodeError::internal(format!("failed to create target path: {e}")))?;

        let _guard = self.locks.lock(target).await;

        self.wait_for_staging(staging).await?;

        if matches!(self.executor.is_mount_point(target), Ok(true)) {
            tracing::info!("Target path already mounted");
            return Ok(());
        }

        self.executor
            .bind(staging, target)
            .map_err(|e| NodeError::internal(format!("failed to bind-mount volume: {e}")))?;

        tracing::info!("Volume published");
        Ok(())
    }

    /// Unmount and remove the target path.
    pub async fn unpublish(&self, req: &UnpublishRequest) -> NodeResult<()> {
        req.validate()?;
        let target = req.target_path.as_path();

        tracing::info!("Unpublishing volume");

        let _guard = self.locks.lock(target).await;

        let unmounted = if self.needs_unmount(target) {
            self.executor.unmount(target).map_err(|e| {
                tracing::warn!(error = %e, "Unmount of target path failed");
                format!("failed to unmount target path: {e}")
            })
        } else {
            tracing::debug!("Target path not mounted, skipping unmount");
            Ok(())
        };

        if unmounted.is_err() && self.cleanup == CleanupPolicy::SkipOnUnmountFailure {
            return unmounted.map_err(NodeError::internal);
        }

        let removed = remove_target(target).map_err(|e| {
            tracing::warn!(error = %e, "Removal of target path failed");
            format!("failed to remove target path: {e}")
        });

        match (unmounted, removed) {
            (Ok(()), Ok(())) => {
                tracing::info!("Volume unpublished");
                Ok(())
            }
            (Err(u), Err(r)) => Err(NodeError::internal(format!("{u}; {r}"))),
            (Err(msg), Ok(())) | (Ok(()), Err(msg)) => Err(NodeError::internal(msg)),
        }
    }

    /// Whether `target` may still be mounted. An unknown state counts as
    /// mounted so a real unmount failure is still reported.
    fn needs_unmount(&self, target: &Path) -> bool {
        if matches!(target.try_exists(), Ok(false)) {
            return false;
        }
        !matches!(self.executor.is_mount_point(target), Ok(false))
    }

    /// Check the staging mount, then retry at fixed intervals.
    async fn wait_for_staging(&self, staging: &Path) -> NodeResult<()> {
        let mut attempt = 0;
        loop {
            let mounted = self.executor.is_mount_point(staging).map_err(|e| {
                NodeError::internal(format!(
                    "failed to verify if staging path is a mount point: {e}"
                ))
            })?;
            if mounted {
                return Ok(());
            }
            if attempt >= self.retry.attempts {
                return Err(NodeError::failed_precondition(
                    "staging_target_path is not a mount point",
                ));
            }
            attempt += 1;
            tracing::debug!(attempt, "Staging path not mounted yet");
            tokio::time::sleep(self.retry.delay).await;
        }
    }
}

fn remove_target(target: &Path) -> io::Result<()> {
    match fs::remove_dir_all(target) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
