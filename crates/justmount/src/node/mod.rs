//! Node service: the volume stage/publish lifecycle.
//!
//! This module handles:
//! - Request validation
//! - Staging mounts and their teardown
//! - Per-consumer bind mounts and their teardown
//! - Identity and capability reporting
//!
//! Every operation takes an explicit [`RequestContext`] that carries the
//! request's logging span.

mod context;
mod identity;
mod locks;
mod publish;
mod request;
mod stage;

use std::path::Path;
use std::sync::Arc;

pub use context::{REQUEST_ID_KEYS, RequestContext, request_id_from};
pub use identity::{
    NodeCapability, NodeInfo, PluginCapability, PluginInfo, node_capabilities, plugin_capabilities,
    plugin_info, probe,
};
pub use locks::PathLocks;
pub use publish::PublishController;
pub use request::{
    MountVolume, PublishRequest, StageParams, StageRequest, UnpublishRequest,
    UnstageRequest, VolumeCapability, VolumeContext, parse_file_mode,
};
pub use stage::StageController;

use justmount_common::NodeResult;

use crate::config::NodeConfig;
use crate::mount::{
    ExecMountHelper, MountExecutor, MountHelper, MountTableReader, Mounter, SyscallMounter,
};

/// The node half of the plugin.
#[derive(Debug, Clone)]
pub struct NodeService {
    node_id: String,
    executor: MountExecutor,
    stage: StageController,
    publish: PublishController,
}

impl NodeService {
    /// Create a service that mounts through the kernel and spawns real
    /// helper programs.
    #[must_use]
    pub fn from_config(config: &NodeConfig) -> Self {
        let mounter = SyscallMounter::new(MountTableReader::new(config.mount_table.clone()));
        let helper = ExecMountHelper::new(config.helper_search_dirs.clone());
        Self::with_backend(config, Arc::new(mounter), Arc::new(helper))
    }

    /// Create a service over an arbitrary mount backend and helper.
    #[must_use]
    pub fn with_backend(
        config: &NodeConfig,
        mounter: Arc<dyn Mounter>,
        helper: Arc<dyn MountHelper>,
    ) -> Self {
        let executor = MountExecutor::new(mounter, helper);
        let locks = PathLocks::new(config.serialize_paths);
        Self {
            node_id: config.node_id.clone(),
            stage: StageController::new(executor.clone(), locks.clone()),
            publish: PublishController::new(
                executor.clone(),
                locks,
                config.staging_check,
                config.unpublish_cleanup,
            ),
            executor,
        }
    }

    /// Identifier of this node.
    #[must_use]
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Node description reported to the orchestrator.
    #[must_use]
    pub fn node_get_info(&self) -> NodeInfo {
        NodeInfo {
            node_id: self.node_id.clone(),
        }
    }

    /// Capabilities of the node service.
    #[must_use]
    pub fn node_get_capabilities(&self) -> Vec<NodeCapability> {
        node_capabilities()
    }

    /// Start a logging context for `method` on this node.
    #[must_use]
    pub fn context(&self, method: &'static str, metadata: &VolumeContext) -> RequestContext {
        RequestContext::new(method, &self.node_id, metadata)
    }

    /// Mount the volume at its staging path.
    pub async fn node_stage_volume(
        &self,
        ctx: &RequestContext,
        req: &StageRequest,
    ) -> NodeResult<()> {
        ctx.record_volume(&req.volume_id);
        ctx.record_path("staging_target_path", &req.staging_target_path);
        ctx.run(self.stage.stage(req)).await
    }

    /// Unmount the volume's staging path.
    pub async fn node_unstage_volume(
        &self,
        ctx: &RequestContext,
        req: &UnstageRequest,
    ) -> NodeResult<()> {
        ctx.record_volume(&req.volume_id);
        ctx.record_path("staging_target_path", &req.staging_target_path);
        ctx.run(self.stage.unstage(req)).await
    }

    /// Bind-mount the staged volume at a target path.
    pub async fn node_publish_volume(
        &self,
        ctx: &RequestContext,
        req: &PublishRequest,
    ) -> NodeResult<()> {
        ctx.record_volume(&req.volume_id);
        ctx.record_path("staging_target_path", &req.staging_target_path);
        ctx.record_path("target_path", &req.target_path);
        ctx.run(self.publish.publish(req)).await
    }

    /// Unmount and remove a target path.
    pub async fn node_unpublish_volume(
        &self,
        ctx: &RequestContext,
        req: &UnpublishRequest,
    ) -> NodeResult<()> {
        ctx.record_volume(&req.volume_id);
        ctx.record_path("target_path", &req.target_path);
        ctx.run(self.publish.unpublish(req)).await
    }

    /// Always `Unimplemented`.
    pub async fn node_get_volume_stats(
        &self,
        ctx: &RequestContext,
        volume_id: &str,
        volume_path: &Path,
    ) -> NodeResult<()> {
        ctx.record_volume(volume_id);
        ctx.run(async { identity::node_get_volume_stats(volume_id, volume_path) })
            .await
    }

    /// Always `Unimplemented`.
    pub async fn node_expand_volume(
        &self,
        ctx: &RequestContext,
        volume_id: &str,
        volume_path: &Path,
    ) -> NodeResult<()> {
        ctx.record_volume(volume_id);
        ctx.run(async { identity::node_expand_volume(volume_id, volume_path) })
            .await
    }

    /// Whether `path` is currently a mount point.
    pub fn is_mount_point(&self, path: &Path) -> NodeResult<bool> {
        Ok(self.executor.is_mount_point(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount::fake::{FakeMounter, RecordingHelper};
    use justmount_common::StatusCode;

    fn service() -> (NodeService, Arc<FakeMounter>) {
        let fake = Arc::new(FakeMounter::new());
        let config = NodeConfig::default().with_node_id("node-1");
        let service =
            NodeService::with_backend(&config, fake.clone(), Arc::new(RecordingHelper::new()));
        (service, fake)
    }

    #[test]
    fn reports_node_info() {
        let (service, _) = service();
        assert_eq!(service.node_get_info().node_id, "node-1");
        assert_eq!(
            service.node_get_capabilities(),
            vec![NodeCapability::StageUnstageVolume]
        );
    }

    #[tokio::test]
    async fn stats_are_unimplemented() {
        let (service, _) = service();
        let ctx = service.context("NodeGetVolumeStats", &VolumeContext::new());
        let err = service
            .node_get_volume_stats(&ctx, "v1", Path::new("/pods/a"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::Unimplemented);
    }

    #[tokio::test]
    async fn invalid_requests_touch_nothing() {
        let (service, fake) = service();
        let ctx = RequestContext::detached("NodeUnstageVolume", service.node_id());
        let err = service
            .node_unstage_volume(&ctx, &UnstageRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidArgument);
        assert!(fake.calls().is_empty());
    }
}
