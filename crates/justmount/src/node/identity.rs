//! Identity and capability reporting.

use std::path::Path;

use justmount_common::defaults::{DRIVER_NAME, DRIVER_VERSION};
use justmount_common::{NodeError, NodeResult};
use serde::Serialize;

/// Plugin name and version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginInfo {
    /// Driver name.
    pub name: String,
    /// Driver version.
    pub vendor_version: String,
}

impl Default for PluginInfo {
    fn default() -> Self {
        Self {
            name: DRIVER_NAME.to_string(),
            vendor_version: DRIVER_VERSION.to_string(),
        }
    }
}

/// Plugin-level capabilities. The plugin serves no controller operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PluginCapability {}

/// Node-service capabilities advertised to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeCapability {
    /// The node implements stage/unstage.
    StageUnstageVolume,
}

/// Topology-free node description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    /// Node identifier.
    pub node_id: String,
}

/// Name and version of this plugin.
#[must_use]
pub fn plugin_info() -> PluginInfo {
    PluginInfo::default()
}

/// Plugin capabilities; none are advertised.
#[must_use]
pub const fn plugin_capabilities() -> Vec<PluginCapability> {
    Vec::new()
}

/// Readiness probe. The node has no warm-up phase.
#[must_use]
pub const fn probe() -> bool {
    true
}

/// Capabilities of the node service.
#[must_use]
pub fn node_capabilities() -> Vec<NodeCapability> {
    vec![NodeCapability::StageUnstageVolume]
}

/// Volume usage statistics are not reported.
pub fn node_get_volume_stats(volume_id: &str, volume_path: &Path) -> NodeResult<()> {
    tracing::warn!(
        volume_id,
        volume_path = %volume_path.display(),
        "NodeGetVolumeStats is not implemented"
    );
    Err(NodeError::unimplemented("NodeGetVolumeStats"))
}

/// Volumes cannot be expanded on the node.
pub fn node_expand_volume(volume_id: &str, volume_path: &Path) -> NodeResult<()> {
    tracing::warn!(
        volume_id,
        volume_path = %volume_path.display(),
        "NodeExpandVolume is not implemented"
    );
    Err(NodeError::unimplemented("NodeExpandVolume"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use justmount_common::StatusCode;

    #[test]
    fn plugin_info_uses_driver_name() {
        let info = plugin_info();
        assert_eq!(info.name, "justmount.csi.driver");
        assert!(!info.vendor_version.is_empty());
    }

    #[test]
    fn advertises_stage_unstage() {
        assert!(probe());
        assert!(plugin_capabilities().is_empty());
        assert_eq!(node_capabilities(), vec![NodeCapability::StageUnstageVolume]);
        assert_eq!(
            serde_json::to_string(&NodeCapability::StageUnstageVolume).unwrap(),
            "\"STAGE_UNSTAGE_VOLUME\""
        );
    }

    #[test]
    fn stats_and_expand_are_unimplemented() {
        assert_eq!(
            node_get_volume_stats("v1", Path::new("/pods/a"))
                .unwrap_err()
                .status_code(),
            StatusCode::Unimplemented
        );
        assert_eq!(
            node_expand_volume("v1", Path::new("/pods/a"))
                .unwrap_err()
                .to_string(),
            "NodeExpandVolume not implemented"
        );
    }
}
