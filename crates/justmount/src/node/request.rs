//! Request records for the node operations.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use justmount_common::defaults::{CTX_FILE_MODE, CTX_FS_TYPE, CTX_MOUNT_OPTIONS, CTX_SOURCE};
use justmount_common::{NodeError, NodeResult};
use serde::{Deserialize, Serialize};

/// Filesystem access parameters of a capability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountVolume {
    /// Requested filesystem type; may be empty.
    #[serde(default)]
    pub fs_type: String,
    /// Additional mount options, appended after the context's
    /// `mountOptions`.
    #[serde(default)]
    pub mount_flags: Vec<String>,
}

/// Capability the volume is requested with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeCapability {
    /// Filesystem access, absent for block access.
    pub mount: Option<MountVolume>,
}

impl VolumeCapability {
    /// Capability for a filesystem mount of `fs_type`.
    pub fn mount(fs_type: impl Into<String>) -> Self {
        Self {
            mount: Some(MountVolume {
                fs_type: fs_type.into(),
                mount_flags: Vec::new(),
            }),
        }
    }

    /// Non-empty filesystem type, if the capability carries one.
    #[must_use]
    pub fn fs_type(&self) -> Option<&str> {
        self.mount
            .as_ref()
            .map(|m| m.fs_type.as_str())
            .filter(|t| !t.is_empty())
    }

    /// Non-empty mount flags carried by the capability.
    fn mount_flags(&self) -> impl Iterator<Item = &str> {
        self.mount
            .iter()
            .flat_map(|m| m.mount_flags.iter())
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
    }
}

/// Free-form string map supplied with each volume.
pub type VolumeContext = HashMap<String, String>;

/// Stage request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageRequest {
    /// Volume identifier.
    pub volume_id: String,
    /// Global per-volume mount path.
    pub staging_target_path: PathBuf,
    /// Volume capability.
    pub volume_capability: Option<VolumeCapability>,
    /// Volume context.
    #[serde(default)]
    pub volume_context: VolumeContext,
}

/// Unstage request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnstageRequest {
    /// Volume identifier.
    pub volume_id: String,
    /// Global per-volume mount path.
    pub staging_target_path: PathBuf,
}

/// Publish request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishRequest {
    /// Volume identifier.
    pub volume_id: String,
    /// Global per-volume mount path.
    pub staging_target_path: PathBuf,
    /// Per-consumer bind mount path.
    pub target_path: PathBuf,
    /// Volume capability.
    pub volume_capability: Option<VolumeCapability>,
    /// Volume context.
    #[serde(default)]
    pub volume_context: VolumeContext,
}

/// Unpublish request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnpublishRequest {
    /// Volume identifier.
    pub volume_id: String,
    /// Per-consumer bind mount path.
    pub target_path: PathBuf,
}

/// Validated parameters for a staging mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageParams {
    /// Filesystem type.
    pub fs_type: String,
    /// Permission bits applied to the staging path after mounting.
    pub file_mode: u32,
    /// Mount source.
    pub source: String,
    /// Comma-separated option string.
    pub mount_options: String,
}

pub(crate) fn require_volume_id(volume_id: &str) -> NodeResult<()> {
    if volume_id.is_empty() {
        return Err(NodeError::invalid_argument("volume_id is required"));
    }
    Ok(())
}

pub(crate) fn require_path(path: &Path, field: &str) -> NodeResult<()> {
    if path.as_os_str().is_empty() {
        return Err(NodeError::invalid_argument(format!("{field} is required")));
    }
    Ok(())
}

impl StageRequest {
    /// Resolve fsType, fileMode, source and mount options.
    ///
    /// The capability's filesystem type wins over the context's `fsType`.
    /// The capability's mount flags follow the context's `mountOptions`.
    pub fn params(&self) -> NodeResult<StageParams> {
        require_volume_id(&self.volume_id)?;
        require_path(&self.staging_target_path, "staging_target_path")?;
        let capability = self
            .volume_capability
            .as_ref()
            .ok_or_else(|| NodeError::invalid_argument("volume_capability is required"))?;

        let fs_type = capability
            .fs_type()
            .or_else(|| {
                self.volume_context
                    .get(CTX_FS_TYPE)
                    .map(String::as_str)
                    .filter(|t| !t.is_empty())
            })
            .ok_or_else(|| {
                NodeError::invalid_argument(
                    "fsType is required in volume capability or volume context",
                )
            })?
            .to_string();

        let mode = self.volume_context.get(CTX_FILE_MODE).ok_or_else(|| {
            NodeError::invalid_argument("fileMode is a required parameter in VolumeContext")
        })?;
        let file_mode = parse_file_mode(mode)?;

        let source = self
            .volume_context
            .get(CTX_SOURCE)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                NodeError::invalid_argument("source is a required parameter in VolumeContext")
            })?
            .clone();

        let mount_options = self
            .volume_context
            .get(CTX_MOUNT_OPTIONS)
            .map(|o| o.trim())
            .filter(|o| !o.is_empty())
            .into_iter()
            .chain(capability.mount_flags())
            .collect::<Vec<_>>()
            .join(",");

        Ok(StageParams {
            fs_type,
            file_mode,
            source,
            mount_options,
        })
    }
}

impl UnstageRequest {
    pub(crate) fn validate(&self) -> NodeResult<()> {
        require_volume_id(&self.volume_id)?;
        require_path(&self.staging_target_path, "staging_target_path")
    }
}

impl PublishRequest {
    pub(crate) fn validate(&self) -> NodeResult<()> {
        require_volume_id(&self.volume_id)?;
        require_path(&self.target_path, "target_path")?;
        if self.volume_capability.is_none() {
            return Err(NodeError::invalid_argument("volume_capability is required"));
        }
        require_path(&self.staging_target_path, "staging_target_path")
    }
}

impl UnpublishRequest {
    pub(crate) fn validate(&self) -> NodeResult<()> {
        require_volume_id(&self.volume_id)?;
        require_path(&self.target_path, "target_path")
    }
}

/// Parse an octal permission string such as `0755` into a mode mask.
pub fn parse_file_mode(mode: &str) -> NodeResult<u32> {
    let parsed = u32::from_str_radix(mode.trim(), 8)
        .map_err(|e| NodeError::invalid_argument(format!("invalid file mode {mode:?}: {e}")))?;
    if parsed > 0o7777 {
        return Err(NodeError::invalid_argument(format!(
            "invalid file mode {mode:?}: permission bits out of range"
        )));
    }
    Ok(parsed)
}
