//! # justmount
//!
//! Node-local volume mount lifecycle for a container orchestrator.
//!
//! ## Features
//!
//! - **Staging**: one global mount per volume, with `mount.<fstype>` helper
//!   fallback when the kernel has no driver
//! - **Publishing**: per-consumer bind mounts from the staging mount
//! - **Mount-point detection**: read fresh from `/proc/self/mountinfo` on
//!   every query
//! - **Testable backends**: syscall-backed and in-memory mounters
//!
//! ## Usage
//!
//! ```no_run
//! use justmount::config::NodeConfig;
//! use justmount::node::{NodeService, StageRequest, VolumeCapability};
//!
//! # async fn example() -> justmount_common::NodeResult<()> {
//! let service = NodeService::from_config(&NodeConfig::default());
//!
//! let req = StageRequest {
//!     volume_id: "v1".to_string(),
//!     staging_target_path: "/var/lib/kubelet/plugins/justmount/v1".into(),
//!     volume_capability: Some(VolumeCapability::mount("tmpfs")),
//!     volume_context: [
//!         ("fileMode".to_string(), "0755".to_string()),
//!         ("source".to_string(), "tmpfs".to_string()),
//!     ]
//!     .into(),
//! };
//!
//! let ctx = service.context("NodeStageVolume", &Default::default());
//! service.node_stage_volume(&ctx, &req).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod mount;
pub mod node;

pub use config::NodeConfig;
pub use node::NodeService;
