//! CLI command definitions and handlers.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Result, eyre};
use serde_json::json;

use justmount_common::NodeError;
use justmount_common::defaults::{
    CTX_FILE_MODE, CTX_FS_TYPE, CTX_MOUNT_OPTIONS, CTX_SOURCE, DEFAULT_ENDPOINT,
    DEFAULT_MOUNT_TABLE,
};

use crate::config::NodeConfig;
use crate::node::{
    NodeService, PublishRequest, RequestContext, StageRequest, UnpublishRequest, UnstageRequest,
    VolumeCapability, plugin_capabilities, plugin_info, probe,
};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// justmount - node-local volume mount plugin
#[derive(Parser)]
#[command(name = "justmount")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Identifier of this node (defaults to the host name)
    #[arg(long, global = true, env = "JUSTMOUNT_NODE_ID")]
    pub node_id: Option<String>,

    /// Endpoint the plugin is addressed at
    #[arg(long, global = true, env = "CSI_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Mount table used for mount-point checks
    #[arg(long, global = true, default_value = DEFAULT_MOUNT_TABLE)]
    pub mount_table: PathBuf,

    /// Request id attached to log lines (generated when absent)
    #[arg(long, global = true)]
    pub request_id: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Node lifecycle commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Mount a volume at its staging path
    Stage {
        /// Volume ID
        volume_id: String,

        /// Staging path
        #[arg(long)]
        staging_path: PathBuf,

        /// Filesystem type
        #[arg(long)]
        fs_type: String,

        /// Mount source
        #[arg(long)]
        source: String,

        /// Octal permission bits applied after mounting
        #[arg(long, default_value = "0755")]
        file_mode: String,

        /// Comma-separated mount options
        #[arg(short, long)]
        options: Option<String>,
    },

    /// Unmount a volume's staging path
    Unstage {
        /// Volume ID
        volume_id: String,

        /// Staging path
        #[arg(long)]
        staging_path: PathBuf,
    },

    /// Bind-mount a staged volume at a target path
    Publish {
        /// Volume ID
        volume_id: String,

        /// Staging path
        #[arg(long)]
        staging_path: PathBuf,

        /// Target path
        #[arg(long)]
        target_path: PathBuf,

        /// Filesystem type of the staged volume
        #[arg(long, default_value = "")]
        fs_type: String,
    },

    /// Unmount and remove a target path
    Unpublish {
        /// Volume ID
        volume_id: String,

        /// Target path
        #[arg(long)]
        target_path: PathBuf,
    },

    /// Report whether a path is a mount point
    IsMounted {
        /// Path to check
        path: PathBuf,
    },

    /// Show plugin identity, node info and capabilities
    Info,
}

impl Cli {
    /// Node configuration assembled from global flags.
    #[must_use]
    pub fn config(&self) -> NodeConfig {
        let mut config = NodeConfig::default()
            .with_endpoint(self.endpoint.clone())
            .with_mount_table(self.mount_table.clone());
        if let Some(node_id) = &self.node_id {
            config = config.with_node_id(node_id.clone());
        }
        config
    }

    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        let config = self.config();
        let service = NodeService::from_config(&config);

        let mut metadata = HashMap::new();
        if let Some(id) = &self.request_id {
            metadata.insert("x-request-id".to_string(), id.clone());
        }
        let context =
            |method: &'static str| RequestContext::new(method, service.node_id(), &metadata);

        match self.command {
            Commands::Stage {
                volume_id,
                staging_path,
                fs_type,
                source,
                file_mode,
                options,
            } => {
                let mut volume_context = HashMap::from([
                    (CTX_FS_TYPE.to_string(), fs_type.clone()),
                    (CTX_FILE_MODE.to_string(), file_mode),
                    (CTX_SOURCE.to_string(), source),
                ]);
                if let Some(options) = options {
                    volume_context.insert(CTX_MOUNT_OPTIONS.to_string(), options);
                }
                let req = StageRequest {
                    volume_id: volume_id.clone(),
                    staging_target_path: staging_path,
                    volume_capability: Some(VolumeCapability::mount(fs_type)),
                    volume_context,
                };

                let ctx = context("NodeStageVolume");
                service
                    .node_stage_volume(&ctx, &req)
                    .await
                    .map_err(|e| failed("stage", &ctx, &e))?;

                println!("Volume {volume_id} staged");
                Ok(())
            }

            Commands::Unstage {
                volume_id,
                staging_path,
            } => {
                let req = UnstageRequest {
                    volume_id: volume_id.clone(),
                    staging_target_path: staging_path,
                };

                let ctx = context("NodeUnstageVolume");
                service
                    .node_unstage_volume(&ctx, &req)
                    .await
                    .map_err(|e| failed("unstage", &ctx, &e))?;

                println!("Volume {volume_id} unstaged");
                Ok(())
            }

            Commands::Publish {
                volume_id,
                staging_path,
                target_path,
                fs_type,
            } => {
                let req = PublishRequest {
                    volume_id: volume_id.clone(),
                    staging_target_path: staging_path,
                    target_path,
                    volume_capability: Some(VolumeCapability::mount(fs_type)),
                    volume_context: HashMap::new(),
                };

                let ctx = context("NodePublishVolume");
                service
                    .node_publish_volume(&ctx, &req)
                    .await
                    .map_err(|e| failed("publish", &ctx, &e))?;

                println!("Volume {volume_id} published at {}", req.target_path.display());
                Ok(())
            }

            Commands::Unpublish {
                volume_id,
                target_path,
            } => {
                let req = UnpublishRequest {
                    volume_id: volume_id.clone(),
                    target_path,
                };

                let ctx = context("NodeUnpublishVolume");
                service
                    .node_unpublish_volume(&ctx, &req)
                    .await
                    .map_err(|e| failed("unpublish", &ctx, &e))?;

                println!("Volume {volume_id} unpublished");
                Ok(())
            }

            Commands::IsMounted { path } => {
                let mounted = service
                    .is_mount_point(&path)
                    .map_err(|e| eyre!("Failed to check mount point: {e}"))?;
                println!("{mounted}");
                Ok(())
            }

            Commands::Info => {
                let endpoint = config
                    .parsed_endpoint()
                    .map_err(|e| eyre!("Failed to parse endpoint: {e}"))?;
                let info = json!({
                    "plugin": plugin_info(),
                    "plugin_capabilities": plugin_capabilities(),
                    "ready": probe(),
                    "node": service.node_get_info(),
                    "node_capabilities": service.node_get_capabilities(),
                    "endpoint": endpoint,
                    "mount_table": config.mount_table,
                });
                println!("{}", serde_json::to_string_pretty(&info)?);
                Ok(())
            }
        }
    }
}

fn failed(action: &str, ctx: &RequestContext, err: &NodeError) -> color_eyre::eyre::Report {
    eyre!(
        "Failed to {action} ({}, request {}): {err}",
        err.status_code(),
        ctx.request_id()
    )
}
