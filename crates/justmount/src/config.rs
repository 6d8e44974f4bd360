//! Node plugin configuration.

use std::path::PathBuf;
use std::time::Duration;

use justmount_common::defaults::{self, DEFAULT_MOUNT_TABLE};
use justmount_common::{NodeError, NodeResult};
use serde::Serialize;

/// Bounded retry for the staging mount check in publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra checks after the first one fails.
    pub attempts: u32,
    /// Fixed wait before each extra check.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(100),
        }
    }
}

/// What unpublish does with the target directory when unmount fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CleanupPolicy {
    /// Remove the directory regardless; report both failures if both fail.
    #[default]
    Always,
    /// Leave the directory in place and return the unmount failure.
    SkipOnUnmountFailure,
}

/// Transport endpoint the plugin is addressed at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "scheme", content = "address", rename_all = "lowercase")]
pub enum Endpoint {
    /// Unix domain socket path.
    Unix(PathBuf),
    /// TCP `host:port`.
    Tcp(String),
}

impl Endpoint {
    /// Parse `unix:///path` or `tcp://host:port`.
    pub fn parse(uri: &str) -> NodeResult<Self> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| NodeError::invalid_argument(format!("invalid endpoint URI: {uri}")))?;

        match scheme {
            "unix" if rest.starts_with('/') => Ok(Self::Unix(PathBuf::from(rest))),
            "unix" => Err(NodeError::invalid_argument(format!(
                "unix endpoint must be an absolute path: {uri}"
            ))),
            "tcp" if !rest.is_empty() => Ok(Self::Tcp(
                rest.trim_end_matches('/').to_string(),
            )),
            "tcp" => Err(NodeError::invalid_argument(format!(
                "tcp endpoint needs host:port: {uri}"
            ))),
            other => Err(NodeError::invalid_argument(format!(
                "unsupported network scheme: {other}"
            ))),
        }
    }
}

/// Node plugin configuration options.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Identifier reported to the orchestrator.
    pub node_id: String,
    /// Endpoint URI the transport serves on.
    pub endpoint: String,
    /// Mount table consulted for mount-point checks.
    pub mount_table: PathBuf,
    /// Directories probed for mount helpers after `PATH`.
    pub helper_search_dirs: Vec<PathBuf>,
    /// Staging mount check in publish.
    pub staging_check: RetryPolicy,
    /// Target directory handling in unpublish.
    pub unpublish_cleanup: CleanupPolicy,
    /// Serialize operations on the same path.
    pub serialize_paths: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: defaults::HOST_NAME.clone(),
            endpoint: defaults::ENDPOINT.clone(),
            mount_table: PathBuf::from(DEFAULT_MOUNT_TABLE),
            helper_search_dirs: defaults::helper_search_dirs(),
            staging_check: RetryPolicy::default(),
            unpublish_cleanup: CleanupPolicy::default(),
            serialize_paths: true,
        }
    }
}

impl NodeConfig {
    /// Set the node identifier.
    #[must_use]
    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = node_id.into();
        self
    }

    /// Set the endpoint URI.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the mount table path.
    #[must_use]
    pub fn with_mount_table(mut self, table: impl Into<PathBuf>) -> Self {
        self.mount_table = table.into();
        self
    }

    /// Set the staging check retry policy.
    #[must_use]
    pub const fn with_staging_check(mut self, policy: RetryPolicy) -> Self {
        self.staging_check = policy;
        self
    }

    /// Set the unpublish cleanup policy.
    #[must_use]
    pub const fn with_unpublish_cleanup(mut self, policy: CleanupPolicy) -> Self {
        self.unpublish_cleanup = policy;
        self
    }

    /// Enable or disable per-path serialization.
    #[must_use]
    pub const fn with_serialize_paths(mut self, serialize: bool) -> Self {
        self.serialize_paths = serialize;
        self
    }

    /// Parsed endpoint.
    pub fn parsed_endpoint(&self) -> NodeResult<Endpoint> {
        Endpoint::parse(&self.endpoint)
    }
}
