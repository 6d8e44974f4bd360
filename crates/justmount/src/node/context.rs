//! Request-scoped logging context.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;

use justmount_common::NodeResult;
use justmount_common::defaults::HOST_NAME;
use tracing::field::{Empty, display};
use tracing::{Instrument, Span};

/// Metadata keys searched, in order, for a caller-supplied request id.
pub const REQUEST_ID_KEYS: &[&str] = &["x-request-id", "x-correlation-id", "request-id"];

/// Per-request logging handle passed explicitly to every node operation.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: String,
    method: &'static str,
    span: Span,
}

impl RequestContext {
    /// Create a context for `method` on `node_id`, taking the request id
    /// from `metadata` when present.
    #[must_use]
    pub fn new(method: &'static str, node_id: &str, metadata: &HashMap<String, String>) -> Self {
        let request_id = request_id_from(metadata);
        let span = tracing::info_span!(
            "node_request",
            request_id = %request_id,
            method,
            node_id,
            host = HOST_NAME.as_str(),
            volume_id = Empty,
            staging_target_path = Empty,
            target_path = Empty,
        );
        Self {
            request_id,
            method,
            span,
        }
    }

    /// Context without caller metadata.
    #[must_use]
    pub fn detached(method: &'static str, node_id: &str) -> Self {
        Self::new(method, node_id, &HashMap::new())
    }

    /// The request id.
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// The operation name.
    #[must_use]
    pub const fn method(&self) -> &'static str {
        self.method
    }

    /// Span every log line of this request is emitted in.
    #[must_use]
    pub const fn span(&self) -> &Span {
        &self.span
    }

    /// Attach the volume id to the request span.
    pub fn record_volume(&self, volume_id: &str) {
        self.span.record("volume_id", volume_id);
    }

    /// Attach a path field (`staging_target_path` or `target_path`).
    pub fn record_path(&self, field: &'static str, path: &Path) {
        self.span.record(field, display(path.display()));
    }

    /// Run `operation` inside the request span and log its outcome.
    pub async fn run<T, F>(&self, operation: F) -> NodeResult<T>
    where
        F: Future<Output = NodeResult<T>>,
    {
        let result = operation.instrument(self.span.clone()).await;
        match &result {
            Ok(_) => tracing::info!(parent: &self.span, "request completed"),
            Err(err) => tracing::error!(
                parent: &self.span,
                error = %err,
                code = %err.status_code(),
                "request failed"
            ),
        }
        result
    }
}

/// First non-blank request id in `metadata`, or a fresh UUID.
#[must_use]
pub fn request_id_from(metadata: &HashMap<String, String>) -> String {
    REQUEST_ID_KEYS
        .iter()
        .filter_map(|key| metadata.get(*key))
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string)
}
