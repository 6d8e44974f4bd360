//! Error types returned by node operations.

use std::fmt;

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`NodeError`].
pub type NodeResult<T> = Result<T, NodeError>;

/// Status classification of a failed node operation.
///
/// These mirror the status codes of the orchestrator's RPC protocol so the
/// transport layer can translate them one-to-one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// A required field is missing or malformed.
    InvalidArgument,
    /// The system is not in a state where the operation can run.
    FailedPrecondition,
    /// An OS-level operation failed.
    Internal,
    /// The operation is not supported by this plugin.
    Unimplemented,
}

impl StatusCode {
    /// Canonical upper-snake name of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::Internal => "INTERNAL",
            Self::Unimplemented => "UNIMPLEMENTED",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the node stage/publish lifecycle.
#[derive(Error, Diagnostic, Debug)]
pub enum NodeError {
    /// A required request field is missing or malformed.
    #[error("{message}")]
    #[diagnostic(code(justmount::invalid_argument))]
    InvalidArgument {
        /// Description of the offending field.
        message: String,
    },

    /// The staging path was not a mount point when publishing.
    #[error("{message}")]
    #[diagnostic(
        code(justmount::failed_precondition),
        help("Stage the volume before publishing it")
    )]
    FailedPrecondition {
        /// Description of the unmet precondition.
        message: String,
    },

    /// Directory creation, mount, unmount, chmod or cleanup failed.
    #[error("{message}")]
    #[diagnostic(code(justmount::internal))]
    Internal {
        /// The error message.
        message: String,
    },

    /// Operation intentionally not supported.
    #[error("{operation} not implemented")]
    #[diagnostic(code(justmount::unimplemented))]
    Unimplemented {
        /// Name of the unsupported operation.
        operation: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(justmount::io))]
    Io(#[from] std::io::Error),
}

impl NodeError {
    /// Build an [`NodeError::InvalidArgument`].
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Build a [`NodeError::FailedPrecondition`].
    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::FailedPrecondition {
            message: message.into(),
        }
    }

    /// Build an [`NodeError::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Build an [`NodeError::Unimplemented`].
    pub fn unimplemented(operation: impl Into<String>) -> Self {
        Self::Unimplemented {
            operation: operation.into(),
        }
    }

    /// Status classification of this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidArgument { .. } => StatusCode::InvalidArgument,
            Self::FailedPrecondition { .. } => StatusCode::FailedPrecondition,
            Self::Internal { .. } | Self::Io(_) => StatusCode::Internal,
            Self::Unimplemented { .. } => StatusCode::Unimplemented,
        }
    }
}
