//! # Error Types
//!
//! Error taxonomy for topology reconciliation.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while driving a cluster towards a declared topology.
///
/// The taxonomy is deliberately small: desired-state resolution failures,
/// channel/remote failures (with the transport-level conditions kept apart so
/// a broken connection is distinguishable from a malformed reply), and the
/// convergence deadline. All of them abort the current run; none is retried
/// internally.
///
/// # Examples
///
/// ```rust
/// use shoal_core::ShoalError;
///
/// let error = ShoalError::validation("instance i-1 is not in the inventory");
/// assert!(!error.is_retryable());
/// ```
#[derive(Error, Debug)]
pub enum ShoalError {
    /// Desired state references something that cannot be resolved against
    /// the observed cluster
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Transport failure, or an error value returned by the admin capability
    /// (the remote error text is carried verbatim)
    #[error("RPC error: {message}")]
    Rpc { message: String },

    /// Connection closed before a complete reply arrived
    #[error("Broken pipe: {message}")]
    BrokenPipe { message: String },

    /// Reply envelope or payload could not be decoded
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// Cluster did not report healthy within the allotted time
    #[error("Cluster did not become healthy within {timeout:?}")]
    ConvergenceTimeout { timeout: Duration },

    /// File system or network I/O failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for Results in the shoal control plane.
pub type Result<T> = std::result::Result<T, ShoalError>;

impl ShoalError {
    /// Creates a new validation error with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a new RPC error with the given message.
    pub fn rpc(message: impl Into<String>) -> Self {
        Self::Rpc {
            message: message.into(),
        }
    }

    /// Creates a new broken-pipe error with the given message.
    pub fn broken_pipe(message: impl Into<String>) -> Self {
        Self::BrokenPipe {
            message: message.into(),
        }
    }

    /// Creates a new decode error with the given message.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Prefixes the error message with the purpose of the failed operation.
    ///
    /// The inner message (for RPC errors, the remote error text) is kept
    /// verbatim after the prefix.
    pub fn in_context(self, context: &str) -> Self {
        match self {
            Self::Validation { message } => Self::Validation {
                message: format!("{}: {}", context, message),
            },
            Self::Rpc { message } => Self::Rpc {
                message: format!("{}: {}", context, message),
            },
            Self::BrokenPipe { message } => Self::BrokenPipe {
                message: format!("{}: {}", context, message),
            },
            Self::Decode { message } => Self::Decode {
                message: format!("{}: {}", context, message),
            },
            other => other,
        }
    }

    /// Determines whether re-running the whole reconciliation may resolve
    /// this error.
    ///
    /// Only a convergence timeout qualifies: the applied batch was accepted
    /// and the cluster was merely slow to settle. Validation and RPC errors
    /// indicate conditions a retry will not fix.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConvergenceTimeout { .. })
    }
}
