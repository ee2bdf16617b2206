//! Container runtime error types.

use thiserror::Error;

/// Result type for container operations.
pub type ContainerResult<T> = Result<T, ContainerError>;

/// Errors that can occur while talking to the container runtime.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// The container command failed (daemon unreachable, bad exit status).
    #[error("container {command} failed: {message}")]
    CommandFailed { command: String, message: String },

    /// Container was not found.
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// Failed to parse container output.
    #[error("failed to parse container output: {0}")]
    ParseError(String),

    /// Invalid input provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Generic IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContainerError {
    /// Whether this error means the container no longer exists.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ContainerError::ContainerNotFound(_))
    }

    /// Build the error for a failed command, recognizing "no such container"
    /// output from docker and podman.
    pub(crate) fn from_stderr(command: &str, target: &str, stderr: &str) -> Self {
        let lower = stderr.to_lowercase();
        if lower.contains("no such container") || lower.contains("no container with") {
            return ContainerError::ContainerNotFound(target.to_string());
        }
        ContainerError::CommandFailed {
            command: command.to_string(),
            message: stderr.trim().to_string(),
        }
    }
}
