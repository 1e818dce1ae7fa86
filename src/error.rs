//! Error types for fnplane
//!
//! All modules use `FnplaneResult<T>` as their return type. Every variant
//! belongs to one [`ErrorKind`], which is what collaborators and the builder's
//! HTTP layer branch on.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for fnplane operations
pub type FnplaneResult<T> = Result<T, FnplaneError>;

/// Coarse error taxonomy shared with collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Lookup miss; never fatal to the caller
    NotFound,
    /// Malformed request or unknown operation
    InvalidArgument,
    /// A follower waited past its lock's expiry
    Timeout,
    /// A child build process or remote builder failed
    Upstream,
    /// I/O while reading pipes, files or encoding responses
    Transport,
    /// Invariant violation
    Internal,
}

impl ErrorKind {
    /// HTTP status code used when this kind crosses an HTTP boundary
    pub fn http_status(self) -> u16 {
        match self {
            Self::InvalidArgument => 400,
            Self::NotFound => 404,
            Self::Timeout => 408,
            Self::Upstream | Self::Transport | Self::Internal => 500,
        }
    }
}

/// All errors that can occur in fnplane
#[derive(Error, Debug)]
pub enum FnplaneError {
    // Lookup errors
    #[error("key {0} not found")]
    NotFound(String),

    #[error("could not find source package: '{}'", .0.display())]
    SourceMissing(PathBuf),

    // Request errors
    #[error("{0}")]
    InvalidArgument(String),

    #[error("waiting for action lock timed out")]
    Timeout,

    // Build errors
    #[error("error starting cmd {command:?}: {source}")]
    BuildStart {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("error reading cmd output: {0}")]
    BuildOutput(#[source] std::io::Error),

    #[error("error waiting for cmd {command:?}: {status}")]
    BuildExit { command: String, status: String },

    #[error("artifact name collision: {0}")]
    ArtifactCollision(String),

    #[error("builder request failed with status {status}: {message}")]
    BuildRequest { status: u16, message: String },

    #[error("HTTP request to builder failed: {0}")]
    HttpClient(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} service is no longer running")]
    ChannelClosed(&'static str),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl FnplaneError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create an invalid argument error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::SourceMissing(_) => ErrorKind::NotFound,
            Self::InvalidArgument(_)
            | Self::Json(_)
            | Self::ConfigInvalid { .. }
            | Self::User(_) => ErrorKind::InvalidArgument,
            Self::Timeout => ErrorKind::Timeout,
            Self::BuildStart { .. } | Self::BuildExit { .. } | Self::BuildRequest { .. } => {
                ErrorKind::Upstream
            }
            Self::BuildOutput(_)
            | Self::Io { .. }
            | Self::ConfigDirCreate { .. }
            | Self::TomlSerialize(_)
            | Self::HttpClient(_)
            | Self::ChannelClosed(_) => ErrorKind::Transport,
            Self::ArtifactCollision(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Check if the error is a cache or lookup miss
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Check if the caller may re-enter the operation
    ///
    /// A follower that times out, or that finds the cache still empty after
    /// its leader failed, can call `run_once` again and become the next leader.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::NotFound(_))
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::BuildRequest { .. } => Some("Check the builder logs above for the failing step"),
            Self::ConfigInvalid { .. } => Some("Run: fnplane config init --force"),
            Self::HttpClient(_) => Some("Is the builder running? Check --url or FNPLANE_BUILDER_URL"),
            Self::ChannelClosed(_) => Some("The owning task exited; restart the process"),
            _ => None,
        }
    }
}
