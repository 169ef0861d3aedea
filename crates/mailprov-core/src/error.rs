//! Error types for the provisioning system
//!
//! This module defines all error types used throughout the crate.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Result type alias for provisioning operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the provisioning system
#[derive(Error, Debug)]
pub enum Error {
    /// No acquisition strategy exists for the host
    #[error("unsupported {reason}: {os}/{arch}")]
    UnsupportedPlatform {
        /// Operating system name (e.g. "linux")
        os: String,
        /// CPU architecture name (e.g. "x86_64")
        arch: String,
        /// Which half of the pair is unsupported
        reason: &'static str,
    },

    /// An external command exited unsuccessfully
    #[error("command `{command}` failed ({status})\nOutput: {output}")]
    Subprocess {
        /// The command line that was run
        command: String,
        /// Exit status description
        status: String,
        /// Combined stdout and stderr
        output: String,
    },

    /// Filesystem failure with path context
    #[error("{operation} {path:?}: {source}")]
    Filesystem {
        /// What was being attempted
        operation: &'static str,
        /// Path involved
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Operation was cancelled before it completed
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Missing or malformed provider record identity
    #[error("invalid or missing record id: {0:?}")]
    InvalidRecordId(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Record or zone not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// An inner error with one sentence of context from the calling layer
    #[error("{context}: {source}")]
    Context {
        /// What the calling layer was doing
        context: String,
        /// The wrapped error
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an unsupported operating system error
    pub fn unsupported_os(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self::UnsupportedPlatform {
            os: os.into(),
            arch: arch.into(),
            reason: "operating system",
        }
    }

    /// Create an unsupported architecture error
    pub fn unsupported_arch(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self::UnsupportedPlatform {
            os: os.into(),
            arch: arch.into(),
            reason: "architecture",
        }
    }

    /// Create a filesystem error
    pub fn fs(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Create a subprocess error from a finished command
    pub fn subprocess(command: impl Into<String>, status: ExitStatus, output: impl Into<String>) -> Self {
        Self::Subprocess {
            command: command.into(),
            status: status.to_string(),
            output: output.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Create an invalid record id error
    pub fn invalid_record_id(id: impl Into<String>) -> Self {
        Self::InvalidRecordId(id.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Wrap this error with a sentence of context
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through context layers
    pub fn root(&self) -> &Error {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// True if the root cause is a missing or invalid record identity
    pub fn is_invalid_record_id(&self) -> bool {
        matches!(self.root(), Self::InvalidRecordId(_))
    }

    /// True if the root cause is something that does not exist
    ///
    /// Covers both provider lookups and missing files.
    pub fn is_not_found(&self) -> bool {
        match self.root() {
            Self::NotFound(_) => true,
            Self::Filesystem { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// True if the root cause is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Self::Cancelled(_))
    }

    /// True if the root cause is an unsupported platform
    pub fn is_unsupported_platform(&self) -> bool {
        matches!(self.root(), Self::UnsupportedPlatform { .. })
    }
}

/// Adds one sentence of context to a failing result
pub trait ResultExt<T> {
    /// Wrap the error, if any, with `context`
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Wrap the error, if any, with a lazily built context
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.context(f()))
    }
}
