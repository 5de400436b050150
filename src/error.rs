//! Error types for scriptbridge.

use std::fmt;

use thiserror::Error;

/// A single cleanup action that failed while a registry was drained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    /// Label of the closable that failed.
    pub label: String,
    /// Error reported by the cleanup action.
    pub message: String,
}

impl fmt::Display for CleanupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.message)
    }
}

/// Common error type for scriptbridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// A registration function received arguments it cannot interpret.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A script handler object lacks a member the native interface requires.
    #[error("missing required member '{0}'")]
    MissingRequiredMember(String),

    /// The event or command subsystem rejected a registration.
    #[error("native registration failed: {0}")]
    NativeRegistration(String),

    /// One or more cleanup actions failed during a drain.
    ///
    /// Every other action in the same registry was still run.
    #[error("{} cleanup action(s) failed: {}", .0.len(), join_failures(.0))]
    Cleanup(Vec<CleanupFailure>),

    /// Script load or runtime error.
    #[error("script error: {0}")]
    Script(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Permission denied error.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn join_failures(failures: &[CleanupFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// Lua errors are flattened to text so `BridgeError` stays `Send + Sync`
// and can travel back into Lua through `mlua::Error::external`.
impl From<mlua::Error> for BridgeError {
    fn from(e: mlua::Error) -> Self {
        BridgeError::Script(e.to_string())
    }
}

impl BridgeError {
    /// Convert into an error that can be raised inside a Lua call.
    pub fn into_lua(self) -> mlua::Error {
        mlua::Error::external(self)
    }
}

/// Result type alias for scriptbridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
