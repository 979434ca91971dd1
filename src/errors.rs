//! Error types shared across the harness.

use std::fmt::{Display, Formatter};

/// Shared harness result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Harness error enumeration covering every run-level failure class.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Transport failure: the agent exited or one of its streams closed.
    Io(String),
    /// Framing or protocol-shape failure on the ACP stream.
    Acp(String),
    /// The agent answered a request with a JSON-RPC `error` object.
    Rpc(String),
    /// No qualifying frame arrived within the bounded wait.
    Timeout(String),
    /// The prompt completed cleanly but no content chunk was streamed.
    NoContent(String),
    /// The run was cancelled by the operator.
    Interrupted(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Acp(msg) => write!(f, "acp: {msg}"),
            Self::Rpc(msg) => write!(f, "rpc: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::NoContent(msg) => write!(f, "no content: {msg}"),
            Self::Interrupted(msg) => write!(f, "interrupted: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
