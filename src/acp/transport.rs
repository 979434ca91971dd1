//! Line-oriented peer abstraction.
//!
//! The driver only ever talks to the agent through [`AgentTransport`]. The
//! production implementation is [`ChildTransport`](crate::acp::spawner::ChildTransport);
//! tests substitute [`MemoryTransport`](crate::acp::memory::MemoryTransport).

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::Value;

use crate::Result;

/// Boxed future returned by transport methods.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome of a single bounded read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// One complete line, without its terminating `\n`.
    Line(String),
    /// The codec rejected the line (for example it exceeded the length limit).
    Malformed(String),
    /// Nothing arrived before the timeout.
    TimedOut,
    /// The agent closed its output stream.
    Closed,
}

/// How the agent process ended during [`AgentTransport::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The agent exited on its own after its input was closed.
    Exited {
        /// Exit code, or `None` when terminated by a signal.
        code: Option<i32>,
    },
    /// The agent outlived the grace period and was killed.
    Killed,
}

/// Capability interface over the agent peer.
pub trait AgentTransport: Send {
    /// Write `frame` as one line and flush it.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`](crate::AppError::Io) when the agent's input
    /// is closed or broken.
    fn send(&mut self, frame: Value) -> TransportFuture<'_, Result<()>>;

    /// Wait up to `timeout` for the next line from the agent.
    fn receive(&mut self, timeout: Duration) -> TransportFuture<'_, Inbound>;

    /// Close the agent's input, wait up to `grace` for it to exit, and kill
    /// it otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`](crate::AppError::Io) if waiting on or
    /// killing the process fails.
    fn shutdown(&mut self, grace: Duration) -> TransportFuture<'_, Result<ShutdownOutcome>>;
}
