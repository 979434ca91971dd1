//! Scripted in-memory transport.
//!
//! [`MemoryTransport`] plays a deterministic stub agent: inbound lines are
//! served from a queue, and scripted replies are appended to that queue when
//! a request with a matching `method` is sent. Lines are raw text, so a
//! script can include output that is not JSON at all.
//!
//! ```rust,ignore
//! let transport = MemoryTransport::new()
//!     .reply_to("initialize", [r#"{"jsonrpc":"2.0","id":1,"result":{}}"#]);
//! ```

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use serde_json::Value;

use crate::acp::transport::{AgentTransport, Inbound, ShutdownOutcome, TransportFuture};
use crate::{AppError, Result};

/// In-memory stand-in for an agent process.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    inbound: VecDeque<String>,
    /// `method` → lines released when a request with that method is sent.
    scripts: HashMap<String, Vec<String>>,
    sent: Vec<Value>,
    /// Report `Closed` instead of `TimedOut` once the queue runs dry.
    close_when_empty: bool,
    /// Simulated latency before each queued line is delivered.
    line_delay: Duration,
    shut_down: bool,
}

impl MemoryTransport {
    /// Create a transport with nothing queued and no scripts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `lines` for delivery before any request is sent.
    #[must_use]
    pub fn with_lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inbound.extend(lines.into_iter().map(Into::into));
        self
    }

    /// Release `lines` the first time a request with `method` is sent.
    #[must_use]
    pub fn reply_to<I, S>(mut self, method: &str, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scripts.insert(
            method.to_owned(),
            lines.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Report end-of-stream instead of a timeout when nothing is queued.
    #[must_use]
    pub fn close_when_empty(mut self) -> Self {
        self.close_when_empty = true;
        self
    }

    /// Delay every delivered line by `delay`.
    #[must_use]
    pub fn with_line_delay(mut self, delay: Duration) -> Self {
        self.line_delay = delay;
        self
    }

    /// Every frame sent so far, in order.
    #[must_use]
    pub fn sent(&self) -> &[Value] {
        &self.sent
    }

    /// `method` of every frame sent so far, in order.
    #[must_use]
    pub fn sent_methods(&self) -> Vec<&str> {
        self.sent
            .iter()
            .filter_map(|frame| frame.get("method").and_then(Value::as_str))
            .collect()
    }

    /// Whether [`AgentTransport::shutdown`] has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

impl AgentTransport for MemoryTransport {
    fn send(&mut self, frame: Value) -> TransportFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.shut_down {
                return Err(AppError::Io("write failed: transport shut down".into()));
            }

            let method = frame.get("method").and_then(Value::as_str).map(str::to_owned);
            self.sent.push(frame);

            if let Some(lines) = method.and_then(|m| self.scripts.remove(&m)) {
                self.inbound.extend(lines);
            }
            Ok(())
        })
    }

    fn receive(&mut self, timeout: Duration) -> TransportFuture<'_, Inbound> {
        Box::pin(async move {
            match self.inbound.pop_front() {
                Some(line) => {
                    if !self.line_delay.is_zero() {
                        if self.line_delay > timeout {
                            tokio::time::sleep(timeout).await;
                            self.inbound.push_front(line);
                            return Inbound::TimedOut;
                        }
                        tokio::time::sleep(self.line_delay).await;
                    }
                    Inbound::Line(line)
                }
                None if self.shut_down || self.close_when_empty => Inbound::Closed,
                None => Inbound::TimedOut,
            }
        })
    }

    fn shutdown(&mut self, _grace: Duration) -> TransportFuture<'_, Result<ShutdownOutcome>> {
        Box::pin(async move {
            self.shut_down = true;
            Ok(ShutdownOutcome::Exited { code: Some(0) })
        })
    }
}
