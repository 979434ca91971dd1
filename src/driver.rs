//! Protocol driver for a single harness run.
//!
//! [`ProtocolDriver`] owns the transport, allocates request ids, tracks the
//! one pending request, and accumulates the notification log for the prompt
//! interaction. A run moves through [`RunState`] strictly in order:
//!
//! ```text
//! NotStarted → Initialized → SessionCreated → PromptSent → Draining → Completed
//!      └────────────┴──────────────┴──────────────┴───────────┴──────→ Failed
//! ```
//!
//! No step is retried. Any fatal error moves the driver to `Failed`.

use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::acp::frame::{AgentInfo, Frame, Notification, Request, Response};
use crate::acp::transport::{AgentTransport, Inbound, ShutdownOutcome};
use crate::config::{ClientInfoConfig, HarnessConfig};
use crate::report::{Analysis, RunReport};
use crate::{AppError, Result};

/// Lifecycle position of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Nothing has been sent yet.
    NotStarted,
    /// `initialize` succeeded.
    Initialized,
    /// `session/new` returned a session id.
    SessionCreated,
    /// `session/prompt` was written; its response has not been read.
    PromptSent,
    /// Notifications are being drained while waiting for the final response.
    Draining,
    /// The run finished and passed.
    Completed,
    /// A fatal condition ended the run.
    Failed,
}

/// Bounded-wait policy for [`ProtocolDriver::drain_until_final_response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainPolicy {
    /// Bound on each individual read.
    pub per_read_timeout: Duration,
    /// Pause after each empty read.
    pub poll_interval: Duration,
    /// Consecutive empty reads that end the drain as failure.
    pub max_consecutive_empty_reads: u32,
    /// Optional wall-clock bound on the whole drain.
    pub deadline: Option<Duration>,
}

impl Default for DrainPolicy {
    fn default() -> Self {
        Self {
            per_read_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(100),
            max_consecutive_empty_reads: 30,
            deadline: None,
        }
    }
}

/// Drives one initialize → session → prompt → drain run over a transport.
#[derive(Debug)]
pub struct ProtocolDriver<T> {
    transport: T,
    state: RunState,
    next_id: u64,
    /// Id of the request whose response is still outstanding.
    pending: Option<u64>,
    notifications: Vec<Notification>,
    stray_responses: u32,
    agent_info: AgentInfo,
    session_id: Option<String>,
}

impl<T: AgentTransport> ProtocolDriver<T> {
    /// Wrap `transport` in a fresh driver; request ids start at 1.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: RunState::NotStarted,
            next_id: 1,
            pending: None,
            notifications: Vec::new(),
            stray_responses: 0,
            agent_info: AgentInfo::default(),
            session_id: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Underlying transport.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Notifications collected since the prompt was sent.
    #[must_use]
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    /// Responses received whose id matched no pending request.
    #[must_use]
    pub fn stray_responses(&self) -> u32 {
        self.stray_responses
    }

    /// Id of the request still awaiting its response, if any.
    #[must_use]
    pub fn pending_request(&self) -> Option<u64> {
        self.pending
    }

    // ── Framing ───────────────────────────────────────────────────────────────

    /// Write `request` to the agent as one flushed line.
    ///
    /// # Errors
    ///
    /// Propagates serialisation and transport write failures.
    pub async fn send(&mut self, request: &Request) -> Result<()> {
        let frame = request.to_value()?;
        debug!(line = %frame, ">>> sending");
        self.transport.send(frame).await
    }

    /// Read one frame, waiting at most `timeout`.
    ///
    /// Returns `None` on timeout, end of stream, a blank line, or a line that
    /// does not decode. Undecodable lines are logged with the parse error and
    /// discarded; they never abort the run.
    pub async fn receive(&mut self, timeout: Duration) -> Option<Frame> {
        match self.transport.receive(timeout).await {
            Inbound::Line(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    return None;
                }

                debug!(line = trimmed, "<<< received");

                match Frame::parse(trimmed) {
                    Ok(frame) => Some(frame),
                    Err(e) => {
                        warn!(error = %e, raw_line = trimmed, "discarding unparseable line");
                        None
                    }
                }
            }
            Inbound::Malformed(reason) => {
                warn!(error = reason.as_str(), "discarding malformed line");
                None
            }
            Inbound::TimedOut => None,
            Inbound::Closed => {
                debug!("agent output closed");
                None
            }
        }
    }

    // ── Run steps ─────────────────────────────────────────────────────────────

    /// Send `initialize` and read exactly one response.
    ///
    /// # Errors
    ///
    /// - [`AppError::Timeout`]: no response arrived.
    /// - [`AppError::Acp`]: the frame read was not the `initialize` response.
    /// - [`AppError::Rpc`]: the response carries an `error` field.
    pub async fn initialize(
        &mut self,
        client: &ClientInfoConfig,
        timeout: Duration,
    ) -> Result<AgentInfo> {
        let result = self.initialize_inner(client, timeout).await;
        self.track(result)
    }

    async fn initialize_inner(
        &mut self,
        client: &ClientInfoConfig,
        timeout: Duration,
    ) -> Result<AgentInfo> {
        self.expect_state(RunState::NotStarted, "initialize")?;

        let id = self.allocate_id();
        self.send(&Request::initialize(id, client)).await?;
        let response = self.read_response(id, "initialize", timeout).await?;

        let agent_info = AgentInfo::from_initialize_result(response.result.as_ref());
        info!(
            protocol_version = agent_info.protocol_version.as_deref(),
            agent_name = agent_info.name.as_deref(),
            agent_version = agent_info.version.as_deref(),
            "initialize succeeded"
        );

        self.agent_info = agent_info.clone();
        self.state = RunState::Initialized;
        Ok(agent_info)
    }

    /// Send `session/new` and return the session id from its response.
    ///
    /// # Errors
    ///
    /// - [`AppError::Timeout`]: no response arrived.
    /// - [`AppError::Acp`]: wrong frame, or no non-empty `result.sessionId`.
    /// - [`AppError::Rpc`]: the response carries an `error` field.
    pub async fn create_session(&mut self, timeout: Duration) -> Result<String> {
        let result = self.create_session_inner(timeout).await;
        self.track(result)
    }

    async fn create_session_inner(&mut self, timeout: Duration) -> Result<String> {
        self.expect_state(RunState::Initialized, "session/new")?;

        let id = self.allocate_id();
        self.send(&Request::session_new(id)).await?;
        let response = self.read_response(id, "session/new", timeout).await?;

        let session_id = response.session_id().map(str::to_owned).ok_or_else(|| {
            AppError::Acp(format!(
                "no session id in session/new response: {}",
                response.result.as_ref().map_or_else(|| "null".to_owned(), ToString::to_string)
            ))
        })?;

        info!(session_id = session_id.as_str(), "session created");
        self.session_id = Some(session_id.clone());
        self.state = RunState::SessionCreated;
        Ok(session_id)
    }

    /// Send `session/prompt` carrying `text` and return its request id.
    ///
    /// The response is not read here; see
    /// [`drain_until_final_response`](Self::drain_until_final_response).
    ///
    /// # Errors
    ///
    /// Propagates transport write failures.
    pub async fn prompt(&mut self, session_id: &str, text: &str) -> Result<u64> {
        let result = self.prompt_inner(session_id, text).await;
        self.track(result)
    }

    async fn prompt_inner(&mut self, session_id: &str, text: &str) -> Result<u64> {
        self.expect_state(RunState::SessionCreated, "session/prompt")?;

        let id = self.allocate_id();
        self.notifications.clear();
        self.send(&Request::session_prompt(id, session_id, text))
            .await?;

        self.pending = Some(id);
        self.state = RunState::PromptSent;
        Ok(id)
    }

    /// Read frames until the response to `request_id` arrives.
    ///
    /// Notifications are appended to the log; `agent_message_chunk` text is
    /// logged as it streams in. Responses with any other id are counted as
    /// strays and otherwise ignored. Every empty read bumps a counter that
    /// any frame resets; the drain fails once the counter reaches
    /// `policy.max_consecutive_empty_reads`, or once `policy.deadline` has
    /// elapsed when one is set.
    ///
    /// Receiving the final response ends the run: the driver moves to
    /// `Completed` when it carries no error and at least one content chunk
    /// streamed in, and to `Failed` otherwise.
    ///
    /// # Errors
    ///
    /// [`AppError::Timeout`] when either bound is hit first.
    pub async fn drain_until_final_response(
        &mut self,
        request_id: u64,
        policy: &DrainPolicy,
    ) -> Result<Response> {
        let result = self.drain_inner(request_id, policy).await;
        self.track(result)
    }

    async fn drain_inner(&mut self, request_id: u64, policy: &DrainPolicy) -> Result<Response> {
        self.expect_state(RunState::PromptSent, "drain")?;
        self.state = RunState::Draining;

        let started = Instant::now();
        let mut empty_reads: u32 = 0;

        loop {
            let mut read_timeout = policy.per_read_timeout;
            if let Some(deadline) = policy.deadline {
                let elapsed = started.elapsed();
                if elapsed >= deadline {
                    return Err(AppError::Timeout(format!(
                        "no response to request {request_id} within {deadline:?}"
                    )));
                }
                read_timeout = read_timeout.min(deadline - elapsed);
            }

            if empty_reads >= policy.max_consecutive_empty_reads {
                return Err(AppError::Timeout(format!(
                    "no response to request {request_id} after {empty_reads} empty reads"
                )));
            }

            match self.receive(read_timeout).await {
                Some(Frame::Notification(notification)) => {
                    empty_reads = 0;
                    match notification.agent_message_text() {
                        Some(text) => info!(text, "content chunk"),
                        None => debug!(method = notification.method.as_str(), "notification"),
                    }
                    self.notifications.push(notification);
                }
                Some(Frame::Response(response)) if response.answers(request_id) => {
                    info!(request_id, "final response received");
                    self.pending = None;
                    self.state = self.settle(&response);
                    return Ok(response);
                }
                Some(Frame::Response(response)) => {
                    empty_reads = 0;
                    self.stray_responses += 1;
                    warn!(
                        id = %response.id,
                        method = response.method.as_deref(),
                        awaiting = request_id,
                        "ignoring response that does not match the pending request"
                    );
                }
                None => {
                    empty_reads += 1;
                    tokio::time::sleep(policy.poll_interval).await;
                }
            }
        }
    }

    /// Execute a full run and analyse its outcome.
    ///
    /// A drain timeout is not an error here: it yields a report with no
    /// final response so the operator still sees what streamed in. Use
    /// [`RunReport::verdict`] to judge the run.
    ///
    /// # Errors
    ///
    /// Handshake, session, and transport failures abort the run.
    pub async fn run(&mut self, config: &HarnessConfig) -> Result<RunReport> {
        let started_at = Utc::now();
        let handshake_timeout = config.handshake_timeout();

        self.initialize(&config.client, handshake_timeout).await?;
        let session_id = self.create_session(handshake_timeout).await?;
        let request_id = self.prompt(&session_id, &config.prompt).await?;

        let final_response = match self
            .drain_until_final_response(request_id, &config.drain_policy())
            .await
        {
            Ok(response) => Some(response),
            Err(AppError::Timeout(msg)) => {
                warn!(reason = msg.as_str(), "drain ended without a final response");
                None
            }
            Err(err) => return Err(err),
        };

        let notifications = std::mem::take(&mut self.notifications);
        let analysis = Analysis::from_frames(&notifications, final_response.as_ref());

        Ok(RunReport {
            session_id: self.session_id.clone(),
            agent: self.agent_info.clone(),
            stray_responses: self.stray_responses,
            started_at,
            finished_at: Utc::now(),
            analysis,
        })
    }

    /// Shut the transport down, closing the agent's input first.
    ///
    /// # Errors
    ///
    /// Propagates transport shutdown failures.
    pub async fn shutdown(&mut self, grace: Duration) -> Result<ShutdownOutcome> {
        self.transport.shutdown(grace).await
    }

    // ── Private helpers ───────────────────────────────────────────────────────

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn expect_state(&self, expected: RunState, step: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(AppError::Acp(format!(
                "cannot {step} in state {:?}, expected {expected:?}",
                self.state
            )))
        }
    }

    fn settle(&self, final_response: &Response) -> RunState {
        if Analysis::from_frames(&self.notifications, Some(final_response)).passed() {
            RunState::Completed
        } else {
            RunState::Failed
        }
    }

    fn track<R>(&mut self, result: Result<R>) -> Result<R> {
        if result.is_err() {
            self.state = RunState::Failed;
        }
        result
    }

    /// Read exactly one frame and require it to be the response to `id`.
    async fn read_response(&mut self, id: u64, method: &str, timeout: Duration) -> Result<Response> {
        self.pending = Some(id);

        let response = match self.receive(timeout).await {
            None => {
                return Err(AppError::Timeout(format!("no {method} response")));
            }
            Some(Frame::Notification(notification)) => {
                return Err(AppError::Acp(format!(
                    "expected {method} response (id {id}), got {} notification",
                    notification.method
                )));
            }
            Some(Frame::Response(response)) if !response.answers(id) => {
                return Err(AppError::Acp(format!(
                    "expected {method} response (id {id}), got id {}",
                    response.id
                )));
            }
            Some(Frame::Response(response)) => response,
        };

        self.pending = None;

        if let Some(message) = response.error_message() {
            return Err(AppError::Rpc(format!("{method} failed: {message}")));
        }

        Ok(response)
    }
}
