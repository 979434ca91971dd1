//! Run analysis and the operator-facing summary.
//!
//! [`Analysis`] is computed once from the drained notification log and the
//! final response. The run passes iff at least one content chunk streamed
//! in, a final response arrived, and that response carries no `error`.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::acp::frame::{AgentInfo, Notification, Response};
use crate::{AppError, Result};

/// Outcome metrics of one prompt interaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Analysis {
    /// Every notification received while draining.
    pub notifications_received: usize,
    /// The `session/update` subset of those notifications.
    pub session_updates: usize,
    /// Streamed `agent_message_chunk` texts in arrival order.
    pub content_chunks: Vec<String>,
    /// Whether the response to the prompt request arrived.
    pub final_response_received: bool,
    /// `result.stopReason` of the final response.
    pub stop_reason: Option<String>,
    /// `error` of the final response, verbatim.
    pub error: Option<Value>,
}

impl Analysis {
    /// Analyse a drained notification log and the final response, if any.
    #[must_use]
    pub fn from_frames(notifications: &[Notification], final_response: Option<&Response>) -> Self {
        let updates: Vec<&Notification> = notifications
            .iter()
            .filter(|n| n.is_session_update())
            .collect();

        let content_chunks = updates
            .iter()
            .filter_map(|n| n.agent_message_text())
            .map(str::to_owned)
            .collect();

        Self {
            notifications_received: notifications.len(),
            session_updates: updates.len(),
            content_chunks,
            final_response_received: final_response.is_some(),
            stop_reason: final_response.and_then(Response::stop_reason),
            error: final_response.and_then(|r| r.error.clone()),
        }
    }

    /// Whether the run passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        !self.content_chunks.is_empty() && self.final_response_received && self.error.is_none()
    }

    /// All chunks joined in arrival order.
    #[must_use]
    pub fn combined_text(&self) -> String {
        self.content_chunks.concat()
    }

    /// Classify a failed run.
    ///
    /// # Errors
    ///
    /// - [`AppError::Timeout`]: no final response.
    /// - [`AppError::Rpc`]: the final response carries `error`, regardless
    ///   of how many chunks streamed in first.
    /// - [`AppError::NoContent`]: clean final response, zero chunks.
    pub fn verdict(&self) -> Result<()> {
        if !self.final_response_received {
            return Err(AppError::Timeout("no final response received".into()));
        }

        if let Some(error) = &self.error {
            return Err(AppError::Rpc(format!("error in final response: {error}")));
        }

        if self.content_chunks.is_empty() {
            return Err(AppError::NoContent(
                "no agent_message_chunk text in session/update notifications".into(),
            ));
        }

        Ok(())
    }
}

/// Full record of one harness run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Session id returned by `session/new`.
    pub session_id: Option<String>,
    /// Agent details from `initialize`.
    pub agent: AgentInfo,
    /// Responses whose id matched no pending request.
    pub stray_responses: u32,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When analysis completed.
    pub finished_at: DateTime<Utc>,
    /// Outcome metrics.
    #[serde(flatten)]
    pub analysis: Analysis,
}

impl RunReport {
    /// Whether the run passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.analysis.passed()
    }

    /// See [`Analysis::verdict`].
    ///
    /// # Errors
    ///
    /// Returns the failure class of a failed run.
    pub fn verdict(&self) -> Result<()> {
        self.analysis.verdict()
    }

    /// Render the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] if serialisation fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Io(format!("failed to serialise report: {e}")))
    }
}

impl Display for RunReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let a = &self.analysis;
        let rule = "-".repeat(60);

        writeln!(f, "{}", "=".repeat(60))?;
        writeln!(f, "Results")?;
        writeln!(f, "{}", "=".repeat(60))?;

        if let Some(name) = &self.agent.name {
            writeln!(
                f,
                "Agent: {name} {}",
                self.agent.version.as_deref().unwrap_or("")
            )?;
        }
        if let Some(session_id) = &self.session_id {
            writeln!(f, "Session: {session_id}")?;
        }
        writeln!(f, "Notifications received: {}", a.notifications_received)?;
        writeln!(f, "session/update notifications: {}", a.session_updates)?;
        if self.stray_responses > 0 {
            writeln!(f, "Stray responses ignored: {}", self.stray_responses)?;
        }

        if a.content_chunks.is_empty() {
            writeln!(f, "✗ No content found in notifications")?;
        } else {
            writeln!(f, "✓ Content found: {} chunk(s)", a.content_chunks.len())?;
            writeln!(f, "{rule}")?;
            for (i, chunk) in a.content_chunks.iter().enumerate() {
                writeln!(f, "Chunk {}: {chunk}", i + 1)?;
            }
            writeln!(f, "{rule}")?;
        }

        match (&a.error, a.final_response_received) {
            (Some(error), _) => writeln!(f, "✗ Error in final response: {error}")?,
            (None, true) => writeln!(
                f,
                "✓ Stop reason: {}",
                a.stop_reason.as_deref().unwrap_or("(none)")
            )?,
            (None, false) => writeln!(f, "✗ No final response received")?,
        }

        if self.passed() {
            write!(f, "PASSED: ACP protocol working correctly")
        } else {
            write!(f, "FAILED: missing content or errors")
        }
    }
}
