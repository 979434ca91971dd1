//! JSON-RPC frames exchanged with the agent.
//!
//! Outbound traffic is always a [`Request`]. Inbound lines decode into a
//! [`Frame`], which is a [`Response`] when the object carries an `id` and a
//! [`Notification`] when it does not. Nothing else about the object takes
//! part in that decision.
//!
//! | Method           | Direction | Kind         |
//! |------------------|-----------|--------------|
//! | `initialize`     | → agent   | request      |
//! | `session/new`    | → agent   | request      |
//! | `session/prompt` | → agent   | request      |
//! | `session/update` | ← agent   | notification |

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::config::ClientInfoConfig;
use crate::{AppError, Result};

/// Value of the `jsonrpc` field on every outbound frame.
pub const JSONRPC_VERSION: &str = "2.0";

/// ACP protocol version announced by `initialize`.
pub const PROTOCOL_VERSION: &str = "1";

/// Method names used by the harness.
pub mod methods {
    /// Capability negotiation request.
    pub const INITIALIZE: &str = "initialize";
    /// Session creation request.
    pub const SESSION_NEW: &str = "session/new";
    /// Prompt request within a session.
    pub const SESSION_PROMPT: &str = "session/prompt";
    /// Streamed progress notification from the agent.
    pub const SESSION_UPDATE: &str = "session/update";
}

/// `sessionUpdate` discriminator for streamed assistant text.
pub const AGENT_MESSAGE_CHUNK: &str = "agent_message_chunk";

// ── Outbound ──────────────────────────────────────────────────────────────────

/// Outbound JSON-RPC request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    /// Always [`JSONRPC_VERSION`].
    pub jsonrpc: &'static str,
    /// Correlation identifier, unique within a run.
    pub id: u64,
    /// Method name.
    pub method: &'static str,
    /// Method parameters.
    pub params: Value,
}

impl Request {
    fn new(id: u64, method: &'static str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        }
    }

    /// `initialize` request announcing protocol version `"1"` and `client`.
    #[must_use]
    pub fn initialize(id: u64, client: &ClientInfoConfig) -> Self {
        Self::new(
            id,
            methods::INITIALIZE,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "clientInfo": {
                    "name": client.name,
                    "version": client.version,
                }
            }),
        )
    }

    /// `session/new` request with empty parameters.
    #[must_use]
    pub fn session_new(id: u64) -> Self {
        Self::new(id, methods::SESSION_NEW, json!({}))
    }

    /// `session/prompt` request carrying a single text content block.
    #[must_use]
    pub fn session_prompt(id: u64, session_id: &str, text: &str) -> Self {
        Self::new(
            id,
            methods::SESSION_PROMPT,
            json!({
                "sessionId": session_id,
                "prompt": [
                    { "type": "text", "text": text }
                ]
            }),
        )
    }

    /// Encode the request as a JSON value ready for the wire.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Acp`] if serialisation fails.
    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self)
            .map_err(|e| AppError::Acp(format!("failed to serialise {} request: {e}", self.method)))
    }
}

// ── Inbound ───────────────────────────────────────────────────────────────────

/// One decoded inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// The object carried an `id`.
    Response(Response),
    /// The object carried no `id`.
    Notification(Notification),
}

impl Frame {
    /// Decode one wire line.
    ///
    /// # Errors
    ///
    /// - [`AppError::Acp`]`("malformed json: …")` when the line is not JSON.
    /// - [`AppError::Acp`]`("frame is not a JSON object …")` for arrays and
    ///   scalars.
    /// - [`AppError::Acp`]`("malformed frame: …")` when a known field has the
    ///   wrong type (for example a numeric `method`).
    pub fn parse(line: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(line).map_err(|e| AppError::Acp(format!("malformed json: {e}")))?;
        Self::from_value(value)
    }

    /// Classify an already-decoded JSON value.
    ///
    /// # Errors
    ///
    /// See [`Frame::parse`].
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(AppError::Acp(format!(
                "frame is not a JSON object: {value}"
            )));
        }

        let frame = if value.get("id").is_some() {
            Self::Response(serde_json::from_value(value).map_err(malformed)?)
        } else {
            Self::Notification(serde_json::from_value(value).map_err(malformed)?)
        };

        Ok(frame)
    }

    /// Correlation identifier, present only on responses.
    #[must_use]
    pub fn id(&self) -> Option<&Value> {
        match self {
            Self::Response(response) => Some(&response.id),
            Self::Notification(_) => None,
        }
    }

    /// Whether the frame is a notification.
    #[must_use]
    pub fn is_notification(&self) -> bool {
        matches!(self, Self::Notification(_))
    }
}

/// Inbound frame carrying an `id`.
///
/// `result` and `error` distinguish "absent" from "present but `null`": a
/// literal `"error": null` still counts as an error.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Response {
    /// Correlation identifier exactly as the agent sent it.
    pub id: Value,
    /// Set when the agent sent a request of its own rather than a response.
    #[serde(default)]
    pub method: Option<String>,
    /// Success payload.
    #[serde(default, deserialize_with = "present")]
    pub result: Option<Value>,
    /// Failure payload.
    #[serde(default, deserialize_with = "present")]
    pub error: Option<Value>,
}

impl Response {
    /// Whether this frame answers the request numbered `request_id`.
    #[must_use]
    pub fn answers(&self, request_id: u64) -> bool {
        self.id.as_u64() == Some(request_id)
    }

    /// Whether the response carries an `error` field.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// `result.sessionId`, when present as a non-empty string.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.result
            .as_ref()?
            .get("sessionId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    /// `result.stopReason` rendered as a string.
    #[must_use]
    pub fn stop_reason(&self) -> Option<String> {
        let reason = self.result.as_ref()?.get("stopReason")?;
        Some(
            reason
                .as_str()
                .map_or_else(|| reason.to_string(), str::to_owned),
        )
    }

    /// Human-readable rendering of the `error` field.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        let error = self.error.as_ref()?;
        let rendered = match (
            error.get("code").and_then(Value::as_i64),
            error.get("message").and_then(Value::as_str),
        ) {
            (Some(code), Some(message)) => format!("{message} (code {code})"),
            (None, Some(message)) => message.to_owned(),
            _ => error.to_string(),
        };
        Some(rendered)
    }
}

/// Inbound frame without an `id`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Notification {
    /// Notification method; empty when the agent omitted it.
    #[serde(default)]
    pub method: String,
    /// Method-specific payload.
    #[serde(default)]
    pub params: Value,
}

impl Notification {
    /// Whether this is a `session/update` notification.
    #[must_use]
    pub fn is_session_update(&self) -> bool {
        self.method == methods::SESSION_UPDATE
    }

    /// Streamed text carried by an `agent_message_chunk` update.
    ///
    /// Returns `None` unless the method is `session/update`, the update's
    /// `sessionUpdate` is `agent_message_chunk`, and the content block's
    /// `type` is `text`. A text block without a `text` field yields `""`.
    #[must_use]
    pub fn agent_message_text(&self) -> Option<&str> {
        if !self.is_session_update() {
            return None;
        }

        let update = self.params.get("update")?;
        if update.get("sessionUpdate").and_then(Value::as_str) != Some(AGENT_MESSAGE_CHUNK) {
            return None;
        }

        let content = update.get("content")?;
        if content.get("type").and_then(Value::as_str) != Some("text") {
            return None;
        }

        Some(content.get("text").and_then(Value::as_str).unwrap_or(""))
    }
}

/// Identity and protocol version the agent reported from `initialize`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AgentInfo {
    /// `result.protocolVersion`, rendered as a string.
    pub protocol_version: Option<String>,
    /// `result.agentInfo.name`.
    pub name: Option<String>,
    /// `result.agentInfo.version`.
    pub version: Option<String>,
}

impl AgentInfo {
    /// Extract agent details from an `initialize` result payload.
    ///
    /// Every field is optional; an empty result yields [`AgentInfo::default`].
    #[must_use]
    pub fn from_initialize_result(result: Option<&Value>) -> Self {
        let Some(result) = result else {
            return Self::default();
        };

        let text = |v: &Value| v.as_str().map_or_else(|| v.to_string(), str::to_owned);
        let agent = result.get("agentInfo");

        Self {
            protocol_version: result.get("protocolVersion").map(text),
            name: agent
                .and_then(|a| a.get("name"))
                .and_then(Value::as_str)
                .map(str::to_owned),
            version: agent
                .and_then(|a| a.get("version"))
                .and_then(Value::as_str)
                .map(str::to_owned),
        }
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

fn malformed(e: serde_json::Error) -> AppError {
    AppError::Acp(format!("malformed frame: {e}"))
}

/// Map a present field (even `null`) to `Some`; absence is handled by
/// `#[serde(default)]`.
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}
