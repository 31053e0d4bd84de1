//! Wire frame types, the closed set of RPC methods, and the closed set of event names.
//!
//! The wire frame is the only unit exchanged with the Gateway. Encoding omits
//! `params` when absent rather than sending `null`; decoding is lenient post-handshake (unparseable
//! frames are dropped, not errors).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The closed set of RPC method names exposed by the Gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RpcMethod {
    Health,
    Status,
    ConfigGet,
    ConfigApply,
    ConfigPatch,
    AgentIdentityGet,
    UsageCost,
    Send,
    Agent,
    CronAdd,
    CronList,
    CronRemove,
}

impl RpcMethod {
    /// The exact wire string for this method, as it appears in a request frame's `method` field.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Health => "health",
            Self::Status => "status",
            Self::ConfigGet => "configGet",
            Self::ConfigApply => "configApply",
            Self::ConfigPatch => "configPatch",
            Self::AgentIdentityGet => "agentIdentityGet",
            Self::UsageCost => "usageCost",
            Self::Send => "send",
            Self::Agent => "agent",
            Self::CronAdd => "cronAdd",
            Self::CronList => "cronList",
            Self::CronRemove => "cronRemove",
        }
    }
}

/// Well-known error codes that are part of the wire contract. Any other
/// server-defined code passes through opaquely as `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    Unavailable,
    AgentTimeout,
    Unknown,
    Other(String),
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Unavailable => "UNAVAILABLE",
            Self::AgentTimeout => "AGENT_TIMEOUT",
            Self::Unknown => "UNKNOWN",
            Self::Other(code) => code,
        }
    }
}

impl From<&str> for ErrorCode {
    fn from(code: &str) -> Self {
        match code {
            "UNAVAILABLE" => Self::Unavailable,
            "AGENT_TIMEOUT" => Self::AgentTimeout,
            "UNKNOWN" => Self::Unknown,
            other => Self::Other(other.to_owned()),
        }
    }
}

/// The closed set of push event names the Gateway emits. Unknown names are
/// dropped upward rather than erroring, for forward compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    AgentOutput,
    Presence,
    Keepalive,
    Shutdown,
}

impl EventName {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AgentOutput => "agentOutput",
            Self::Presence => "presence",
            Self::Keepalive => "keepalive",
            Self::Shutdown => "shutdown",
        }
    }

    /// Parses a wire event name, returning `None` for anything not in the closed set (forward
    /// compatibility).
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "agentOutput" => Some(Self::AgentOutput),
            "presence" => Some(Self::Presence),
            "keepalive" => Some(Self::Keepalive),
            "shutdown" => Some(Self::Shutdown),
            _ => None,
        }
    }
}

/// A server-reported RPC failure, as carried in a response frame's `error` field.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireError {
    pub code: String,
    pub message: String,
}

/// Outgoing request frame (`{"type":"req", ...}`).
#[derive(Debug, Clone, Serialize)]
pub struct RequestFrame {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: Uuid,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RequestFrame {
    #[must_use]
    pub fn new(id: Uuid, method: &str, params: Option<Value>) -> Self {
        Self {
            kind: "req",
            id,
            method: method.to_owned(),
            params,
        }
    }

    /// Serializes this frame as a single-line JSON text frame.
    ///
    /// # Errors
    /// Returns an error if the params value cannot be serialized.
    pub fn to_line(&self) -> crate::err::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// The connect request payload sent as step 3 of the handshake.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub min_protocol: u32,
    pub max_protocol: u32,
    pub client: ClientMetadataWire,
    pub auth: AuthWire,
    pub role: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientMetadataWire {
    pub id: String,
    pub version: String,
    pub platform: String,
    pub mode: String,
}

/// `auth` is `{token}` XOR `{password}` — no `mode` field is transmitted, and never both.
#[derive(Debug, Clone, Serialize)]
pub struct AuthWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl AuthWire {
    #[must_use]
    pub fn token(token: String) -> Self {
        Self { token: Some(token), password: None }
    }

    #[must_use]
    pub fn password(password: String) -> Self {
        Self { token: None, password: Some(password) }
    }
}

/// Raw inbound message, deserialized once before classification into one of the Gateway's three
/// frame kinds.
#[derive(Debug, Clone, Deserialize)]
pub struct RawFrame {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub id: Option<Value>,
    pub ok: Option<bool>,
    pub payload: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<WireError>,
    pub name: Option<String>,
}
