//! Error taxonomy surfaced to callers of the Gateway client.

use std::fmt;

/// Stable, programmatically-branchable error kind for every failure the client can surface.
///
/// Every RPC either resolves with a result or rejects with one of these, carrying a stable
/// `code()` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayErrorKind {
    /// Socket could not be opened, closed unexpectedly, or a write failed.
    Connection,
    /// Handshake deadline, per-request deadline, or agent-completion deadline elapsed.
    Timeout,
    /// Connect response was `ok=false` with code `UNAVAILABLE` or a message mentioning auth.
    Auth,
    /// An inbound frame could not be decoded during the handshake.
    Protocol,
    /// A well-formed response arrived with `ok=false`; code/message came from the server.
    Rpc {
        /// Server-supplied error code (opaque beyond the three reserved strings).
        code: String,
    },
}

impl GatewayErrorKind {
    /// The stable wire code for this error kind, suitable for programmatic branching.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Connection => "UNAVAILABLE",
            Self::Timeout => "AGENT_TIMEOUT",
            Self::Auth => "UNAVAILABLE",
            Self::Protocol => "UNKNOWN",
            Self::Rpc {
                code,
            } => code,
        }
    }
}

/// Error type returned by every fallible operation in this crate.
#[derive(Debug, Clone)]
pub struct GatewayError {
    kind: GatewayErrorKind,
    message: String,
}

impl GatewayError {
    /// Builds an error from a kind and a human-readable message.
    #[must_use]
    pub fn new(kind: GatewayErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for a connection-layer failure.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Connection, message)
    }

    /// Shorthand for a timeout failure.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Timeout, message)
    }

    /// Shorthand for an authentication failure.
    #[must_use]
    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Auth, message)
    }

    /// Shorthand for a handshake decode failure.
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Protocol, message)
    }

    /// Shorthand for a server-reported RPC failure, preserving its wire code.
    #[must_use]
    pub fn rpc(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            GatewayErrorKind::Rpc {
                code: code.into(),
            },
            message,
        )
    }

    /// The error's kind.
    #[must_use]
    pub const fn kind(&self) -> &GatewayErrorKind {
        &self.kind
    }

    /// The stable wire code for this error, suitable for programmatic branching.
    #[must_use]
    pub fn code(&self) -> &str {
        self.kind.code()
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message)
    }
}

impl std::error::Error for GatewayError {}

impl From<serde_json::Error> for GatewayError {
    fn from(error: serde_json::Error) -> Self {
        Self::protocol(error.to_string())
    }
}

impl From<url::ParseError> for GatewayError {
    fn from(error: url::ParseError) -> Self {
        Self::connection(error.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for GatewayError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::connection(error.to_string())
    }
}

/// Result type returned by every fallible operation in this crate.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_maps_reserved_kinds() {
        assert_eq!(GatewayError::connection("x").code(), "UNAVAILABLE");
        assert_eq!(GatewayError::timeout("x").code(), "AGENT_TIMEOUT");
        assert_eq!(GatewayError::auth("x").code(), "UNAVAILABLE");
        assert_eq!(GatewayError::protocol("x").code(), "UNKNOWN");
    }

    #[test]
    fn rpc_error_preserves_server_code() {
        let err = GatewayError::rpc("BOT_NOT_FOUND", "no such bot");
        assert_eq!(err.code(), "BOT_NOT_FOUND");
        assert_eq!(err.to_string(), "BOT_NOT_FOUND: no such bot");
    }

    #[test]
    fn display_includes_code_and_message() {
        let err = GatewayError::connection("refused");
        assert_eq!(err.to_string(), "UNAVAILABLE: refused");
    }
}
