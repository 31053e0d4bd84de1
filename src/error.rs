use std::fmt;

use serde::Serialize;

use crate::err::{GatewayError, GatewayErrorKind};

#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    ConnectionError = 2,
    AuthError = 3,
    TimeoutError = 4,
    ProtocolError = 5,
    RpcError = 6,
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::GeneralError => write!(f, "general error"),
            Self::ConnectionError => write!(f, "connection error"),
            Self::AuthError => write!(f, "auth error"),
            Self::TimeoutError => write!(f, "timeout error"),
            Self::ProtocolError => write!(f, "protocol error"),
            Self::RpcError => write!(f, "rpc error"),
        }
    }
}

#[derive(Debug)]
pub struct AppError {
    pub message: String,
    pub code: ExitCode,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

impl AppError {
    #[must_use]
    pub fn not_implemented(command: &str) -> Self {
        Self {
            message: format!("{command}: not yet implemented"),
            code: ExitCode::GeneralError,
        }
    }

    #[must_use]
    pub fn to_json(&self) -> String {
        let output = ErrorOutput {
            error: &self.message,
            code: self.code as u8,
        };
        serde_json::to_string(&output).unwrap_or_else(|_| {
            format!(r#"{{"error":"{}","code":{}}}"#, self.message, self.code as u8)
        })
    }

    pub fn print_json_stderr(&self) {
        eprintln!("{}", self.to_json());
    }
}

impl From<GatewayError> for AppError {
    fn from(error: GatewayError) -> Self {
        let code = match error.kind() {
            GatewayErrorKind::Connection => ExitCode::ConnectionError,
            GatewayErrorKind::Timeout => ExitCode::TimeoutError,
            GatewayErrorKind::Auth => ExitCode::AuthError,
            GatewayErrorKind::Protocol => ExitCode::ProtocolError,
            GatewayErrorKind::Rpc { .. } => ExitCode::RpcError,
        };
        Self {
            message: error.to_string(),
            code,
        }
    }
}

impl From<crate::config::ConfigError> for AppError {
    fn from(error: crate::config::ConfigError) -> Self {
        Self {
            message: error.to_string(),
            code: ExitCode::GeneralError,
        }
    }
}

#[derive(Serialize)]
struct ErrorOutput<'a> {
    error: &'a str,
    code: u8,
}
