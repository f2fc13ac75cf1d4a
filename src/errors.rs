use thiserror::Error;

/// Request-level failures raised by the MCP layer itself.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {message}")]
    BadRequest {
        code: &'static str,
        message: &'static str,
    },
    #[error("internal error")]
    Internal { code: &'static str, message: String },
}

impl AppError {
    pub fn bad_request(code: &'static str, message: &'static str) -> Self {
        Self::BadRequest { code, message }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            code: "internal_error",
            message: message.into(),
        }
    }
}

/// Failures of the bridge core.
///
/// Configuration and transport variants are broadcast to every waiter of a
/// connection, so the type is `Clone`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error(
        "MCP_BRIDGE_SECRET is not configured; set it to the base64 bridge secret shown by the application"
    )]
    SecretNotConfigured,
    #[error(
        "failed to answer the authentication challenge: {message}; check that MCP_BRIDGE_SECRET holds the base64 bridge secret"
    )]
    InvalidSecret { message: String },
    #[error("remote application unavailable ({reason}); ensure the application is running")]
    Unavailable { reason: String },
    #[error("authentication reset: the connection was replaced before the handshake completed")]
    AuthenticationReset,
    #[error("call '{method}' timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },
    #[error("{message}")]
    Remote { message: String },
    #[error("protocol error: {message}")]
    Protocol { message: String },
}

impl BridgeError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn invalid_secret(message: impl Into<String>) -> Self {
        Self::InvalidSecret {
            message: message.into(),
        }
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Coarse category used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SecretNotConfigured | Self::InvalidSecret { .. } => "configuration",
            Self::Unavailable { .. } | Self::AuthenticationReset => "transport",
            Self::Timeout { .. } => "timeout",
            Self::Remote { .. } => "application",
            Self::Protocol { .. } => "protocol",
        }
    }
}
