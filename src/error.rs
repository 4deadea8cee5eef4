use crate::auth::LogoutReason;
use serde::Deserialize;
use thiserror::Error;

#[derive(Clone, Debug, Error)]
pub enum ApiError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Timeout: {0}")]
    Timeout(String),
    #[error("Request failed ({status}): {message}")]
    Http { status: u16, message: String },
    #[error("Session ended: {0}")]
    SessionEnded(LogoutReason),
    #[error("Response error: {0}")]
    Parse(String),
    #[error("Request error: {0}")]
    Serialization(String),
}

impl ApiError {
    /// Network-layer failures are never retried by the session layer.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Error body returned by the API on non-2xx responses.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorEnvelope {
    /// Parses an error body, tolerating empty or non-JSON payloads.
    #[must_use]
    pub fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    #[must_use]
    pub fn auth_code(&self) -> Option<AuthErrorCode> {
        self.code.as_deref().and_then(AuthErrorCode::parse)
    }

    #[must_use]
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }
}

/// Codes carried by `401` responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthErrorCode {
    TokenExpired,
    SessionExpired,
    NoToken,
    InvalidToken,
}

impl AuthErrorCode {
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        match code.trim() {
            "TOKEN_EXPIRED" => Some(Self::TokenExpired),
            "SESSION_EXPIRED" => Some(Self::SessionExpired),
            "NO_TOKEN" => Some(Self::NoToken),
            "INVALID_TOKEN" => Some(Self::InvalidToken),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::NoToken => "NO_TOKEN",
            Self::InvalidToken => "INVALID_TOKEN",
        }
    }

    /// Only an expired access token can be recovered by refreshing.
    #[must_use]
    pub fn is_recoverable(self) -> bool {
        matches!(self, Self::TokenExpired)
    }
}
