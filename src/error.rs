//! Error types for Outreach Assist.

use std::time::Duration;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("CRM error: {0}")]
    Crm(#[from] CrmError),

    #[error("Assistant error: {0}")]
    Assistant(#[from] AssistantError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mailbox and SMTP errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Failed to connect to {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("TLS negotiation failed with {host}: {reason}")]
    Tls { host: String, reason: String },

    #[error("Mailbox login failed for {username}")]
    Auth { username: String },

    #[error("IMAP protocol error: {0}")]
    Protocol(String),

    #[error("Failed to parse message: {0}")]
    Parse(String),

    #[error("Invalid mail address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to send mail to {to}: {reason}")]
    Send { to: String, reason: String },
}

/// CRM API errors.
#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("CRM request failed with HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("CRM transport error: {0}")]
    Transport(String),

    #[error("Unexpected CRM response: {0}")]
    InvalidResponse(String),
}

impl CrmError {
    /// Transient failures worth another attempt: transport-level errors,
    /// rate limiting and server-side 5xx responses.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::TokenRefresh(_) | Self::InvalidResponse(_) => false,
        }
    }
}

/// Conversational assistant errors.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("Assistant request failed with HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Assistant transport error: {0}")]
    Transport(String),

    #[error("Assistant run ended in state {status}")]
    RunFailed { status: String },

    #[error("Assistant run did not complete within {waited:?}")]
    Timeout { waited: Duration },

    #[error("Assistant returned no reply message")]
    EmptyReply,

    #[error("Unexpected assistant response: {0}")]
    InvalidResponse(String),
}

impl AssistantError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
