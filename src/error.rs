//! Error types for the inbox agent.
//!
//! Only connection-level failures (`Mailbox`, `Transport` at construction,
//! `Http` at client build) are allowed to surface at the run boundary.
//! Everything else is absorbed into the run report by the orchestrator.

/// Top-level error type for a triage run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("HTTP client error: {0}")]
    Http(#[from] HttpError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}

/// Configuration-related errors, raised once at the request boundary.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mailbox session errors. All of these are fatal to the run.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Failed to connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("TLS setup failed: {reason}")]
    Tls { reason: String },

    #[error("Authentication failed for {user}")]
    Auth { user: String },

    #[error("Protocol error: {reason}")]
    Protocol { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mail transport errors. `Send` is absorbed per message;
/// the rest are fatal at transport construction.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("SMTP relay setup failed for {host}: {reason}")]
    Relay { host: String, reason: String },

    #[error("Invalid {field} address: {reason}")]
    InvalidAddress { field: String, reason: String },

    #[error("Failed to build outgoing message: {reason}")]
    BuildMessage { reason: String },

    #[error("SMTP send failed: {reason}")]
    Send { reason: String },
}

/// HTTP client errors, absorbed per unsubscribe attempt.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("Failed to build HTTP client: {reason}")]
    Build { reason: String },

    #[error("Request to {url} failed: {reason}")]
    Request { url: String, reason: String },
}

/// Raised when raw message bytes cannot be interpreted as an email at all.
/// Missing individual headers are handled with defaults, never with this.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("message source could not be parsed as an email")]
    Unparseable,
}

/// Result type alias for the agent.
pub type Result<T> = std::result::Result<T, Error>;
