//! Run configuration — the request bundle accepted at the API boundary.
//!
//! Field names mirror the JSON wire format (camelCase). The bundle is
//! validated once via [`AgentRunRequest::validate`] and treated as
//! immutable for the duration of a run.

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::ConfigError;

/// Full configuration bundle for one triage run.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRunRequest {
    pub imap: ImapConfig,
    pub smtp: SmtpConfig,
    pub agent_profile: AgentProfile,
    pub settings: AgentSettings,
}

/// IMAP mailbox credentials and target mailbox.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImapConfig {
    pub host: String,
    #[serde(default = "default_imap_port")]
    pub port: u16,
    /// Implicit TLS. Plaintext sessions are rejected at validation.
    #[serde(default = "default_true")]
    pub secure: bool,
    pub user: String,
    pub password: SecretString,
    #[serde(default = "default_mailbox")]
    pub mailbox: String,
}

/// SMTP submission credentials.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub secure: bool,
    pub user: String,
    pub password: SecretString,
}

/// Identity used when signing replies sent on the user's behalf.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProfile {
    pub display_name: String,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    /// Full signature text. When absent, a block is built from the
    /// name/title/company fields instead.
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub reply_tone: ReplyTone,
}

/// Reply phrasing register. Selects templates, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyTone {
    #[default]
    Formal,
    Neutral,
}

/// Automation gates and thresholds for a run.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSettings {
    /// Gates reply dispatch for messages at or above the threshold.
    #[serde(default = "default_true")]
    pub auto_reply_important: bool,
    /// Gates unsubscribe attempts for marketing messages.
    #[serde(default = "default_true")]
    pub auto_unsubscribe_marketing: bool,
    /// Gates summary bullet generation for reply bodies.
    #[serde(default = "default_true")]
    pub include_summaries: bool,
    /// Accepted for callers that schedule delayed sends. Not enforced here.
    #[serde(default = "default_reply_delay")]
    pub reply_delay_minutes: u32,
    /// Minimum importance score (0-100) for a message to earn a reply.
    #[serde(default = "default_threshold")]
    pub importance_threshold: u8,
}

impl AgentRunRequest {
    /// Validate the bundle once, before any network I/O.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require(&self.imap.host, "imap.host", "IMAP hostname is required")?;
        require(&self.imap.user, "imap.user", "IMAP username is required")?;
        require(&self.imap.mailbox, "imap.mailbox", "Mailbox name is required")?;
        require(&self.smtp.host, "smtp.host", "SMTP hostname is required")?;
        require(&self.smtp.user, "smtp.user", "SMTP username is required")?;
        require(
            &self.agent_profile.display_name,
            "agentProfile.displayName",
            "A display name is required for outbound mail",
        )?;

        if !self.imap.secure {
            return Err(ConfigError::InvalidValue {
                key: "imap.secure".into(),
                message: "plaintext IMAP sessions are not supported".into(),
            });
        }
        if !self.smtp.secure {
            return Err(ConfigError::InvalidValue {
                key: "smtp.secure".into(),
                message: "plaintext SMTP sessions are not supported".into(),
            });
        }

        if self.settings.importance_threshold > 100 {
            return Err(ConfigError::InvalidValue {
                key: "settings.importanceThreshold".into(),
                message: format!(
                    "must be between 0 and 100, got {}",
                    self.settings.importance_threshold
                ),
            });
        }

        Ok(())
    }
}

fn require(value: &str, key: &str, hint: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingRequired {
            key: key.into(),
            hint: hint.into(),
        });
    }
    Ok(())
}

fn default_true() -> bool {
    true
}

fn default_imap_port() -> u16 {
    993
}

fn default_smtp_port() -> u16 {
    587
}

fn default_mailbox() -> String {
    "INBOX".to_string()
}

fn default_reply_delay() -> u32 {
    3
}

fn default_threshold() -> u8 {
    65
}
