//! Outbound collaborators — SMTP mail transport and HTTP client.
//!
//! Both are consumed by the orchestrator through small traits so the
//! pipeline can be exercised with in-memory fakes.

use std::time::Duration;

use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use reqwest::header::CONTENT_TYPE;
use secrecy::ExposeSecret;
use tracing::info;

use crate::config::SmtpConfig;
use crate::error::{HttpError, TransportError};

// ── Mail transport ──────────────────────────────────────────────────

/// An outbound message, threading headers included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub in_reply_to: Option<String>,
    pub references: Vec<String>,
}

/// Delivery receipt. A non-empty rejection list marks the attempt
/// failed without being a transport error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReceipt {
    pub rejected: Vec<String>,
}

/// Mail transmission capability.
pub trait MailTransport {
    fn send(&self, mail: &OutgoingMail) -> Result<SendReceipt, TransportError>;
}

/// SMTP submission via lettre.
pub struct SmtpMailer {
    transport: SmtpTransport,
}

impl SmtpMailer {
    /// Build the relay transport. Fails fast on an unusable relay host;
    /// the connection itself is established lazily on first send.
    pub fn connect(config: &SmtpConfig) -> Result<Self, TransportError> {
        let creds = Credentials::new(
            config.user.clone(),
            config.password.expose_secret().to_string(),
        );

        let transport = SmtpTransport::relay(&config.host)
            .map_err(|e| TransportError::Relay {
                host: config.host.clone(),
                reason: e.to_string(),
            })?
            .port(config.port)
            .credentials(creds)
            .build();

        Ok(Self { transport })
    }
}

impl MailTransport for SmtpMailer {
    fn send(&self, mail: &OutgoingMail) -> Result<SendReceipt, TransportError> {
        let mut builder = Message::builder()
            .from(mail.from.parse().map_err(|e| TransportError::InvalidAddress {
                field: "from".into(),
                reason: format!("{e}"),
            })?)
            .to(mail.to.parse().map_err(|e| TransportError::InvalidAddress {
                field: "to".into(),
                reason: format!("{e}"),
            })?)
            .subject(mail.subject.clone());

        if let Some(in_reply_to) = &mail.in_reply_to {
            builder = builder.in_reply_to(in_reply_to.clone());
        }
        if !mail.references.is_empty() {
            builder = builder.references(mail.references.join(" "));
        }

        let message = builder
            .body(mail.body.clone())
            .map_err(|e| TransportError::BuildMessage {
                reason: e.to_string(),
            })?;

        self.transport
            .send(&message)
            .map_err(|e| TransportError::Send {
                reason: e.to_string(),
            })?;

        info!(to = %mail.to, "Mail dispatched");
        // lettre surfaces rejected recipients as send errors, so a clean
        // return means nothing bounced at submission time.
        Ok(SendReceipt::default())
    }
}

// ── HTTP client ─────────────────────────────────────────────────────

/// Timeout for unsubscribe endpoints; some are slow redirect chains.
const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// RFC 8058 one-click confirmation body.
const ONE_CLICK_BODY: &str = "List-Unsubscribe=One-Click";

/// Minimal view of an HTTP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpResult {
    pub status_ok: bool,
    pub code: u16,
}

/// HTTP request capability, used only for unsubscribe endpoints.
pub trait HttpFetcher {
    fn get(&self, url: &str) -> Result<HttpResult, HttpError>;
    fn post(&self, url: &str) -> Result<HttpResult, HttpError>;
}

/// Blocking reqwest client.
pub struct ReqwestFetcher {
    client: reqwest::blocking::Client,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, HttpError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("inbox-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HttpError::Build {
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

impl HttpFetcher for ReqwestFetcher {
    fn get(&self, url: &str) -> Result<HttpResult, HttpError> {
        let response = self.client.get(url).send().map_err(|e| HttpError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(HttpResult {
            status_ok: response.status().is_success(),
            code: response.status().as_u16(),
        })
    }

    fn post(&self, url: &str) -> Result<HttpResult, HttpError> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(ONE_CLICK_BODY)
            .send()
            .map_err(|e| HttpError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(HttpResult {
            status_ok: response.status().is_success(),
            code: response.status().as_u16(),
        })
    }
}
