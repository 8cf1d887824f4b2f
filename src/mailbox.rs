//! Mailbox access — a minimal IMAP client over rustls.
//!
//! The orchestrator consumes this through the `MailboxSource` trait;
//! `ImapMailbox` is the production implementation. One session per run:
//! connect, select, search unseen, fetch, mark seen, logout. All calls
//! are blocking and strictly sequential.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use tracing::debug;

use crate::config::ImapConfig;
use crate::error::MailboxError;

const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// One fetched message as the mailbox hands it over: raw source plus the
/// envelope fields the orchestrator gates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMessage {
    pub raw: Vec<u8>,
    pub envelope_from: Option<String>,
    pub envelope_message_id: Option<String>,
}

/// Mailbox session capability. Implementations must tolerate a mailbox
/// with zero unseen messages.
pub trait MailboxSource {
    fn open_mailbox(&mut self, name: &str) -> Result<(), MailboxError>;
    fn search_unseen(&mut self) -> Result<Vec<u32>, MailboxError>;
    fn fetch(&mut self, id: u32) -> Result<Option<FetchedMessage>, MailboxError>;
    fn mark_seen(&mut self, id: u32) -> Result<(), MailboxError>;
    fn disconnect(&mut self) -> Result<(), MailboxError>;
}

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// IMAP-over-TLS session.
pub struct ImapMailbox {
    stream: TlsStream,
    tag_counter: u32,
}

impl ImapMailbox {
    /// Connect and authenticate. Any failure here is fatal to the run.
    pub fn connect(config: &ImapConfig) -> Result<Self, MailboxError> {
        let tcp = TcpStream::connect((config.host.as_str(), config.port)).map_err(|e| {
            MailboxError::Connect {
                host: config.host.clone(),
                reason: e.to_string(),
            }
        })?;
        tcp.set_read_timeout(Some(READ_TIMEOUT))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = rustls::pki_types::ServerName::try_from(config.host.clone())
            .map_err(|e| MailboxError::Tls {
                reason: e.to_string(),
            })?;
        let conn = rustls::ClientConnection::new(tls_config, server_name).map_err(|e| {
            MailboxError::Tls {
                reason: e.to_string(),
            }
        })?;

        let mut session = Self {
            stream: rustls::StreamOwned::new(conn, tcp),
            tag_counter: 0,
        };

        let greeting = session.read_line()?;
        debug!(greeting = %greeting.trim_end(), "IMAP session opened");

        let login = session.send_command(&format!(
            "LOGIN {} {}",
            quote(&config.user),
            quote(config.password.expose_secret())
        ))?;
        if !response_ok(&login) {
            return Err(MailboxError::Auth {
                user: config.user.clone(),
            });
        }

        Ok(session)
    }

    fn next_tag(&mut self) -> String {
        self.tag_counter += 1;
        format!("A{}", self.tag_counter)
    }

    /// Read one CRLF-terminated line from the server.
    fn read_line(&mut self) -> Result<String, MailboxError> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match self.stream.read(&mut byte) {
                Ok(0) => {
                    return Err(MailboxError::Protocol {
                        reason: "connection closed by server".into(),
                    });
                }
                Ok(_) => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).to_string());
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Send a tagged command and collect response lines through the
    /// tagged completion line.
    fn send_command(&mut self, command: &str) -> Result<Vec<String>, MailboxError> {
        let tag = self.next_tag();
        let full = format!("{tag} {command}\r\n");
        self.stream.write_all(full.as_bytes())?;
        self.stream.flush()?;

        let mut lines = Vec::new();
        loop {
            let line = self.read_line()?;
            let done = line.starts_with(&tag);
            lines.push(line);
            if done {
                return Ok(lines);
            }
        }
    }
}

impl MailboxSource for ImapMailbox {
    fn open_mailbox(&mut self, name: &str) -> Result<(), MailboxError> {
        let lines = self.send_command(&format!("SELECT {}", quote(name)))?;
        if !response_ok(&lines) {
            return Err(MailboxError::Protocol {
                reason: format!("SELECT {name} refused"),
            });
        }
        Ok(())
    }

    fn search_unseen(&mut self) -> Result<Vec<u32>, MailboxError> {
        let lines = self.send_command("SEARCH UNSEEN")?;
        if !response_ok(&lines) {
            return Err(MailboxError::Protocol {
                reason: "SEARCH UNSEEN refused".into(),
            });
        }
        Ok(parse_search_response(&lines))
    }

    fn fetch(&mut self, id: u32) -> Result<Option<FetchedMessage>, MailboxError> {
        let lines = self.send_command(&format!("FETCH {id} RFC822"))?;
        if !response_ok(&lines) {
            return Err(MailboxError::Protocol {
                reason: format!("FETCH {id} refused"),
            });
        }

        // First line is the untagged FETCH response, the last two are the
        // closing paren and the tagged completion.
        let raw: String = lines
            .iter()
            .skip(1)
            .take(lines.len().saturating_sub(2))
            .cloned()
            .collect();
        if raw.trim().is_empty() {
            return Ok(None);
        }

        let envelope_from = header_line(&raw, "From").and_then(|v| angle_address(&v));
        let envelope_message_id = header_line(&raw, "Message-ID").map(|v| v.trim().to_string());

        Ok(Some(FetchedMessage {
            raw: raw.into_bytes(),
            envelope_from,
            envelope_message_id,
        }))
    }

    fn mark_seen(&mut self, id: u32) -> Result<(), MailboxError> {
        let lines = self.send_command(&format!("STORE {id} +FLAGS (\\Seen)"))?;
        if !response_ok(&lines) {
            return Err(MailboxError::Protocol {
                reason: format!("STORE {id} refused"),
            });
        }
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), MailboxError> {
        self.send_command("LOGOUT")?;
        Ok(())
    }
}

// ── Response helpers (pure, tested without a server) ───────────────

/// Quote an IMAP string literal argument.
fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn response_ok(lines: &[String]) -> bool {
    lines.last().is_some_and(|line| line.contains(" OK"))
}

/// Pull message ids out of `* SEARCH n n n` lines.
fn parse_search_response(lines: &[String]) -> Vec<u32> {
    let mut ids = Vec::new();
    for line in lines {
        if let Some(rest) = line.strip_prefix("* SEARCH") {
            ids.extend(rest.split_whitespace().filter_map(|n| n.parse::<u32>().ok()));
        }
    }
    ids
}

/// Find a header value in raw message text, unfolding continuation lines.
/// Scans only until the end of the header block.
fn header_line(raw: &str, name: &str) -> Option<String> {
    let prefix = format!("{}:", name.to_ascii_lowercase());
    let mut value: Option<String> = None;

    for line in raw.lines() {
        if line.trim().is_empty() {
            break;
        }
        if let Some(current) = &mut value {
            if line.starts_with(' ') || line.starts_with('\t') {
                current.push(' ');
                current.push_str(line.trim());
                continue;
            }
            break;
        }
        if line.to_ascii_lowercase().starts_with(&prefix) {
            value = Some(line[prefix.len()..].trim().to_string());
        }
    }

    value.filter(|v| !v.is_empty())
}

/// Extract the address from a From-style header value.
fn angle_address(value: &str) -> Option<String> {
    if let Some(start) = value.find('<')
        && let Some(end) = value[start + 1..].find('>')
    {
        let addr = value[start + 1..start + 1 + end].trim();
        if !addr.is_empty() {
            return Some(addr.to_string());
        }
        return None;
    }
    let trimmed = value.trim();
    if trimmed.contains('@') {
        return Some(trimmed.to_string());
    }
    None
}
