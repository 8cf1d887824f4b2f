//! List-Unsubscribe resolution and channel execution.
//!
//! The resolver is a pure transform over the raw header value. The
//! executors wrap collaborator calls and never raise: every failure is
//! captured as an `AttemptOutcome` value for the orchestrator to record.

use tracing::debug;

use crate::error::HttpError;
use crate::pipeline::types::UnsubscribeChannels;
use crate::transport::{HttpFetcher, HttpResult, MailTransport, OutgoingMail};

const UNSUBSCRIBE_SUBJECT: &str = "Unsubscribe";
const UNSUBSCRIBE_BODY: &str = "Please remove this address from your mailing list.\n\n\
                                This request was sent automatically in response to a \
                                List-Unsubscribe header.";

/// Result of one unsubscribe attempt on one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptOutcome {
    pub success: bool,
    pub detail: Option<String>,
}

impl AttemptOutcome {
    fn success(detail: impl Into<String>) -> Self {
        Self {
            success: true,
            detail: Some(detail.into()),
        }
    }

    fn failed(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: Some(detail.into()),
        }
    }
}

// ── Resolver ────────────────────────────────────────────────────────

/// Resolve a raw List-Unsubscribe value into ordered candidate channels.
///
/// The header may contain several angle-bracket-delimited URIs separated
/// by commas, mixing `http(s):` and `mailto:` schemes (RFC 2369). Header
/// order is preserved within each scheme. Returns `None` when the value
/// is absent or contains no URIs at all; `Some` with empty lists when
/// URIs exist but none uses a usable scheme. Performs no network access.
pub fn resolve_list_unsubscribe(header: Option<&str>) -> Option<UnsubscribeChannels> {
    let header = header?;

    let mut channels = UnsubscribeChannels::default();
    let mut saw_uri = false;

    let mut rest = header;
    while let Some(start) = rest.find('<') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('>') else {
            break;
        };
        let uri = after[..end].trim();
        rest = &after[end + 1..];
        if uri.is_empty() {
            continue;
        }
        saw_uri = true;

        let lower = uri.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            channels.http.push(uri.to_string());
        } else if let Some(tail) = lower.strip_prefix("mailto:") {
            // Subject/body hints in the query string are dropped; the
            // channel list carries bare addresses only.
            let address_len = tail.find('?').unwrap_or(tail.len());
            let address = uri["mailto:".len().."mailto:".len() + address_len].trim();
            if address.contains('@') {
                channels.mailto.push(address.to_string());
            }
        }
    }

    if !saw_uri {
        return None;
    }
    Some(channels)
}

// ── Executors ───────────────────────────────────────────────────────

/// Attempt an HTTP unsubscribe: one-click POST first (RFC 8058), plain
/// GET as a fallback. Both requests count as the single HTTP-channel
/// attempt; the combined detail names what each returned.
pub fn execute_http_unsubscribe(http: &dyn HttpFetcher, url: &str) -> AttemptOutcome {
    debug!(url, "Attempting HTTP unsubscribe");

    let post = http.post(url);
    if let Ok(response) = &post
        && response.status_ok
    {
        return AttemptOutcome::success(format!(
            "POST acknowledged with status {}",
            response.code
        ));
    }

    let get = http.get(url);
    let detail = format!("{}; {}", describe("POST", &post), describe("GET", &get));
    match get {
        Ok(response) if response.status_ok => AttemptOutcome::success(detail),
        _ => AttemptOutcome::failed(detail),
    }
}

/// Attempt a mailto unsubscribe by dispatching a fixed request message
/// through the mail transport. Transport errors and rejected recipients
/// both become failed outcomes, never panics or propagated errors.
pub fn execute_mailto_unsubscribe(
    transport: &dyn MailTransport,
    from: &str,
    address: &str,
) -> AttemptOutcome {
    debug!(address, "Attempting mailto unsubscribe");

    let mail = OutgoingMail {
        from: from.to_string(),
        to: address.to_string(),
        subject: UNSUBSCRIBE_SUBJECT.to_string(),
        body: UNSUBSCRIBE_BODY.to_string(),
        in_reply_to: None,
        references: Vec::new(),
    };

    match transport.send(&mail) {
        Ok(receipt) if receipt.rejected.is_empty() => AttemptOutcome {
            success: true,
            detail: None,
        },
        Ok(receipt) => {
            AttemptOutcome::failed(format!("recipient rejected: {}", receipt.rejected.join(", ")))
        }
        Err(e) => AttemptOutcome::failed(e.to_string()),
    }
}

fn describe(step: &str, result: &Result<HttpResult, HttpError>) -> String {
    match result {
        Ok(response) => format!("{step} returned status {}", response.code),
        Err(e) => format!("{step} failed: {e}"),
    }
}
