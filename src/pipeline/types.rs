//! Shared types for the triage pipeline.
//!
//! Report types serialize in camelCase to stay wire-compatible with the
//! JSON API consumed by the dashboard.

use chrono::{DateTime, Utc};
use serde::Serialize;

// ── Parsed message ──────────────────────────────────────────────────

/// Structured representation of one raw email, derived once per message.
///
/// Construction is atomic: parsing either yields a fully populated value
/// or fails with `ParseError`. Missing optional headers are substituted
/// with the documented defaults, never left half-filled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEmail {
    /// Message-ID header, or a synthetic `generated-<uuid>` fallback.
    pub message_id: String,
    /// Subject line, `"(no subject)"` when the header is missing.
    pub subject: String,
    /// Best-effort sender address, `"unknown"` when absent.
    pub from_address: String,
    /// Display name from the From header, when one was given.
    pub from_name: Option<String>,
    /// Raw List-Unsubscribe header value (RFC 2369/8058), untouched.
    pub list_unsubscribe: Option<String>,
    /// Plain-text rendering of the body. Empty when no readable part exists.
    pub body_text: String,
}

// ── Classification ──────────────────────────────────────────────────

/// Heuristic verdict over one `ParsedEmail`.
///
/// `is_marketing` and `importance_score` are computed independently;
/// a message may be neither marketing nor above the reply threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub is_marketing: bool,
    /// 0-100 rating of how much the message warrants a human-style reply.
    pub importance_score: u8,
    /// Names the dominant signal(s) that drove the decision.
    pub reason: String,
    /// Extractive summary bullets. Empty unless the caller asked for them.
    pub summary: Vec<String>,
}

// ── Unsubscribe channels ────────────────────────────────────────────

/// Machine-actionable unsubscribe endpoints resolved from a
/// List-Unsubscribe header, in header order per scheme.
///
/// The resolver returns `None` (not an empty value) when the header is
/// absent or contains no URIs at all; the two cases drive different
/// skip reasons downstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnsubscribeChannels {
    pub http: Vec<String>,
    pub mailto: Vec<String>,
}

impl UnsubscribeChannels {
    /// True when no actionable endpoint of either scheme was resolved.
    pub fn is_empty(&self) -> bool {
        self.http.is_empty() && self.mailto.is_empty()
    }
}

/// Which delivery mechanism an unsubscribe attempt used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnsubscribeChannelKind {
    Http,
    Email,
}

/// Outcome of a single unsubscribe attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Requested,
    Failed,
}

// ── Report records ──────────────────────────────────────────────────

/// One recorded unsubscribe attempt. At most one per channel type per
/// message; both appear when the HTTP attempt failed and mailto ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeRecord {
    pub message_id: String,
    pub subject: String,
    pub channel: UnsubscribeChannelKind,
    pub endpoint: String,
    pub status: AttemptStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Terminal status of a reply dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Sent,
    Failed,
}

/// One recorded reply attempt for an important message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRecord {
    pub message_id: String,
    pub subject: String,
    pub to: String,
    pub status: ReplyStatus,
    /// Classification rationale, for operator audit.
    pub preview: String,
    pub reply_preview: String,
}

/// One message that reached a terminal state without any outbound action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedMessage {
    pub message_id: String,
    pub subject: String,
    pub reason: String,
}

// ── Reply draft ─────────────────────────────────────────────────────

/// A crafted reply. Deterministic given identical inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyDraft {
    pub subject: String,
    pub body: String,
}

// ── Run report ──────────────────────────────────────────────────────

/// Aggregate counts for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub fetched: usize,
    pub important_replies: usize,
    pub marketing_unsubscribes: usize,
    pub skipped: usize,
}

/// The aggregate outcome of one run over a bounded batch.
///
/// Assembled once when the batch completes; never mutated after return.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub synced_at: DateTime<Utc>,
    pub summary: RunSummary,
    pub important_replies: Vec<ReplyRecord>,
    pub marketing_unsubscribes: Vec<UnsubscribeRecord>,
    pub skipped: Vec<SkippedMessage>,
    /// Non-fatal per-message failures, for operator diagnostics.
    pub errors: Vec<String>,
}

impl RunReport {
    /// Assemble the final report from the orchestrator's accumulators.
    pub fn assemble(
        fetched: usize,
        important_replies: Vec<ReplyRecord>,
        marketing_unsubscribes: Vec<UnsubscribeRecord>,
        skipped: Vec<SkippedMessage>,
        errors: Vec<String>,
    ) -> Self {
        Self {
            synced_at: Utc::now(),
            summary: RunSummary {
                fetched,
                important_replies: important_replies.len(),
                marketing_unsubscribes: marketing_unsubscribes.len(),
                skipped: skipped.len(),
            },
            important_replies,
            marketing_unsubscribes,
            skipped,
            errors,
        }
    }
}
