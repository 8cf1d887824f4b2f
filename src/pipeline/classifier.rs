//! Heuristic email classifier.
//!
//! Two independent verdicts over a `ParsedEmail`: a marketing flag from
//! bulk-mail markers, and a 0-100 importance score from reply-worthiness
//! signals. Total and deterministic: a parse failure never reaches this
//! stage, and classification itself cannot fail.

use regex::Regex;

use crate::pipeline::types::{Classification, ParsedEmail};

/// Weighted marketing points needed to set the marketing flag.
const MARKETING_THRESHOLD: u8 = 2;

/// Starting importance for any message with readable content.
const IMPORTANCE_BASE: i32 = 25;

/// Conservative baseline when the body carries no usable content.
const EMPTY_BODY_BASELINE: u8 = 10;

const MAX_SUMMARY_BULLETS: usize = 3;
const MAX_BULLET_CHARS: usize = 140;

/// Fixed-heuristic classifier. Patterns are compiled once at construction.
pub struct Classifier {
    bulk_sender: Regex,
    promo_keywords: Regex,
    footer_phrases: Regex,
    urgency: Regex,
    greeting: Regex,
}

impl Classifier {
    pub fn new() -> Self {
        Self {
            bulk_sender: Regex::new(
                r"(?i)^(no[-_.]?reply|newsletter|marketing|promo|deals|offers|updates|notifications|mailer[-_]?daemon|postmaster)@",
            )
            .unwrap(),
            promo_keywords: Regex::new(
                r"(?i)(% off|discount|limited time|special offer|free shipping|promo code|coupon|flash sale|clearance|buy now|shop now|exclusive offer|sale ends|deal of the day|newsletter|weekly digest)",
            )
            .unwrap(),
            footer_phrases: Regex::new(
                r"(?i)(click here to unsubscribe|manage your (subscription|preferences)|email preferences|opt[- ]?out|you are receiving this|view (this email )?in (your )?browser)",
            )
            .unwrap(),
            urgency: Regex::new(
                r"(?i)\b(urgent|asap|action required|deadline|time[- ]sensitive|critical|reminder|please (respond|reply|review|confirm|advise))\b",
            )
            .unwrap(),
            greeting: Regex::new(r"(?i)^(hi|hello|hey|dear|good (morning|afternoon|evening))\b")
                .unwrap(),
        }
    }

    /// Classify one message. The marketing flag and importance score are
    /// computed independently; `reason` names the dominant signals.
    ///
    /// Summary bullets are a separate sub-step, see [`Self::summarize`].
    pub fn classify(&self, email: &ParsedEmail) -> Classification {
        let marketing_signals = self.marketing_signals(email);
        let marketing_points: u8 = marketing_signals.iter().map(|(points, _)| points).sum();
        let is_marketing = marketing_points >= MARKETING_THRESHOLD;

        let (importance_score, importance_signals) = self.importance(email);

        let reason = if is_marketing {
            let labels: Vec<&str> = marketing_signals.iter().map(|(_, label)| *label).collect();
            format!("Flagged as marketing: {}", labels.join(", "))
        } else {
            format!(
                "Importance {}: {}",
                importance_score,
                importance_signals.join(", ")
            )
        };

        Classification {
            is_marketing,
            importance_score,
            reason,
            summary: Vec::new(),
        }
    }

    /// Bulk-mail markers, weighted. Header shape and sender patterns count
    /// more than keyword hits.
    fn marketing_signals(&self, email: &ParsedEmail) -> Vec<(u8, &'static str)> {
        let mut signals = Vec::new();
        if email.list_unsubscribe.is_some() {
            signals.push((2, "List-Unsubscribe header"));
        }
        if self.bulk_sender.is_match(&email.from_address) {
            signals.push((2, "bulk sender address"));
        }
        if self.promo_keywords.is_match(&email.subject) {
            signals.push((1, "promotional subject keywords"));
        }
        if self.promo_keywords.is_match(&email.body_text) {
            signals.push((1, "promotional body keywords"));
        }
        if self.footer_phrases.is_match(&email.body_text) {
            signals.push((1, "unsubscribe footer phrasing"));
        }
        signals
    }

    /// Accumulate the 0-100 importance score with its contributing signals.
    fn importance(&self, email: &ParsedEmail) -> (u8, Vec<&'static str>) {
        if email.body_text.trim().is_empty() {
            return (EMPTY_BODY_BASELINE, vec!["insufficient message content"]);
        }

        let mut score = IMPORTANCE_BASE;
        let mut signals = Vec::new();

        if self.urgency.is_match(&email.subject) || self.urgency.is_match(&email.body_text) {
            score += 25;
            signals.push("urgency wording");
        }
        if email.subject.contains('?') || email.body_text.contains('?') {
            score += 15;
            signals.push("direct question");
        }
        if email
            .body_text
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .is_some_and(|line| self.greeting.is_match(line))
        {
            score += 10;
            signals.push("personal greeting");
        }
        if is_reply_subject(&email.subject) {
            score += 15;
            signals.push("reply in an existing thread");
        }
        if self.bulk_sender.is_match(&email.from_address) {
            score -= 20;
            signals.push("automated sender address");
        } else {
            score += 10;
            signals.push("human sender address");
        }

        (score.clamp(0, 100) as u8, signals)
    }

    /// Extractive summary: the first few substantive body lines, with
    /// quotes, links and boilerplate filtered out. Invoked only when the
    /// caller asked for summaries.
    pub fn summarize(&self, email: &ParsedEmail) -> Vec<String> {
        let mut bullets = Vec::new();
        for line in email.body_text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('>') {
                continue;
            }
            if line.chars().count() < 20 {
                continue;
            }
            let lower = line.to_ascii_lowercase();
            if lower.starts_with("http://") || lower.starts_with("https://") {
                continue;
            }
            if self.footer_phrases.is_match(line) {
                continue;
            }
            bullets.push(truncate_bullet(line));
            if bullets.len() == MAX_SUMMARY_BULLETS {
                break;
            }
        }
        bullets
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

/// True when a subject already carries a reply marker.
fn is_reply_subject(subject: &str) -> bool {
    let lower = subject.trim_start().to_ascii_lowercase();
    lower.starts_with("re:") || lower.starts_with("fwd:") || lower.starts_with("fw:")
}

fn truncate_bullet(line: &str) -> String {
    if line.chars().count() <= MAX_BULLET_CHARS {
        return line.to_string();
    }
    let truncated: String = line.chars().take(MAX_BULLET_CHARS).collect();
    format!("{}...", truncated.trim_end())
}
