//! Run orchestrator — sequences the pipeline over one bounded batch.
//!
//! Strictly sequential: message N+1 is not started until message N
//! reaches a terminal state, so outbound side effects are rate-bounded
//! and mark-seen stays causally ordered with processing. Per-message
//! failures are absorbed into the report; only session-level failures
//! propagate.

use tracing::{debug, error, info, warn};

use crate::config::{AgentProfile, AgentSettings};
use crate::error::Error;
use crate::mailbox::{FetchedMessage, MailboxSource};
use crate::pipeline::classifier::Classifier;
use crate::pipeline::parser::{DEFAULT_SUBJECT, UNKNOWN_SENDER, parse_raw_email};
use crate::pipeline::reply::craft_formal_reply;
use crate::pipeline::types::{
    AttemptStatus, Classification, ParsedEmail, ReplyRecord, ReplyStatus, RunReport,
    SkippedMessage, UnsubscribeChannelKind, UnsubscribeRecord,
};
use crate::pipeline::unsubscribe::{
    execute_http_unsubscribe, execute_mailto_unsubscribe, resolve_list_unsubscribe,
};
use crate::transport::{HttpFetcher, MailTransport, OutgoingMail};

/// Cap on messages per run: the most recent unseen messages only. This
/// bounds run duration and outbound side-effect volume per invocation.
pub const MAX_BATCH: usize = 25;

const SKIP_MISSING_SOURCE: &str = "Missing source or sender information";
const SKIP_UNPARSEABLE: &str = "Unparseable message source";
const SKIP_UNSUB_DISABLED: &str = "Marketing detected but automation disabled";
const SKIP_NO_INSTRUCTIONS: &str = "Marketing detected but no unsubscribe instructions found";
const SKIP_NO_USABLE_CHANNELS: &str = "Unsubscribe instructions contained no usable channels";
const SKIP_BELOW_THRESHOLD: &str = "Below importance threshold";
const SKIP_REPLY_DISABLED: &str = "Important but auto-reply disabled";

const REPLY_FAILED_PREVIEW: &str = "Reply dispatch failed. Check logs for details.";

/// One triage run over a mailbox. Holds the validated, immutable
/// configuration; all I/O goes through the collaborator traits.
pub struct TriageRun<'a> {
    profile: &'a AgentProfile,
    settings: &'a AgentSettings,
    /// Bare submission address, used as the unsubscribe sender.
    from_address: String,
    /// Display form used on replies: `Name <address>`.
    reply_from: String,
    classifier: Classifier,
}

impl<'a> TriageRun<'a> {
    pub fn new(profile: &'a AgentProfile, settings: &'a AgentSettings, smtp_user: &str) -> Self {
        Self {
            profile,
            settings,
            from_address: smtp_user.to_string(),
            reply_from: format!("{} <{}>", profile.display_name, smtp_user),
            classifier: Classifier::new(),
        }
    }

    /// Process the bounded batch of unseen messages and assemble the
    /// aggregate report. Fails only on mailbox session errors.
    pub fn execute(
        &self,
        mailbox: &mut dyn MailboxSource,
        transport: &dyn MailTransport,
        http: &dyn HttpFetcher,
        mailbox_name: &str,
    ) -> Result<RunReport, Error> {
        mailbox.open_mailbox(mailbox_name)?;
        let ids = mailbox.search_unseen()?;

        let dropped = ids.len().saturating_sub(MAX_BATCH);
        let workload = &ids[dropped..];
        if dropped > 0 {
            debug!(dropped, "Batch cap applied; keeping the most recent messages");
        }
        info!(unseen = ids.len(), batch = workload.len(), "Triage run started");

        let mut acc = Accumulator::default();
        for &id in workload {
            acc.fetched += 1;
            if let Err(e) = self.process_message(id, mailbox, transport, http, &mut acc) {
                error!(id, error = %e, "Message processing failed");
                acc.errors.push(format!("Failed to process message {id}: {e}"));
            }
        }

        info!(
            replies = acc.replies.len(),
            unsubscribes = acc.unsubscribes.len(),
            skipped = acc.skipped.len(),
            errors = acc.errors.len(),
            "Triage run complete"
        );
        Ok(acc.finish())
    }

    /// Drive one message to a terminal state.
    ///
    /// Every terminal state other than a parse failure or missing source
    /// data marks the message seen: handled-but-failed messages must not
    /// be reprocessed on the next run.
    fn process_message(
        &self,
        id: u32,
        mailbox: &mut dyn MailboxSource,
        transport: &dyn MailTransport,
        http: &dyn HttpFetcher,
        acc: &mut Accumulator,
    ) -> Result<(), Error> {
        let Some(fetched) = mailbox.fetch(id)? else {
            acc.skip(id.to_string(), DEFAULT_SUBJECT, SKIP_MISSING_SOURCE);
            return Ok(());
        };

        let email = match parse_raw_email(&fetched.raw) {
            Ok(email) => email,
            Err(e) => {
                warn!(id, error = %e, "Skipping unparseable message");
                let message_id = fetched
                    .envelope_message_id
                    .clone()
                    .unwrap_or_else(|| id.to_string());
                acc.skip(message_id, DEFAULT_SUBJECT, SKIP_UNPARSEABLE);
                return Ok(());
            }
        };

        let sender = fetched
            .envelope_from
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| email.from_address.clone());
        if sender.is_empty() || sender == UNKNOWN_SENDER {
            acc.skip(email.message_id, email.subject, SKIP_MISSING_SOURCE);
            return Ok(());
        }

        let classification = self.classifier.classify(&email);
        debug!(
            id,
            subject = %email.subject,
            is_marketing = classification.is_marketing,
            score = classification.importance_score,
            reason = %classification.reason,
            "Message classified"
        );

        if classification.is_marketing {
            self.handle_marketing(&email, transport, http, acc);
            mailbox.mark_seen(id)?;
            return Ok(());
        }

        // Fixed gate order: the threshold check always runs first, so a
        // low-scoring message surfaces the threshold reason even when
        // auto-reply is also disabled.
        if classification.importance_score < self.settings.importance_threshold {
            acc.skip(email.message_id.clone(), email.subject.clone(), SKIP_BELOW_THRESHOLD);
            mailbox.mark_seen(id)?;
            return Ok(());
        }
        if !self.settings.auto_reply_important {
            acc.skip(email.message_id.clone(), email.subject.clone(), SKIP_REPLY_DISABLED);
            mailbox.mark_seen(id)?;
            return Ok(());
        }

        self.handle_reply(&email, &fetched, &sender, &classification, transport, acc);
        mailbox.mark_seen(id)?;
        Ok(())
    }

    /// Marketing branch: gate, resolve channels, attempt HTTP first and
    /// mailto only when HTTP was absent or did not succeed. At most one
    /// attempt per channel type is recorded.
    fn handle_marketing(
        &self,
        email: &ParsedEmail,
        transport: &dyn MailTransport,
        http: &dyn HttpFetcher,
        acc: &mut Accumulator,
    ) {
        if !self.settings.auto_unsubscribe_marketing {
            acc.skip(email.message_id.clone(), email.subject.clone(), SKIP_UNSUB_DISABLED);
            return;
        }

        let Some(channels) = resolve_list_unsubscribe(email.list_unsubscribe.as_deref()) else {
            acc.skip(email.message_id.clone(), email.subject.clone(), SKIP_NO_INSTRUCTIONS);
            return;
        };
        if channels.is_empty() {
            acc.skip(email.message_id.clone(), email.subject.clone(), SKIP_NO_USABLE_CHANNELS);
            return;
        }

        let mut unsubscribed = false;

        if let Some(url) = channels.http.first() {
            let outcome = execute_http_unsubscribe(http, url);
            if outcome.success {
                unsubscribed = true;
            } else {
                acc.errors.push(format!(
                    "HTTP unsubscribe failed for {}: {}",
                    email.subject,
                    outcome.detail.as_deref().unwrap_or("unknown error")
                ));
            }
            acc.unsubscribes.push(UnsubscribeRecord {
                message_id: email.message_id.clone(),
                subject: email.subject.clone(),
                channel: UnsubscribeChannelKind::Http,
                endpoint: url.clone(),
                status: attempt_status(outcome.success),
                detail: outcome.detail,
            });
        }

        if !unsubscribed
            && let Some(address) = channels.mailto.first()
        {
            let outcome = execute_mailto_unsubscribe(transport, &self.from_address, address);
            if !outcome.success {
                acc.errors.push(format!(
                    "Mailto unsubscribe failed for {}: {}",
                    email.subject,
                    outcome.detail.as_deref().unwrap_or("unknown error")
                ));
            }
            acc.unsubscribes.push(UnsubscribeRecord {
                message_id: email.message_id.clone(),
                subject: email.subject.clone(),
                channel: UnsubscribeChannelKind::Email,
                endpoint: address.clone(),
                status: attempt_status(outcome.success),
                detail: outcome.detail,
            });
        }
    }

    /// Important branch: craft the acknowledgment and dispatch it.
    /// Dispatch failure is a recorded outcome, never a batch failure.
    fn handle_reply(
        &self,
        email: &ParsedEmail,
        fetched: &FetchedMessage,
        sender: &str,
        classification: &Classification,
        transport: &dyn MailTransport,
        acc: &mut Accumulator,
    ) {
        let summary = if self.settings.include_summaries {
            self.classifier.summarize(email)
        } else {
            Vec::new()
        };
        let draft = craft_formal_reply(email, self.profile, &summary);

        let thread_id = fetched
            .envelope_message_id
            .clone()
            .unwrap_or_else(|| email.message_id.clone());
        let outgoing = OutgoingMail {
            from: self.reply_from.clone(),
            to: sender.to_string(),
            subject: draft.subject.clone(),
            body: draft.body.clone(),
            in_reply_to: Some(bracketed(&thread_id)),
            references: fetched
                .envelope_message_id
                .as_deref()
                .map(|id| vec![bracketed(id)])
                .unwrap_or_default(),
        };

        let record = |status, reply_preview: String| ReplyRecord {
            message_id: email.message_id.clone(),
            subject: email.subject.clone(),
            to: sender.to_string(),
            status,
            preview: classification.reason.clone(),
            reply_preview,
        };

        match transport.send(&outgoing) {
            Ok(receipt) if receipt.rejected.is_empty() => {
                info!(to = %sender, subject = %draft.subject, "Reply sent");
                acc.replies.push(record(ReplyStatus::Sent, draft.body));
            }
            Ok(receipt) => {
                acc.errors.push(format!(
                    "Reply for {} rejected for: {}",
                    email.subject,
                    receipt.rejected.join(", ")
                ));
                acc.replies.push(record(ReplyStatus::Failed, draft.body));
            }
            Err(e) => {
                acc.errors
                    .push(format!("Failed to send reply for {}: {e}", email.subject));
                acc.replies
                    .push(record(ReplyStatus::Failed, REPLY_FAILED_PREVIEW.to_string()));
            }
        }
    }
}

fn attempt_status(success: bool) -> AttemptStatus {
    if success {
        AttemptStatus::Requested
    } else {
        AttemptStatus::Failed
    }
}

/// Ensure a message id is wrapped for use in threading headers.
fn bracketed(id: &str) -> String {
    if id.starts_with('<') {
        id.to_string()
    } else {
        format!("<{id}>")
    }
}

/// Report accumulators, appended to by the single processing thread.
#[derive(Default)]
struct Accumulator {
    fetched: usize,
    replies: Vec<ReplyRecord>,
    unsubscribes: Vec<UnsubscribeRecord>,
    skipped: Vec<SkippedMessage>,
    errors: Vec<String>,
}

impl Accumulator {
    fn skip(&mut self, message_id: String, subject: impl Into<String>, reason: &str) {
        self.skipped.push(SkippedMessage {
            message_id,
            subject: subject.into(),
            reason: reason.to_string(),
        });
    }

    fn finish(self) -> RunReport {
        RunReport::assemble(
            self.fetched,
            self.replies,
            self.unsubscribes,
            self.skipped,
            self.errors,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use super::*;
    use crate::config::ReplyTone;
    use crate::error::{HttpError, MailboxError, TransportError};
    use crate::transport::{HttpResult, SendReceipt};

    // ── Mocks ───────────────────────────────────────────────────────

    #[derive(Default)]
    struct MockMailbox {
        ids: Vec<u32>,
        messages: HashMap<u32, FetchedMessage>,
        seen: Vec<u32>,
        opened: Option<String>,
        fail_fetch: Option<u32>,
    }

    impl MailboxSource for MockMailbox {
        fn open_mailbox(&mut self, name: &str) -> Result<(), MailboxError> {
            self.opened = Some(name.to_string());
            Ok(())
        }

        fn search_unseen(&mut self) -> Result<Vec<u32>, MailboxError> {
            Ok(self.ids.clone())
        }

        fn fetch(&mut self, id: u32) -> Result<Option<FetchedMessage>, MailboxError> {
            if self.fail_fetch == Some(id) {
                return Err(MailboxError::Protocol {
                    reason: "simulated fetch failure".into(),
                });
            }
            Ok(self.messages.get(&id).cloned())
        }

        fn mark_seen(&mut self, id: u32) -> Result<(), MailboxError> {
            self.seen.push(id);
            Ok(())
        }

        fn disconnect(&mut self) -> Result<(), MailboxError> {
            Ok(())
        }
    }

    struct MockTransport {
        result: Result<SendReceipt, String>,
        sent: RefCell<Vec<OutgoingMail>>,
    }

    impl MockTransport {
        fn ok() -> Self {
            Self {
                result: Ok(SendReceipt::default()),
                sent: RefCell::new(Vec::new()),
            }
        }

        fn failing(reason: &str) -> Self {
            Self {
                result: Err(reason.to_string()),
                sent: RefCell::new(Vec::new()),
            }
        }

        fn rejecting(recipient: &str) -> Self {
            Self {
                result: Ok(SendReceipt {
                    rejected: vec![recipient.to_string()],
                }),
                sent: RefCell::new(Vec::new()),
            }
        }
    }

    impl MailTransport for MockTransport {
        fn send(&self, mail: &OutgoingMail) -> Result<SendReceipt, TransportError> {
            self.sent.borrow_mut().push(mail.clone());
            self.result
                .clone()
                .map_err(|reason| TransportError::Send { reason })
        }
    }

    struct MockHttp {
        post_ok: bool,
        get_ok: bool,
        posts: RefCell<Vec<String>>,
        gets: RefCell<Vec<String>>,
    }

    impl MockHttp {
        fn new(post_ok: bool, get_ok: bool) -> Self {
            Self {
                post_ok,
                get_ok,
                posts: RefCell::new(Vec::new()),
                gets: RefCell::new(Vec::new()),
            }
        }
    }

    impl HttpFetcher for MockHttp {
        fn get(&self, url: &str) -> Result<HttpResult, HttpError> {
            self.gets.borrow_mut().push(url.to_string());
            Ok(HttpResult {
                status_ok: self.get_ok,
                code: if self.get_ok { 200 } else { 500 },
            })
        }

        fn post(&self, url: &str) -> Result<HttpResult, HttpError> {
            self.posts.borrow_mut().push(url.to_string());
            Ok(HttpResult {
                status_ok: self.post_ok,
                code: if self.post_ok { 200 } else { 500 },
            })
        }
    }

    // ── Fixtures ────────────────────────────────────────────────────

    fn profile() -> AgentProfile {
        AgentProfile {
            display_name: "Alex Morgan".into(),
            job_title: Some("Operations Manager".into()),
            company: Some("Acme Corp".into()),
            signature: None,
            reply_tone: ReplyTone::Formal,
        }
    }

    fn settings() -> AgentSettings {
        AgentSettings {
            auto_reply_important: true,
            auto_unsubscribe_marketing: true,
            include_summaries: true,
            reply_delay_minutes: 0,
            importance_threshold: 65,
        }
    }

    fn raw_email(from: &str, subject: &str, body: &str, list_unsubscribe: Option<&str>) -> Vec<u8> {
        let mut headers = format!(
            "From: {from}\r\nTo: agent@example.com\r\nSubject: {subject}\r\nMessage-ID: <orig-1@example.com>"
        );
        if let Some(value) = list_unsubscribe {
            headers.push_str(&format!("\r\nList-Unsubscribe: {value}"));
        }
        format!("{headers}\r\n\r\n{body}").into_bytes()
    }

    fn fetched(from: &str, subject: &str, body: &str, list_unsubscribe: Option<&str>) -> FetchedMessage {
        FetchedMessage {
            raw: raw_email(from, subject, body, list_unsubscribe),
            envelope_from: Some(from.to_string()),
            envelope_message_id: Some("<orig-1@example.com>".to_string()),
        }
    }

    fn marketing_message() -> FetchedMessage {
        fetched(
            "deals@shop.example",
            "Flash sale - 50% off everything",
            "Big savings today only. Click here to unsubscribe.",
            Some("<https://unsub.example/u1>, <mailto:out@example.com>"),
        )
    }

    fn important_message() -> FetchedMessage {
        fetched(
            "alice@client.example",
            "Question about the Q3 invoice",
            "Hi,\n\nCould you please confirm the invoice total by Friday? It is urgent.\n\nThanks,\nAlice",
            None,
        )
    }

    fn routine_message() -> FetchedMessage {
        fetched(
            "status@build.example",
            "Build log",
            "Nightly build completed without warnings.",
            None,
        )
    }

    fn run_with(
        mailbox: &mut MockMailbox,
        transport: &MockTransport,
        http: &MockHttp,
        settings: &AgentSettings,
    ) -> RunReport {
        let profile = profile();
        let run = TriageRun::new(&profile, settings, "agent@example.com");
        run.execute(mailbox, transport, http, "INBOX").unwrap()
    }

    // ── End-to-end scenarios ────────────────────────────────────────

    #[test]
    fn marketing_http_success_records_requested_outcome() {
        let mut mailbox = MockMailbox {
            ids: vec![1],
            messages: HashMap::from([(1, marketing_message())]),
            ..Default::default()
        };
        let transport = MockTransport::ok();
        let http = MockHttp::new(true, true);

        let report = run_with(&mut mailbox, &transport, &http, &settings());

        assert_eq!(report.summary.fetched, 1);
        assert_eq!(report.marketing_unsubscribes.len(), 1);
        let record = &report.marketing_unsubscribes[0];
        assert_eq!(record.channel, UnsubscribeChannelKind::Http);
        assert_eq!(record.status, AttemptStatus::Requested);
        assert_eq!(record.endpoint, "https://unsub.example/u1");
        assert!(report.errors.is_empty());
        assert!(report.important_replies.is_empty());
        // HTTP succeeded, so mailto was never tried
        assert!(transport.sent.borrow().is_empty());
        assert_eq!(mailbox.seen, vec![1]);
    }

    #[test]
    fn important_message_gets_exactly_one_sent_reply() {
        let mut mailbox = MockMailbox {
            ids: vec![4],
            messages: HashMap::from([(4, important_message())]),
            ..Default::default()
        };
        let transport = MockTransport::ok();
        let http = MockHttp::new(true, true);

        let report = run_with(&mut mailbox, &transport, &http, &settings());

        assert_eq!(report.important_replies.len(), 1);
        let record = &report.important_replies[0];
        assert_eq!(record.status, ReplyStatus::Sent);
        assert_eq!(record.to, "alice@client.example");
        assert!(record.preview.contains("Importance"));
        assert!(report.errors.is_empty());
        assert!(report.skipped.is_empty());

        let sent = transport.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Re: Question about the Q3 invoice");
        assert_eq!(sent[0].from, "Alex Morgan <agent@example.com>");
        assert_eq!(sent[0].in_reply_to.as_deref(), Some("<orig-1@example.com>"));
        assert_eq!(mailbox.seen, vec![4]);
        // No HTTP traffic on the reply path
        assert!(http.posts.borrow().is_empty());
    }

    #[test]
    fn below_threshold_message_is_skipped() {
        let mut mailbox = MockMailbox {
            ids: vec![2],
            messages: HashMap::from([(2, routine_message())]),
            ..Default::default()
        };
        let transport = MockTransport::ok();
        let http = MockHttp::new(true, true);

        let report = run_with(&mut mailbox, &transport, &http, &settings());

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].reason, SKIP_BELOW_THRESHOLD);
        assert!(report.important_replies.is_empty());
        assert!(report.errors.is_empty());
        assert!(transport.sent.borrow().is_empty());
        // Classified-but-skipped messages are still handled
        assert_eq!(mailbox.seen, vec![2]);
    }

    #[test]
    fn empty_batch_returns_empty_report() {
        let mut mailbox = MockMailbox::default();
        let transport = MockTransport::ok();
        let http = MockHttp::new(true, true);

        let report = run_with(&mut mailbox, &transport, &http, &settings());

        assert_eq!(report.summary.fetched, 0);
        assert_eq!(report.summary.skipped, 0);
        assert!(report.errors.is_empty());
        assert_eq!(mailbox.opened.as_deref(), Some("INBOX"));
    }

    // ── Gates ───────────────────────────────────────────────────────

    #[test]
    fn disabled_unsubscribe_automation_skips_without_attempts() {
        let mut mailbox = MockMailbox {
            ids: vec![1],
            messages: HashMap::from([(1, marketing_message())]),
            ..Default::default()
        };
        let transport = MockTransport::ok();
        let http = MockHttp::new(true, true);
        let mut settings = settings();
        settings.auto_unsubscribe_marketing = false;

        let report = run_with(&mut mailbox, &transport, &http, &settings);

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].reason, SKIP_UNSUB_DISABLED);
        assert!(report.marketing_unsubscribes.is_empty());
        assert!(http.posts.borrow().is_empty());
        assert!(http.gets.borrow().is_empty());
        assert!(transport.sent.borrow().is_empty());
        assert_eq!(mailbox.seen, vec![1]);
    }

    #[test]
    fn marketing_without_instructions_is_skipped() {
        let message = fetched(
            "promo@shop.example",
            "Weekly newsletter digest",
            "All the deals. Click here to unsubscribe.",
            None,
        );
        let mut mailbox = MockMailbox {
            ids: vec![1],
            messages: HashMap::from([(1, message)]),
            ..Default::default()
        };
        let transport = MockTransport::ok();
        let http = MockHttp::new(true, true);

        let report = run_with(&mut mailbox, &transport, &http, &settings());

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].reason, SKIP_NO_INSTRUCTIONS);
        assert!(report.marketing_unsubscribes.is_empty());
    }

    #[test]
    fn unusable_channels_get_their_own_skip_reason() {
        let message = fetched(
            "promo@shop.example",
            "Weekly newsletter digest",
            "All the deals. Click here to unsubscribe.",
            Some("<ftp://files.example/unsub>"),
        );
        let mut mailbox = MockMailbox {
            ids: vec![1],
            messages: HashMap::from([(1, message)]),
            ..Default::default()
        };
        let transport = MockTransport::ok();
        let http = MockHttp::new(true, true);

        let report = run_with(&mut mailbox, &transport, &http, &settings());

        assert_eq!(report.skipped[0].reason, SKIP_NO_USABLE_CHANNELS);
        assert!(report.marketing_unsubscribes.is_empty());
    }

    #[test]
    fn reply_disabled_skips_important_message() {
        let mut mailbox = MockMailbox {
            ids: vec![1],
            messages: HashMap::from([(1, important_message())]),
            ..Default::default()
        };
        let transport = MockTransport::ok();
        let http = MockHttp::new(true, true);
        let mut settings = settings();
        settings.auto_reply_important = false;

        let report = run_with(&mut mailbox, &transport, &http, &settings);

        assert_eq!(report.skipped[0].reason, SKIP_REPLY_DISABLED);
        assert!(transport.sent.borrow().is_empty());
        assert_eq!(mailbox.seen, vec![1]);
    }

    #[test]
    fn threshold_reason_wins_when_both_gates_would_skip() {
        let mut mailbox = MockMailbox {
            ids: vec![1],
            messages: HashMap::from([(1, routine_message())]),
            ..Default::default()
        };
        let transport = MockTransport::ok();
        let http = MockHttp::new(true, true);
        let mut settings = settings();
        settings.auto_reply_important = false;

        let report = run_with(&mut mailbox, &transport, &http, &settings);

        assert_eq!(report.skipped[0].reason, SKIP_BELOW_THRESHOLD);
    }

    // ── Channel fallback ────────────────────────────────────────────

    #[test]
    fn http_failure_falls_back_to_mailto_with_two_outcomes() {
        let mut mailbox = MockMailbox {
            ids: vec![1],
            messages: HashMap::from([(1, marketing_message())]),
            ..Default::default()
        };
        let transport = MockTransport::ok();
        let http = MockHttp::new(false, false);

        let report = run_with(&mut mailbox, &transport, &http, &settings());

        assert_eq!(report.marketing_unsubscribes.len(), 2);
        assert_eq!(
            report.marketing_unsubscribes[0].channel,
            UnsubscribeChannelKind::Http
        );
        assert_eq!(report.marketing_unsubscribes[0].status, AttemptStatus::Failed);
        assert_eq!(
            report.marketing_unsubscribes[1].channel,
            UnsubscribeChannelKind::Email
        );
        assert_eq!(
            report.marketing_unsubscribes[1].status,
            AttemptStatus::Requested
        );
        assert_eq!(report.marketing_unsubscribes[1].endpoint, "out@example.com");
        // The HTTP failure is also surfaced in the diagnostics log
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("HTTP unsubscribe failed"));
        assert_eq!(transport.sent.borrow().len(), 1);
        assert_eq!(mailbox.seen, vec![1]);
    }

    // ── Failure handling ────────────────────────────────────────────

    #[test]
    fn reply_dispatch_failure_is_recorded_and_marked_seen() {
        let mut mailbox = MockMailbox {
            ids: vec![1],
            messages: HashMap::from([(1, important_message())]),
            ..Default::default()
        };
        let transport = MockTransport::failing("connection reset by peer");
        let http = MockHttp::new(true, true);

        let report = run_with(&mut mailbox, &transport, &http, &settings());

        assert_eq!(report.important_replies.len(), 1);
        assert_eq!(report.important_replies[0].status, ReplyStatus::Failed);
        assert_eq!(report.important_replies[0].reply_preview, REPLY_FAILED_PREVIEW);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("connection reset by peer"));
        // The message was handled, just unsuccessfully
        assert_eq!(mailbox.seen, vec![1]);
    }

    #[test]
    fn rejected_recipients_mark_the_reply_failed() {
        let mut mailbox = MockMailbox {
            ids: vec![1],
            messages: HashMap::from([(1, important_message())]),
            ..Default::default()
        };
        let transport = MockTransport::rejecting("alice@client.example");
        let http = MockHttp::new(true, true);

        let report = run_with(&mut mailbox, &transport, &http, &settings());

        assert_eq!(report.important_replies[0].status, ReplyStatus::Failed);
        assert!(report.errors[0].contains("alice@client.example"));
    }

    #[test]
    fn unparseable_message_is_skipped_without_mark_seen() {
        let broken = FetchedMessage {
            raw: Vec::new(),
            envelope_from: Some("alice@client.example".into()),
            envelope_message_id: Some("<broken@example.com>".into()),
        };
        let mut mailbox = MockMailbox {
            ids: vec![1, 2],
            messages: HashMap::from([(1, broken), (2, routine_message())]),
            ..Default::default()
        };
        let transport = MockTransport::ok();
        let http = MockHttp::new(true, true);

        let report = run_with(&mut mailbox, &transport, &http, &settings());

        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.skipped[0].reason, SKIP_UNPARSEABLE);
        assert_eq!(report.skipped[0].message_id, "<broken@example.com>");
        // The batch continued, and only the second message was marked seen
        assert_eq!(mailbox.seen, vec![2]);
    }

    #[test]
    fn missing_message_is_skipped_without_mark_seen() {
        let mut mailbox = MockMailbox {
            ids: vec![9],
            ..Default::default()
        };
        let transport = MockTransport::ok();
        let http = MockHttp::new(true, true);

        let report = run_with(&mut mailbox, &transport, &http, &settings());

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].reason, SKIP_MISSING_SOURCE);
        assert!(mailbox.seen.is_empty());
    }

    #[test]
    fn fetch_failure_is_isolated_to_one_message() {
        let mut mailbox = MockMailbox {
            ids: vec![1, 2],
            messages: HashMap::from([(2, important_message())]),
            fail_fetch: Some(1),
            ..Default::default()
        };
        let transport = MockTransport::ok();
        let http = MockHttp::new(true, true);

        let report = run_with(&mut mailbox, &transport, &http, &settings());

        assert_eq!(report.summary.fetched, 2);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("Failed to process message 1"));
        // Message 2 still got its reply
        assert_eq!(report.important_replies.len(), 1);
        assert_eq!(mailbox.seen, vec![2]);
    }

    // ── Batching and summaries ──────────────────────────────────────

    #[test]
    fn batch_is_capped_to_most_recent_messages() {
        let mut mailbox = MockMailbox {
            ids: (1..=30).collect(),
            ..Default::default()
        };
        let transport = MockTransport::ok();
        let http = MockHttp::new(true, true);

        let report = run_with(&mut mailbox, &transport, &http, &settings());

        assert_eq!(report.summary.fetched, MAX_BATCH);
        // Oldest ids fell off the front of the workload
        assert_eq!(report.skipped.first().unwrap().message_id, "6");
    }

    #[test]
    fn summaries_are_gated_by_settings() {
        let mut with = MockMailbox {
            ids: vec![1],
            messages: HashMap::from([(1, important_message())]),
            ..Default::default()
        };
        let transport = MockTransport::ok();
        let http = MockHttp::new(true, true);
        run_with(&mut with, &transport, &http, &settings());
        let body_with = transport.sent.borrow().last().unwrap().body.clone();
        assert!(body_with.contains("- "));

        let mut without = MockMailbox {
            ids: vec![1],
            messages: HashMap::from([(1, important_message())]),
            ..Default::default()
        };
        let transport = MockTransport::ok();
        let mut settings = settings();
        settings.include_summaries = false;
        run_with(&mut without, &transport, &http, &settings);
        let body_without = transport.sent.borrow().last().unwrap().body.clone();
        assert!(!body_without.contains("- "));
    }
}
