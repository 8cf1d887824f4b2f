//! Formal acknowledgment replies.
//!
//! Pure template assembly: the draft is fully determined by the parsed
//! email, the agent profile and the optional summary bullets. The tone
//! setting selects phrasing templates and nothing else.

use crate::config::{AgentProfile, ReplyTone};
use crate::pipeline::types::{ParsedEmail, ReplyDraft};

/// Craft the acknowledgment reply for an important message.
pub fn craft_formal_reply(
    email: &ParsedEmail,
    profile: &AgentProfile,
    summary: &[String],
) -> ReplyDraft {
    let tone = profile.reply_tone;
    let mut sections: Vec<String> = Vec::new();

    sections.push(salutation(email, tone));
    sections.push(opening(&email.subject, tone));

    if !summary.is_empty() {
        let heading = match tone {
            ReplyTone::Formal => "For reference, the key points I have noted are:",
            ReplyTone::Neutral => "Key points noted:",
        };
        let bullets = summary
            .iter()
            .map(|point| format!("- {point}"))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("{heading}\n{bullets}"));
    }

    sections.push(match tone {
        ReplyTone::Formal => {
            "I will follow up with a complete response as soon as possible.".to_string()
        }
        ReplyTone::Neutral => "I'll get back to you with a proper answer soon.".to_string(),
    });

    let close = match tone {
        ReplyTone::Formal => "Kind regards,",
        ReplyTone::Neutral => "Best,",
    };
    sections.push(format!("{close}\n{}", signature_block(profile)));

    ReplyDraft {
        subject: reply_subject(&email.subject),
        body: sections.join("\n\n"),
    }
}

/// Prefix the original subject with a reply marker unless one is present.
pub fn reply_subject(subject: &str) -> String {
    if subject.starts_with("Re: ") || subject.starts_with("RE: ") || subject.starts_with("re: ") {
        subject.to_string()
    } else {
        format!("Re: {subject}")
    }
}

fn salutation(email: &ParsedEmail, tone: ReplyTone) -> String {
    match (&email.from_name, tone) {
        (Some(name), ReplyTone::Formal) => format!("Dear {name},"),
        (Some(name), ReplyTone::Neutral) => format!("Hello {name},"),
        (None, ReplyTone::Formal) => "To whom it may concern,".to_string(),
        (None, ReplyTone::Neutral) => "Hello,".to_string(),
    }
}

fn opening(subject: &str, tone: ReplyTone) -> String {
    match tone {
        ReplyTone::Formal => format!(
            "Thank you for your message regarding \"{subject}\". I am writing to \
             confirm that it has been received and will be given proper attention."
        ),
        ReplyTone::Neutral => format!(
            "Thanks for your message about \"{subject}\". Just confirming that it \
             arrived safely."
        ),
    }
}

/// The configured signature text, or a block built from the identity
/// fields when no custom signature is set.
fn signature_block(profile: &AgentProfile) -> String {
    if let Some(signature) = &profile.signature {
        let trimmed = signature.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut lines = vec![profile.display_name.clone()];
    if let Some(title) = &profile.job_title {
        lines.push(title.clone());
    }
    if let Some(company) = &profile.company {
        lines.push(company.clone());
    }
    lines.join("\n")
}
