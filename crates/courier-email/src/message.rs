// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversion of outbound messages into RFC 5322 emails.

use courier_core::CourierError;
use courier_core::types::OutboundMessage;
use lettre::Message;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;

fn mailbox(field: &str, raw: &str) -> Result<Mailbox, CourierError> {
    raw.trim()
        .parse()
        .map_err(|e| CourierError::Validation(format!("invalid {field} address `{raw}`: {e}")))
}

/// Domain part of an address, used as the right-hand side of Message-IDs.
fn domain_of(address: &str) -> Option<&str> {
    address
        .rsplit_once('@')
        .map(|(_, domain)| domain.trim_end_matches('>').trim())
        .filter(|domain| !domain.is_empty())
}

/// A fresh `<uuid@domain>` Message-ID for the given sender.
pub fn new_message_id(from: &str) -> String {
    let domain = domain_of(from).unwrap_or("courier.local");
    format!("<{}@{domain}>", uuid::Uuid::new_v4())
}

fn looks_like_html(body: &str) -> bool {
    let head = body.trim_start();
    head.starts_with('<') && head.contains("</")
}

/// Build the email for `message`, stamping `message_id`.
///
/// Address parse failures are validation errors: retrying cannot fix them.
pub fn build_email(message: &OutboundMessage, message_id: &str) -> Result<Message, CourierError> {
    let mut builder = Message::builder()
        .message_id(Some(message_id.to_string()))
        .from(mailbox("from", &message.from)?)
        .to(mailbox("to", &message.to)?);

    if let Some(subject) = &message.subject {
        builder = builder.subject(subject.as_str());
    }
    for cc in &message.cc {
        builder = builder.cc(mailbox("cc", cc)?);
    }
    for bcc in &message.bcc {
        builder = builder.bcc(mailbox("bcc", bcc)?);
    }
    if let Some(reply_to) = &message.reply_to {
        builder = builder.reply_to(mailbox("reply-to", reply_to)?);
    }

    let content_type = if looks_like_html(&message.body) {
        ContentType::TEXT_HTML
    } else {
        ContentType::TEXT_PLAIN
    };

    builder
        .header(content_type)
        .body(message.body.clone())
        .map_err(|e| CourierError::Validation(format!("cannot build email: {e}")))
}
