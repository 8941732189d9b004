//! Upstream request bodies for send, reply and forward
//!
//! Pure constructors; no I/O and no validation. Field names follow the Graph
//! wire contract, so every struct here is `camelCase` on the wire.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Body format of a message or reply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ContentType {
    #[default]
    Text,
    #[serde(rename = "HTML", alias = "Html", alias = "html")]
    Html,
}

/// `{"emailAddress": {"address": ...}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub email_address: EmailAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailAddress {
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemBody {
    pub content_type: ContentType,
    pub content: String,
}

/// Body of `POST /me/sendMail`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMailPayload {
    pub message: OutgoingMessage,
    pub save_to_sent_items: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub subject: String,
    pub body: ItemBody,
    pub to_recipients: Vec<Recipient>,
    pub cc_recipients: Vec<Recipient>,
    pub bcc_recipients: Vec<Recipient>,
}

/// Body of `POST /me/messages/{id}/forward`
///
/// Unlike [`OutgoingMessage`], empty CC/BCC sections are left out entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardPayload {
    pub comment: String,
    pub to_recipients: Vec<Recipient>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cc_recipients: Vec<Recipient>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bcc_recipients: Vec<Recipient>,
}

/// Body of `POST /me/messages/{id}/reply`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyPayload {
    pub message: ReplyMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyMessage {
    pub body: ItemBody,
}

pub fn build_recipients(addresses: &[String]) -> Vec<Recipient> {
    addresses
        .iter()
        .map(|address| Recipient {
            email_address: EmailAddress {
                address: address.clone(),
            },
        })
        .collect()
}

pub fn build_message_payload(
    to: &[String],
    subject: &str,
    body: &str,
    content_type: ContentType,
    cc: &[String],
    bcc: &[String],
) -> SendMailPayload {
    SendMailPayload {
        message: OutgoingMessage {
            subject: subject.to_owned(),
            body: ItemBody {
                content_type,
                content: body.to_owned(),
            },
            to_recipients: build_recipients(to),
            cc_recipients: build_recipients(cc),
            bcc_recipients: build_recipients(bcc),
        },
        save_to_sent_items: true,
    }
}

pub fn build_forward_payload(
    to: &[String],
    cc: &[String],
    bcc: &[String],
    additional_message: &str,
) -> ForwardPayload {
    ForwardPayload {
        comment: additional_message.to_owned(),
        to_recipients: build_recipients(to),
        cc_recipients: build_recipients(cc),
        bcc_recipients: build_recipients(bcc),
    }
}

pub fn build_reply_payload(reply_message: &str, content_type: ContentType) -> ReplyPayload {
    ReplyPayload {
        message: ReplyMessage {
            body: ItemBody {
                content_type,
                content: reply_message.to_owned(),
            },
        },
    }
}
