//! Message listing and lookup
//!
//! Builds list/get requests and shapes upstream responses. Subject filtering
//! is done locally over a widened page; everything else is an OData `$filter`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph::{Operation, UpstreamRequest};

/// Page size of a plain listing
pub const DEFAULT_PAGE_SIZE: u32 = 10;
/// Page size when a subject filter has to be applied locally
pub const SUBJECT_SCAN_PAGE_SIZE: u32 = 50;

pub const DEFAULT_FOLDER: &str = "inbox";

/// Normalized fetch parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchQuery {
    pub folder: String,
    pub is_read: Option<bool>,
    pub sender: Option<String>,
    pub email_id: Option<String>,
    pub subject: Option<String>,
}

impl Default for FetchQuery {
    fn default() -> Self {
        Self {
            folder: DEFAULT_FOLDER.to_owned(),
            is_read: None,
            sender: None,
            email_id: None,
            subject: None,
        }
    }
}

impl FetchQuery {
    /// Non-blank message id, if this is a lookup
    pub fn lookup_id(&self) -> Option<&str> {
        non_blank(self.email_id.as_deref())
    }

    fn subject_filter(&self) -> Option<&str> {
        non_blank(self.subject.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub fn page_size_for(query: &FetchQuery) -> u32 {
    if query.subject_filter().is_some() {
        SUBJECT_SCAN_PAGE_SIZE
    } else {
        DEFAULT_PAGE_SIZE
    }
}

/// Server-side `$filter` expression, if any clause applies
pub fn build_filter(query: &FetchQuery) -> Option<String> {
    let mut clauses = Vec::new();
    if let Some(is_read) = query.is_read {
        clauses.push(format!("isRead eq {is_read}"));
    }
    if let Some(sender) = non_blank(query.sender.as_deref()) {
        clauses.push(format!(
            "from/emailAddress/address eq '{}'",
            sender.replace('\'', "''")
        ));
    }
    if clauses.is_empty() {
        None
    } else {
        Some(clauses.join(" and "))
    }
}

pub fn get_request(message_id: &str) -> UpstreamRequest {
    UpstreamRequest::new(Operation::GetMessage {
        message_id: message_id.to_owned(),
    })
}

pub fn list_request(query: &FetchQuery) -> UpstreamRequest {
    let folder = non_blank(Some(&query.folder)).unwrap_or(DEFAULT_FOLDER);
    let request = UpstreamRequest::new(Operation::ListMessages {
        folder: folder.to_owned(),
    })
    .with_query("$top", page_size_for(query).to_string());
    match build_filter(query) {
        Some(filter) => request.with_query("$filter", filter),
        None => request,
    }
}

/// Every whitespace-separated term of `filter` occurs in `subject`,
/// case-insensitively. A blank filter matches everything.
pub fn subject_matches(subject: &str, filter: &str) -> bool {
    let subject = subject.to_lowercase();
    filter
        .to_lowercase()
        .split_whitespace()
        .all(|term| subject.contains(term))
}

/// Compact view of one listed message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MessageSummary {
    pub id: String,
    pub subject: String,
    pub from: String,
    pub received: String,
    pub is_read: bool,
    pub preview: String,
}

impl MessageSummary {
    pub fn from_message(message: &Value) -> Self {
        Self {
            id: str_field(message, "/id"),
            subject: str_field(message, "/subject"),
            from: sender_address(message),
            received: str_field(message, "/receivedDateTime"),
            is_read: message
                .get("isRead")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            preview: str_field(message, "/bodyPreview"),
        }
    }
}

fn str_field(message: &Value, pointer: &str) -> String {
    message
        .pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

fn sender_address(message: &Value) -> String {
    str_field(message, "/from/emailAddress/address")
}

/// Successful fetch payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum FetchedMail {
    /// Lookup by id, with the most useful fields hoisted
    Single {
        email: Value,
        email_id: String,
        subject: String,
        from: String,
    },
    Listing {
        emails: Vec<Value>,
        email_summaries: Vec<MessageSummary>,
    },
}

impl FetchedMail {
    pub fn single(email: Value) -> Self {
        Self::Single {
            email_id: str_field(&email, "/id"),
            subject: str_field(&email, "/subject"),
            from: sender_address(&email),
            email,
        }
    }

    /// Shape a `{"value": [...]}` listing, applying the local subject filter
    pub fn listing(response: Value, query: &FetchQuery) -> Self {
        let mut emails = match response {
            Value::Object(mut body) => match body.remove("value") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };
        if let Some(filter) = query.subject_filter() {
            emails.retain(|email| {
                subject_matches(email.get("subject").and_then(Value::as_str).unwrap_or(""), filter)
            });
        }
        let email_summaries = emails.iter().map(MessageSummary::from_message).collect();
        Self::Listing {
            emails,
            email_summaries,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            Self::Single { subject, .. } => format!("fetched message '{subject}'"),
            Self::Listing { emails, .. } => format!("{} message(s) fetched", emails.len()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FetchResult {
    Success(FetchedMail),
    Error { message: String },
}
