//! Input/output DTOs and schema-bearing types
//!
//! Defines the data structures used in MCP tool contracts. Each type is
//! annotated with `JsonSchema` for automatic schema generation. The HTTP API
//! converts its own request bodies into these same inputs.

use chrono::{SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::fetch::{DEFAULT_FOLDER, FetchQuery};
use crate::payload::ContentType;
use crate::recipients::RecipientInput;

/// Metadata included in all tool responses
///
/// Provides timing information and current UTC timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Meta {
    /// Current UTC timestamp in RFC 3339 format with milliseconds
    pub now_utc: String,
    /// Tool execution duration in milliseconds
    pub duration_ms: u64,
}

impl Meta {
    /// Create metadata populated with current time and elapsed duration
    pub fn now(duration_ms: u64) -> Self {
        Self {
            now_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            duration_ms,
        }
    }
}

/// Standard response envelope for all tools
///
/// Wraps tool-specific data with human-readable summary and execution metadata.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToolEnvelope<T>
where
    T: JsonSchema,
{
    /// Human-readable summary of the operation outcome
    pub summary: String,
    /// Tool-specific data payload
    pub data: T,
    /// Execution metadata (timestamp, duration)
    pub meta: Meta,
}

/// New message to one or more recipients
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SendEmailInput {
    /// Addresses as a `,`/`;` separated string or a list
    pub recipient: RecipientInput,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub content_type: ContentType,
    pub cc: Option<RecipientInput>,
    pub bcc: Option<RecipientInput>,
    /// Send one separate message per TO recipient
    #[serde(default)]
    pub send_individual: bool,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ForwardEmailInput {
    pub email_id: String,
    pub recipient: RecipientInput,
    pub cc: Option<RecipientInput>,
    pub bcc: Option<RecipientInput>,
    /// Comment placed above the forwarded message
    #[serde(default)]
    pub additional_message: String,
    /// Accepted for symmetry with send; forward comments are always plain
    pub content_type: Option<ContentType>,
    #[serde(default)]
    pub send_individual: bool,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ReplyEmailInput {
    pub email_id: String,
    pub reply_message: String,
    #[serde(default)]
    pub content_type: ContentType,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DeleteEmailInput {
    pub email_id: String,
}

/// Lookup by id, or a filtered listing of one folder
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FetchEmailsInput {
    #[serde(default = "default_folder")]
    pub folder: String,
    pub is_read: Option<bool>,
    pub sender: Option<String>,
    /// When set, every other filter is ignored
    pub email_id: Option<String>,
    /// Every whitespace-separated term must occur in the subject
    pub subject: Option<String>,
}

impl From<FetchEmailsInput> for FetchQuery {
    fn from(input: FetchEmailsInput) -> Self {
        Self {
            folder: input.folder,
            is_read: input.is_read,
            sender: input.sender,
            email_id: input.email_id,
            subject: input.subject,
        }
    }
}

/// Result of `logout`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LogoutOutput {
    /// Whether a cached token existed and was removed
    pub cleared: bool,
}

fn default_folder() -> String {
    DEFAULT_FOLDER.to_owned()
}
