//! Group and individual delivery fan-out
//!
//! A delivery is either a new message or a forward of an existing one. After
//! the recipient set passes validation it is dispatched as one aggregate call
//! (group mode) or one call per TO recipient (individual mode). Per-call
//! failures become [`DeliveryOutcome::Failed`] entries; nothing here returns an
//! error once dispatch has started.

use futures::StreamExt;
use futures::stream;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::AuthHeaders;
use crate::graph::{MailTransport, Operation, UpstreamError, UpstreamRequest, UpstreamResult};
use crate::payload::{ContentType, build_forward_payload, build_message_payload};
use crate::recipients::Recipients;

/// How TO recipients are mapped onto upstream calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// One call addressed to every TO recipient
    Group,
    /// One call per TO recipient, each carrying the full CC/BCC lists
    Individual,
}

impl DeliveryMode {
    pub fn from_flag(send_individual: bool) -> Self {
        if send_individual {
            Self::Individual
        } else {
            Self::Group
        }
    }
}

/// What is being delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    NewMessage {
        subject: String,
        body: String,
        content_type: ContentType,
    },
    Forward {
        message_id: String,
        comment: String,
    },
}

impl Delivery {
    /// Build the upstream request for one TO slice
    fn request(
        &self,
        to: &[String],
        cc: &[String],
        bcc: &[String],
    ) -> UpstreamResult<UpstreamRequest> {
        match self {
            Self::NewMessage {
                subject,
                body,
                content_type,
            } => UpstreamRequest::new(Operation::SendMail).with_json(&build_message_payload(
                to,
                subject,
                body,
                *content_type,
                cc,
                bcc,
            )),
            Self::Forward {
                message_id,
                comment,
            } => UpstreamRequest::new(Operation::Forward {
                message_id: message_id.clone(),
            })
            .with_json(&build_forward_payload(to, cc, bcc, comment)),
        }
    }

    fn success_status(&self) -> DeliveryStatus {
        match self {
            Self::NewMessage { .. } => DeliveryStatus::Sent,
            Self::Forward { .. } => DeliveryStatus::Forwarded,
        }
    }

    fn failure_message(&self, err: &UpstreamError) -> String {
        match (self, err) {
            (_, UpstreamError::Status { .. }) => err.to_string(),
            (Self::NewMessage { .. }, UpstreamError::Transport(msg)) => {
                format!("Error sending email: {msg}")
            }
            (Self::Forward { .. }, UpstreamError::Transport(msg)) => {
                format!("Error forwarding email: {msg}")
            }
        }
    }

    fn requires_to_recipient(&self) -> bool {
        matches!(self, Self::Forward { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Forwarded,
    Error,
}

/// Result of one upstream call within a delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum DeliveryOutcome {
    /// `recipient` is set only in individual mode
    Failed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recipient: Option<String>,
        status: DeliveryStatus,
        message: String,
    },
    Group {
        recipients: Vec<String>,
        status: DeliveryStatus,
    },
    Individual {
        recipient: String,
        status: DeliveryStatus,
    },
}

impl DeliveryOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Top-level result of a send or forward
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DeliveryResult {
    /// Dispatch ran; individual failures live in `results`
    Complete { results: Vec<DeliveryOutcome> },
    /// Rejected before any upstream call
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        invalid_addresses: Vec<String>,
    },
}

impl DeliveryResult {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Short human-readable line for tool summaries
    pub fn summary(&self) -> String {
        match self {
            Self::Complete { results } => {
                let failed = results.iter().filter(|r| r.is_failure()).count();
                format!("{} call(s) completed, {failed} failed", results.len() - failed)
            }
            Self::Error { message, .. } => message.clone(),
        }
    }
}

/// Check a delivery before any network work
///
/// Forwards need at least one TO recipient; that check runs first. Then every
/// address across TO, CC and BCC must pass the format rule. Returns the
/// rejection, or `None` when dispatch may proceed.
pub fn reject_invalid(delivery: &Delivery, recipients: &Recipients) -> Option<DeliveryResult> {
    if delivery.requires_to_recipient() && recipients.to.is_empty() {
        return Some(DeliveryResult::Error {
            message: "At least one TO recipient is required".to_owned(),
            invalid_addresses: Vec::new(),
        });
    }

    let invalid = recipients.invalid_addresses();
    if invalid.is_empty() {
        return None;
    }
    Some(DeliveryResult::Error {
        message: format!("Invalid email address(es): {}", invalid.join(", ")),
        invalid_addresses: invalid,
    })
}

/// Dispatch an already validated delivery
///
/// Individual-mode calls run with at most `concurrency` in flight; outcomes
/// come back in TO order regardless of completion order.
pub async fn dispatch<T: MailTransport>(
    transport: &T,
    auth: &AuthHeaders,
    delivery: &Delivery,
    recipients: &Recipients,
    mode: DeliveryMode,
    concurrency: usize,
) -> DeliveryResult {
    let results = match mode {
        DeliveryMode::Group => {
            let sent = deliver_once(transport, auth, delivery, &recipients.to, recipients).await;
            let outcome = match sent {
                Ok(()) => DeliveryOutcome::Group {
                    recipients: recipients.to.clone(),
                    status: delivery.success_status(),
                },
                Err(err) => {
                    warn!(error = %err, recipients = recipients.to.len(), "group delivery failed");
                    DeliveryOutcome::Failed {
                        recipient: None,
                        status: DeliveryStatus::Error,
                        message: delivery.failure_message(&err),
                    }
                }
            };
            vec![outcome]
        }
        DeliveryMode::Individual => {
            stream::iter(recipients.to.iter().cloned())
                .map(move |recipient: String| async move {
                    let to = std::slice::from_ref(&recipient);
                    let result = deliver_once(transport, auth, delivery, to, recipients).await;
                    match result {
                        Ok(()) => DeliveryOutcome::Individual {
                            status: delivery.success_status(),
                            recipient,
                        },
                        Err(err) => {
                            warn!(error = %err, %recipient, "individual delivery failed");
                            DeliveryOutcome::Failed {
                                message: delivery.failure_message(&err),
                                status: DeliveryStatus::Error,
                                recipient: Some(recipient),
                            }
                        }
                    }
                })
                .buffered(concurrency.max(1))
                .collect::<Vec<_>>()
                .await
        }
    };
    DeliveryResult::Complete { results }
}

async fn deliver_once<T: MailTransport>(
    transport: &T,
    auth: &AuthHeaders,
    delivery: &Delivery,
    to: &[String],
    recipients: &Recipients,
) -> UpstreamResult<()> {
    let request = delivery.request(to, &recipients.cc, &recipients.bcc)?;
    debug!(to = to.len(), "dispatching delivery call");
    transport.call(request, auth).await.map(|_| ())
}
