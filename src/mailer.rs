//! Mail operations shared by both front ends
//!
//! Each operation normalizes and validates its input, resolves auth headers
//! once, then talks to the transport. Rejections and upstream failures are
//! returned as result values; only missing credentials or malformed required
//! fields surface as [`AppError`].

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::auth::{TokenCache, auth_headers};
use crate::delivery::{Delivery, DeliveryMode, DeliveryResult, dispatch, reject_invalid};
use crate::errors::{AppError, AppResult};
use crate::fetch::{FetchQuery, FetchResult, FetchedMail, get_request, list_request};
use crate::graph::{GraphClient, MailTransport, Operation, UpstreamError, UpstreamRequest};
use crate::models::{DeleteEmailInput, ForwardEmailInput, ReplyEmailInput, SendEmailInput};
use crate::payload::build_reply_payload;
use crate::recipients::Recipients;

/// Outcome of a single-call operation (reply, delete)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum OperationOutcome {
    Success { message: String },
    Error { message: String },
}

impl OperationOutcome {
    pub fn message(&self) -> &str {
        match self {
            Self::Success { message } | Self::Error { message } => message,
        }
    }
}

/// Mail operations over one transport and token cache
pub struct MailService<T = GraphClient> {
    transport: T,
    tokens: Arc<dyn TokenCache>,
    fanout_concurrency: usize,
}

impl<T: MailTransport> MailService<T> {
    pub fn new(transport: T, tokens: Arc<dyn TokenCache>, fanout_concurrency: usize) -> Self {
        Self {
            transport,
            tokens,
            fanout_concurrency: fanout_concurrency.max(1),
        }
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send a new message in group or individual mode
    pub async fn send(&self, input: &SendEmailInput) -> AppResult<DeliveryResult> {
        let span = info_span!("send_email", operation_id = %Uuid::new_v4());
        async {
            let recipients = Recipients::from_inputs(
                Some(&input.recipient),
                input.cc.as_ref(),
                input.bcc.as_ref(),
            );
            let delivery = Delivery::NewMessage {
                subject: input.subject.clone(),
                body: input.body.clone(),
                content_type: input.content_type,
            };
            self.deliver(&delivery, &recipients, DeliveryMode::from_flag(input.send_individual))
                .await
        }
        .instrument(span)
        .await
    }

    /// Forward an existing message in group or individual mode
    pub async fn forward(&self, input: &ForwardEmailInput) -> AppResult<DeliveryResult> {
        let span = info_span!("forward_email", operation_id = %Uuid::new_v4());
        async {
            let message_id = required("email_id", &input.email_id)?;
            if let Some(content_type) = input.content_type {
                debug!(?content_type, "forward content type ignored; comment is sent as-is");
            }
            let recipients = Recipients::from_inputs(
                Some(&input.recipient),
                input.cc.as_ref(),
                input.bcc.as_ref(),
            );
            let delivery = Delivery::Forward {
                message_id: message_id.to_owned(),
                comment: input.additional_message.clone(),
            };
            self.deliver(&delivery, &recipients, DeliveryMode::from_flag(input.send_individual))
                .await
        }
        .instrument(span)
        .await
    }

    async fn deliver(
        &self,
        delivery: &Delivery,
        recipients: &Recipients,
        mode: DeliveryMode,
    ) -> AppResult<DeliveryResult> {
        if let Some(rejection) = reject_invalid(delivery, recipients) {
            info!(reason = %rejection.summary(), "delivery rejected before dispatch");
            return Ok(rejection);
        }
        let auth = auth_headers(self.tokens.as_ref())?;
        let result = dispatch(
            &self.transport,
            &auth,
            delivery,
            recipients,
            mode,
            self.fanout_concurrency,
        )
        .await;
        info!(?mode, summary = %result.summary(), "delivery finished");
        Ok(result)
    }

    pub async fn reply(&self, input: &ReplyEmailInput) -> AppResult<OperationOutcome> {
        let span = info_span!("reply_email", operation_id = %Uuid::new_v4());
        async {
            let message_id = required("email_id", &input.email_id)?;
            let request = UpstreamRequest::new(Operation::Reply {
                message_id: message_id.to_owned(),
            })
            .with_json(&build_reply_payload(&input.reply_message, input.content_type));
            let outcome = match request {
                Ok(request) => {
                    self.single_call(request, "Reply sent successfully.", "Error sending reply")
                        .await?
                }
                Err(err) => failed("Error sending reply", &err),
            };
            Ok(outcome)
        }
        .instrument(span)
        .await
    }

    pub async fn delete(&self, input: &DeleteEmailInput) -> AppResult<OperationOutcome> {
        let span = info_span!("delete_email", operation_id = %Uuid::new_v4());
        async {
            let message_id = required("email_id", &input.email_id)?;
            let request = UpstreamRequest::new(Operation::Delete {
                message_id: message_id.to_owned(),
            });
            self.single_call(request, "Email deleted successfully.", "Error deleting email")
                .await
        }
        .instrument(span)
        .await
    }

    async fn single_call(
        &self,
        request: UpstreamRequest,
        success: &str,
        failure_context: &str,
    ) -> AppResult<OperationOutcome> {
        let auth = auth_headers(self.tokens.as_ref())?;
        match self.transport.call(request, &auth).await {
            Ok(_) => Ok(OperationOutcome::Success {
                message: success.to_owned(),
            }),
            Err(err) => {
                warn!(error = %err, "{failure_context}");
                Ok(failed(failure_context, &err))
            }
        }
    }

    /// Look up one message by id, or list a folder with filters
    pub async fn fetch(&self, query: &FetchQuery) -> AppResult<FetchResult> {
        let span = info_span!("fetch_emails", operation_id = %Uuid::new_v4());
        async {
            let auth = auth_headers(self.tokens.as_ref())?;
            let result = match query.lookup_id() {
                Some(message_id) => {
                    match self.transport.call(get_request(message_id), &auth).await {
                        Ok(email) => FetchResult::Success(FetchedMail::single(email)),
                        Err(err) => fetch_failed("Error fetching email", &err),
                    }
                }
                None => match self.transport.call(list_request(query), &auth).await {
                    Ok(response) => FetchResult::Success(FetchedMail::listing(response, query)),
                    Err(err) => fetch_failed("Error fetching emails", &err),
                },
            };
            Ok(result)
        }
        .instrument(span)
        .await
    }
}

fn required<'a>(field: &str, value: &'a str) -> AppResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput(format!("{field} is required")));
    }
    Ok(trimmed)
}

/// Status errors keep the upstream text; transport errors get `context`
fn failure_text(context: &str, err: &UpstreamError) -> String {
    match err {
        UpstreamError::Status { .. } => err.to_string(),
        UpstreamError::Transport(msg) => format!("{context}: {msg}"),
    }
}

fn failed(context: &str, err: &UpstreamError) -> OperationOutcome {
    OperationOutcome::Error {
        message: failure_text(context, err),
    }
}

fn fetch_failed(context: &str, err: &UpstreamError) -> FetchResult {
    warn!(error = %err, "{context}");
    FetchResult::Error {
        message: failure_text(context, err),
    }
}
