//! MCP server implementation with tool handlers
//!
//! Implements the `ServerHandler` trait and registers 7 MCP tools. Mail tools
//! delegate to [`MailService`]; every operation result, including validation
//! rejections and per-recipient failures, is returned inside the envelope.
//! Only operation-level failures (no token, missing required field) become
//! MCP errors.

use std::sync::Arc;
use std::time::Instant;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{ErrorData, ServerCapabilities, ServerInfo};
use rmcp::{Json, ServerHandler, tool, tool_handler, tool_router};
use tracing::{info, warn};

use crate::auth::{Authenticator, LoginPrompt};
use crate::delivery::DeliveryResult;
use crate::errors::AppResult;
use crate::fetch::{FetchQuery, FetchResult};
use crate::mailer::{MailService, OperationOutcome};
use crate::models::{
    DeleteEmailInput, FetchEmailsInput, ForwardEmailInput, LogoutOutput, Meta, ReplyEmailInput,
    SendEmailInput, ToolEnvelope,
};

/// Graph mail MCP server
///
/// Cheap to clone; the streamable HTTP transport builds one per session.
#[derive(Clone)]
pub struct MailGraphServer {
    mail: Arc<MailService>,
    auth: Arc<Authenticator>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl MailGraphServer {
    pub fn new(mail: Arc<MailService>, auth: Arc<Authenticator>) -> Self {
        Self {
            mail,
            auth,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        name = "send_email",
        description = "Send an email. Recipients may be a comma/semicolon separated string or a list; set send_individual to send one message per TO recipient"
    )]
    async fn send_email(
        &self,
        Parameters(input): Parameters<SendEmailInput>,
    ) -> Result<Json<ToolEnvelope<DeliveryResult>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(started, delivery_summary(self.mail.send(&input).await))
    }

    #[tool(
        name = "fetch_emails",
        description = "Fetch one message by email_id, or list a folder filtered by read state, sender and subject terms"
    )]
    async fn fetch_emails(
        &self,
        Parameters(input): Parameters<FetchEmailsInput>,
    ) -> Result<Json<ToolEnvelope<FetchResult>>, ErrorData> {
        let started = Instant::now();
        let query = FetchQuery::from(input);
        let result = self.mail.fetch(&query).await.map(|fetched| {
            let summary = match &fetched {
                FetchResult::Success(mail) => mail.summary(),
                FetchResult::Error { message } => message.clone(),
            };
            (summary, fetched)
        });
        finalize_tool(started, result)
    }

    #[tool(name = "reply_email", description = "Reply to a message")]
    async fn reply_email(
        &self,
        Parameters(input): Parameters<ReplyEmailInput>,
    ) -> Result<Json<ToolEnvelope<OperationOutcome>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(started, outcome_summary(self.mail.reply(&input).await))
    }

    #[tool(name = "delete_email", description = "Delete a message")]
    async fn delete_email(
        &self,
        Parameters(input): Parameters<DeleteEmailInput>,
    ) -> Result<Json<ToolEnvelope<OperationOutcome>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(started, outcome_summary(self.mail.delete(&input).await))
    }

    #[tool(
        name = "forward_email",
        description = "Forward a message with an optional comment, as one message or one per TO recipient"
    )]
    async fn forward_email(
        &self,
        Parameters(input): Parameters<ForwardEmailInput>,
    ) -> Result<Json<ToolEnvelope<DeliveryResult>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(started, delivery_summary(self.mail.forward(&input).await))
    }

    /// Starts a device-code sign-in and finishes it in the background
    #[tool(
        name = "login",
        description = "Start a device-code sign-in; open the returned URL and enter the code"
    )]
    async fn login(&self) -> Result<Json<ToolEnvelope<LoginPrompt>>, ErrorData> {
        let started = Instant::now();
        let result = async {
            let challenge = self.auth.start_login().await?;
            let prompt = LoginPrompt::from(&challenge);
            let auth = Arc::clone(&self.auth);
            tokio::spawn(async move {
                match auth.complete_login(&challenge).await {
                    Ok(()) => info!("login tool: sign-in completed"),
                    Err(e) => warn!(error = %e, "login tool: sign-in did not complete"),
                }
            });
            Ok((prompt.message.clone(), prompt))
        }
        .await;
        finalize_tool(started, result)
    }

    #[tool(name = "logout", description = "Remove the cached access token")]
    async fn logout(&self) -> Result<Json<ToolEnvelope<LogoutOutput>>, ErrorData> {
        let started = Instant::now();
        let result = self.auth.logout().map(|cleared| {
            let summary = if cleared {
                "Cached token removed"
            } else {
                "No cached token"
            };
            (summary.to_owned(), LogoutOutput { cleared })
        });
        finalize_tool(started, result)
    }
}

/// MCP server handler implementation
///
/// Provides server info and capabilities to MCP client.
#[tool_handler(router = self.tool_router)]
impl ServerHandler for MailGraphServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build()).with_instructions(
            "Microsoft Graph mail server. Run the login tool once to cache a token; send_email and forward_email report per-recipient outcomes.",
        )
    }
}

fn delivery_summary(result: AppResult<DeliveryResult>) -> AppResult<(String, DeliveryResult)> {
    result.map(|delivered| (delivered.summary(), delivered))
}

fn outcome_summary(result: AppResult<OperationOutcome>) -> AppResult<(String, OperationOutcome)> {
    result.map(|outcome| (outcome.message().to_owned(), outcome))
}

/// Calculate elapsed milliseconds
fn duration_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

/// Build a standardized MCP tool response envelope from business logic output
fn finalize_tool<T>(
    started: Instant,
    result: AppResult<(String, T)>,
) -> Result<Json<ToolEnvelope<T>>, ErrorData>
where
    T: schemars::JsonSchema,
{
    match result {
        Ok((summary, data)) => Ok(Json(ToolEnvelope {
            summary,
            data,
            meta: Meta::now(duration_ms(started)),
        })),
        Err(e) => Err(e.to_error_data()),
    }
}
