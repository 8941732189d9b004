//! Microsoft Graph REST transport
//!
//! Maps each mail operation to its method and URL template, attaches the
//! bearer token, and reduces every failure to [`UpstreamError`]. Nothing here
//! retries: one request in, one result out.

use std::future::Future;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::auth::AuthHeaders;
use crate::config::ServerConfig;
use crate::errors::{AppError, AppResult};

/// Failure of a single upstream call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// Response outside the 2xx range
    #[error("HTTP Error {status}: {body}")]
    Status { status: u16, body: String },
    /// Connection, DNS, timeout, or (de)serialization failure
    #[error("{0}")]
    Transport(String),
}

pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// Upstream operation, carrying whatever it needs to build its URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    SendMail,
    Reply { message_id: String },
    Forward { message_id: String },
    Delete { message_id: String },
    ListMessages { folder: String },
    GetMessage { message_id: String },
}

impl Operation {
    pub fn method(&self) -> Method {
        match self {
            Self::SendMail | Self::Reply { .. } | Self::Forward { .. } => Method::POST,
            Self::Delete { .. } => Method::DELETE,
            Self::ListMessages { .. } | Self::GetMessage { .. } => Method::GET,
        }
    }

    /// Whether the caller consumes the response body
    pub fn returns_body(&self) -> bool {
        matches!(self, Self::ListMessages { .. } | Self::GetMessage { .. })
    }

    /// Path relative to the API base URL; identifiers are percent-encoded
    pub fn path(&self) -> String {
        match self {
            Self::SendMail => "/me/sendMail".to_owned(),
            Self::Reply { message_id } => {
                format!("/me/messages/{}/reply", urlencoding::encode(message_id))
            }
            Self::Forward { message_id } => {
                format!("/me/messages/{}/forward", urlencoding::encode(message_id))
            }
            Self::Delete { message_id } | Self::GetMessage { message_id } => {
                format!("/me/messages/{}", urlencoding::encode(message_id))
            }
            Self::ListMessages { folder } => {
                format!("/me/mailFolders/{}/messages", urlencoding::encode(folder))
            }
        }
    }
}

/// One fully described upstream call
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamRequest {
    pub operation: Operation,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl UpstreamRequest {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            query: Vec::new(),
            body: None,
        }
    }

    /// Attach a JSON body
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the payload cannot be serialized.
    pub fn with_json<T: Serialize>(mut self, payload: &T) -> UpstreamResult<Self> {
        let value = serde_json::to_value(payload).map_err(|e| {
            UpstreamError::Transport(format!("failed to serialize request body: {e}"))
        })?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn with_query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_owned(), value.into()));
        self
    }
}

/// Something that can execute upstream mail calls
///
/// Implemented by [`GraphClient`] for real traffic and by recording fakes in
/// tests. Returns the decoded JSON response for reads, and `Value::Null` for
/// operations whose response body is ignored or empty.
pub trait MailTransport: Send + Sync {
    fn call(
        &self,
        request: UpstreamRequest,
        auth: &AuthHeaders,
    ) -> impl Future<Output = UpstreamResult<Value>> + Send;
}

/// `reqwest`-backed Graph client
#[derive(Debug, Clone)]
pub struct GraphClient {
    http: Client,
    base_url: String,
}

impl GraphClient {
    /// Build a client with the configured per-call timeout
    pub fn new(config: &ServerConfig) -> AppResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(http, config.api_url.clone()))
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

impl MailTransport for GraphClient {
    async fn call(&self, request: UpstreamRequest, auth: &AuthHeaders) -> UpstreamResult<Value> {
        let url = format!("{}{}", self.base_url, request.operation.path());
        let method = request.operation.method();
        debug!(%method, %url, "graph request");

        let mut builder = self
            .http
            .request(method, &url)
            .bearer_auth(auth.token().expose_secret())
            .header(CONTENT_TYPE, "application/json");
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;
        debug!(status = status.as_u16(), "graph response");

        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        if !request.operation.returns_body() || text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| UpstreamError::Transport(format!("invalid JSON response: {e}")))
    }
}

fn transport_error(err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::Transport(format!("request timed out: {err}"))
    } else {
        UpstreamError::Transport(err.to_string())
    }
}
