//! Plain HTTP front end
//!
//! JSON routes under `/api` that share [`MailService`] with the MCP server.
//! Request bodies are looser than the tool inputs (every field optional,
//! `message` accepted as a body alias); required fields are checked here and
//! reported as `400`.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::parse_bool_value;
use crate::errors::{AppError, AppResult};
use crate::fetch::{DEFAULT_FOLDER, FetchQuery};
use crate::graph::MailTransport;
use crate::mailer::MailService;
use crate::models::{DeleteEmailInput, ForwardEmailInput, ReplyEmailInput, SendEmailInput};
use crate::payload::ContentType;
use crate::recipients::{RecipientInput, normalize};

pub const SERVICE_NAME: &str = "mail-graph-mcp";

const EMPTY_BODY: &str = "No content provided.";

/// Build the `/health` and `/api/*` routes
pub fn router<T>(mail: Arc<MailService<T>>) -> Router
where
    T: MailTransport + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route("/api/send-email", post(send_email::<T>))
        .route("/api/fetch-emails", get(fetch_emails::<T>))
        .route("/api/reply-email", post(reply_email::<T>))
        .route("/api/delete-email", delete(delete_email::<T>))
        .route("/api/forward-email", post(forward_email::<T>))
        .with_state(mail)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": SERVICE_NAME }))
}

#[derive(Debug, Deserialize)]
struct SendEmailRequest {
    recipient: Option<RecipientInput>,
    subject: Option<String>,
    body: Option<String>,
    message: Option<String>,
    #[serde(default)]
    content_type: ContentType,
    cc: Option<RecipientInput>,
    bcc: Option<RecipientInput>,
    #[serde(default)]
    send_individual: bool,
}

#[derive(Debug, Deserialize)]
struct ForwardEmailRequest {
    email_id: Option<String>,
    recipient: Option<RecipientInput>,
    cc: Option<RecipientInput>,
    bcc: Option<RecipientInput>,
    #[serde(default)]
    additional_message: String,
    content_type: Option<ContentType>,
    #[serde(default)]
    send_individual: bool,
}

#[derive(Debug, Deserialize)]
struct ReplyEmailRequest {
    email_id: Option<String>,
    reply_message: Option<String>,
    #[serde(default)]
    content_type: ContentType,
}

#[derive(Debug, Deserialize)]
struct DeleteEmailRequest {
    email_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FetchEmailsParams {
    folder: Option<String>,
    is_read: Option<String>,
    sender: Option<String>,
    email_id: Option<String>,
    subject: Option<String>,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// A recipient field that normalizes to at least one entry
fn present_recipients(value: Option<RecipientInput>) -> Option<RecipientInput> {
    value.filter(|input| !normalize(Some(input)).is_empty())
}

async fn send_email<T: MailTransport + 'static>(
    State(mail): State<Arc<MailService<T>>>,
    request: Result<Json<SendEmailRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(request) = request?;
    let (Some(recipient), Some(subject)) =
        (present_recipients(request.recipient), present(request.subject))
    else {
        return Err(AppError::invalid("Missing required fields: 'recipient' and 'subject'"));
    };
    let body = present(request.body)
        .or_else(|| present(request.message))
        .unwrap_or_else(|| EMPTY_BODY.to_owned());

    let result = mail
        .send(&SendEmailInput {
            recipient,
            subject,
            body,
            content_type: request.content_type,
            cc: request.cc,
            bcc: request.bcc,
            send_individual: request.send_individual,
        })
        .await?;
    let status = if result.is_rejected() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    Ok((status, Json(result)).into_response())
}

async fn forward_email<T: MailTransport + 'static>(
    State(mail): State<Arc<MailService<T>>>,
    request: Result<Json<ForwardEmailRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(request) = request?;
    let (Some(email_id), Some(recipient)) =
        (present(request.email_id), present_recipients(request.recipient))
    else {
        return Err(AppError::invalid("Missing required fields: email_id and recipient"));
    };

    let result = mail
        .forward(&ForwardEmailInput {
            email_id,
            recipient,
            cc: request.cc,
            bcc: request.bcc,
            additional_message: request.additional_message,
            content_type: request.content_type,
            send_individual: request.send_individual,
        })
        .await?;
    let status = if result.is_rejected() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    Ok((status, Json(result)).into_response())
}

async fn reply_email<T: MailTransport + 'static>(
    State(mail): State<Arc<MailService<T>>>,
    request: Result<Json<ReplyEmailRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(request) = request?;
    let (Some(email_id), Some(reply_message)) =
        (present(request.email_id), present(request.reply_message))
    else {
        return Err(AppError::invalid("Missing required fields: email_id and reply_message"));
    };
    let outcome = mail
        .reply(&ReplyEmailInput {
            email_id,
            reply_message,
            content_type: request.content_type,
        })
        .await?;
    Ok(Json(outcome).into_response())
}

async fn delete_email<T: MailTransport + 'static>(
    State(mail): State<Arc<MailService<T>>>,
    request: Result<Json<DeleteEmailRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(request) = request?;
    let Some(email_id) = present(request.email_id) else {
        return Err(AppError::invalid("Missing required field: email_id"));
    };
    let outcome = mail.delete(&DeleteEmailInput { email_id }).await?;
    Ok(Json(outcome).into_response())
}

async fn fetch_emails<T: MailTransport + 'static>(
    State(mail): State<Arc<MailService<T>>>,
    params: Result<Query<FetchEmailsParams>, QueryRejection>,
) -> AppResult<Response> {
    let Query(params) = params?;
    let is_read = match present(params.is_read) {
        Some(raw) => Some(parse_bool_value(&raw).ok_or_else(|| {
            AppError::InvalidInput(format!("is_read must be a boolean, got '{raw}'"))
        })?),
        None => None,
    };
    let query = FetchQuery {
        folder: present(params.folder).unwrap_or_else(|| DEFAULT_FOLDER.to_owned()),
        is_read,
        sender: present(params.sender),
        email_id: present(params.email_id),
        subject: present(params.subject),
    };
    let result = mail.fetch(&query).await?;
    Ok(Json(result).into_response())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::router;
    use crate::auth::MemoryTokenCache;
    use crate::graph::Operation;
    use crate::mailer::MailService;
    use crate::testing::{RecordingTransport, to_addresses};

    fn app(transport: RecordingTransport) -> (Router, Arc<MailService<RecordingTransport>>) {
        let mail = Arc::new(MailService::new(
            transport,
            Arc::new(MemoryTokenCache::with_token("tok")),
            4,
        ));
        (router(Arc::clone(&mail)), mail)
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request builds")
    }

    async fn read_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body readable");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn health_reports_service_name() {
        let (app, _) = app(RecordingTransport::new());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            read_json(response).await,
            json!({ "status": "ok", "service": "mail-graph-mcp" })
        );
    }

    #[tokio::test]
    async fn send_falls_back_to_message_field() {
        let (app, mail) = app(RecordingTransport::new());
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/send-email",
                json!({ "recipient": "a@x.com", "subject": "Hi", "message": "from message" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["status"], "complete");

        let calls = mail_calls(&mail);
        assert_eq!(calls.len(), 1);
        let body = calls[0].body.as_ref().expect("send body");
        assert_eq!(body["message"]["body"]["content"], "from message");
        assert_eq!(to_addresses(&calls[0]), ["a@x.com"]);
    }

    #[tokio::test]
    async fn send_without_body_uses_placeholder() {
        let (app, mail) = app(RecordingTransport::new());
        app.oneshot(json_request(
            "POST",
            "/api/send-email",
            json!({ "recipient": ["a@x.com"], "subject": "Hi" }),
        ))
        .await
        .expect("response");
        let calls = mail_calls(&mail);
        let body = calls[0].body.as_ref().expect("send body");
        assert_eq!(body["message"]["body"]["content"], "No content provided.");
    }

    #[tokio::test]
    async fn send_missing_subject_is_bad_request() {
        let (app, mail) = app(RecordingTransport::new());
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/send-email",
                json!({ "recipient": "a@x.com" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await["status"], "error");
        assert!(mail_calls(&mail).is_empty());
    }

    #[tokio::test]
    async fn malformed_json_body_is_json_error() {
        let (app, mail) = app(RecordingTransport::new());
        let request = Request::builder()
            .method("POST")
            .uri("/api/send-email")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("not json"))
            .expect("request builds");
        let response = app.oneshot(request).await.expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(read_json(response).await["status"], "error");
        assert!(mail_calls(&mail).is_empty());
    }

    #[tokio::test]
    async fn recipient_of_wrong_type_is_json_error() {
        let (app, mail) = app(RecordingTransport::new());
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/send-email",
                json!({ "recipient": 42, "subject": "x" }),
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().is_some_and(|m| m.starts_with("invalid input")));
        assert!(mail_calls(&mail).is_empty());
    }

    #[tokio::test]
    async fn malformed_query_is_json_error() {
        let (app, _) = app(RecordingTransport::new());
        let response = app
            .oneshot(
                Request::get("/api/fetch-emails?folder=a&folder=b")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await["status"], "error");
    }

    #[tokio::test]
    async fn invalid_address_is_bad_request_with_result_body() {
        let (app, mail) = app(RecordingTransport::new());
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/forward-email",
                json!({ "email_id": "m1", "recipient": "a@x.com", "cc": "oops" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            read_json(response).await,
            json!({
                "status": "error",
                "message": "Invalid email address(es): oops",
                "invalid_addresses": ["oops"]
            })
        );
        assert!(mail_calls(&mail).is_empty());
    }

    #[tokio::test]
    async fn delete_route_uses_json_body() {
        let (app, mail) = app(RecordingTransport::new());
        let response = app
            .oneshot(json_request(
                "DELETE",
                "/api/delete-email",
                json!({ "email_id": "m1" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["status"], "success");
        assert_eq!(
            mail_calls(&mail)[0].operation,
            Operation::Delete {
                message_id: "m1".to_owned()
            }
        );
    }

    #[tokio::test]
    async fn reply_requires_message() {
        let (app, _) = app(RecordingTransport::new());
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/reply-email",
                json!({ "email_id": "m1" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn fetch_parses_query_parameters() {
        let (app, mail) = app(RecordingTransport::new().responding(json!({ "value": [] })));
        let response = app
            .oneshot(
                Request::get("/api/fetch-emails?is_read=false&sender=boss%40x.com")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let calls = mail_calls(&mail);
        assert_eq!(
            calls[0].operation,
            Operation::ListMessages {
                folder: "inbox".to_owned()
            }
        );
        assert!(calls[0].query.contains(&(
            "$filter".to_owned(),
            "isRead eq false and from/emailAddress/address eq 'boss@x.com'".to_owned()
        )));
    }

    #[tokio::test]
    async fn fetch_rejects_unparseable_is_read() {
        let (app, _) = app(RecordingTransport::new());
        let response = app
            .oneshot(
                Request::get("/api/fetch-emails?is_read=maybe")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    fn mail_calls(mail: &MailService<RecordingTransport>) -> Vec<crate::graph::UpstreamRequest> {
        mail.transport().calls()
    }
}
