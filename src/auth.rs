//! Bearer token acquisition and caching
//!
//! Tokens come from the OAuth 2.0 device-code flow and are cached as
//! `{"access_token": "..."}` JSON on disk. Mail operations only ever read the
//! cache through [`auth_headers`]; they never start a login themselves.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use schemars::JsonSchema;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::config::OAuthConfig;
use crate::errors::{AppError, AppResult};

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
/// Extra wait requested by the authority on `slow_down`
const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

/// Credentials attached to every upstream call of one operation
#[derive(Debug)]
pub struct AuthHeaders {
    token: SecretString,
}

impl AuthHeaders {
    pub fn new(token: SecretString) -> Self {
        Self { token }
    }

    pub fn token(&self) -> &SecretString {
        &self.token
    }
}

/// Storage for the current access token
///
/// Last writer wins; no locking contract beyond what an implementation
/// provides internally.
pub trait TokenCache: Send + Sync {
    fn load(&self) -> Option<SecretString>;
    fn store(&self, token: &SecretString) -> AppResult<()>;
    /// Remove the token; returns whether one was present
    fn clear(&self) -> AppResult<bool>;
}

/// Resolve auth headers for one top-level operation
///
/// # Errors
///
/// Returns `AuthFailed` when no token is cached.
pub fn auth_headers(cache: &dyn TokenCache) -> AppResult<AuthHeaders> {
    cache.load().map(AuthHeaders::new).ok_or_else(|| {
        AppError::AuthFailed(
            "no cached access token; run the login tool or the `login` command".to_owned(),
        )
    })
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedToken {
    access_token: String,
}

/// JSON file token cache
#[derive(Debug, Clone)]
pub struct FileTokenCache {
    path: PathBuf,
}

impl FileTokenCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TokenCache for FileTokenCache {
    fn load(&self) -> Option<SecretString> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read token cache");
                return None;
            }
        };
        match serde_json::from_str::<CachedToken>(&raw) {
            Ok(cached) if !cached.access_token.is_empty() => {
                Some(SecretString::from(cached.access_token))
            }
            Ok(_) => None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "token cache is not valid JSON");
                None
            }
        }
    }

    fn store(&self, token: &SecretString) -> AppResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::Internal(format!("cannot create token cache directory: {e}"))
            })?;
        }
        let payload = serde_json::to_string(&CachedToken {
            access_token: token.expose_secret().to_owned(),
        })
        .map_err(|e| AppError::Internal(format!("cannot encode token cache: {e}")))?;
        write_private(&self.path, payload.as_bytes())
            .map_err(|e| AppError::Internal(format!("cannot write token cache: {e}")))
    }

    fn clear(&self) -> AppResult<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AppError::Internal(format!("cannot remove token cache: {e}"))),
        }
    }
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    fs::write(path, contents)
}

/// Authority response to a device-code request
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCodeChallenge {
    device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub expires_in: u64,
    #[serde(default = "default_poll_interval")]
    pub interval: u64,
    #[serde(default)]
    pub message: String,
}

fn default_poll_interval() -> u64 {
    5
}

/// What the user needs to finish a login
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LoginPrompt {
    pub verification_uri: String,
    pub user_code: String,
    pub expires_in_seconds: u64,
    pub message: String,
}

impl From<&DeviceCodeChallenge> for LoginPrompt {
    fn from(challenge: &DeviceCodeChallenge) -> Self {
        let message = if challenge.message.is_empty() {
            format!(
                "To sign in, open {} and enter the code {}",
                challenge.verification_uri, challenge.user_code
            )
        } else {
            challenge.message.clone()
        };
        Self {
            verification_uri: challenge.verification_uri.clone(),
            user_code: challenge.user_code.clone(),
            expires_in_seconds: challenge.expires_in,
            message,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// OAuth 2.0 device authorization grant
#[derive(Debug, Clone)]
pub struct DeviceCodeFlow {
    http: Client,
    oauth: OAuthConfig,
}

impl DeviceCodeFlow {
    pub fn new(http: Client, oauth: OAuthConfig) -> Self {
        Self { http, oauth }
    }

    fn client_id(&self) -> AppResult<&str> {
        self.oauth.client_id.as_deref().ok_or_else(|| {
            AppError::invalid("login requires MAIL_GRAPH_CLIENT_ID to be set")
        })
    }

    /// Request a device code and user code
    pub async fn start(&self) -> AppResult<DeviceCodeChallenge> {
        let client_id = self.client_id()?;
        let url = format!("{}/devicecode", self.oauth.endpoint_base());
        let scope = self.oauth.scopes.join(" ");
        let response = self
            .http
            .post(&url)
            .form(&[("client_id", client_id), ("scope", scope.as_str())])
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("device code request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AppError::Upstream(format!("device code response unreadable: {e}")))?;
        if !status.is_success() {
            return Err(AppError::AuthFailed(format!(
                "failed to start device flow (HTTP {}): {text}",
                status.as_u16()
            )));
        }
        serde_json::from_str(&text)
            .map_err(|e| AppError::Upstream(format!("device code response malformed: {e}")))
    }

    /// Poll the token endpoint until the user completes or the code expires
    pub async fn poll(&self, challenge: &DeviceCodeChallenge) -> AppResult<SecretString> {
        let client_id = self.client_id()?;
        let url = format!("{}/token", self.oauth.endpoint_base());
        let deadline = Instant::now() + Duration::from_secs(challenge.expires_in);
        let mut interval = Duration::from_secs(challenge.interval);

        loop {
            if Instant::now() >= deadline {
                return Err(AppError::Timeout(
                    "device code expired before sign-in completed".to_owned(),
                ));
            }

            let response = self
                .http
                .post(&url)
                .form(&[
                    ("grant_type", DEVICE_CODE_GRANT),
                    ("client_id", client_id),
                    ("device_code", challenge.device_code.as_str()),
                ])
                .send()
                .await
                .map_err(|e| AppError::Upstream(format!("token request failed: {e}")))?;
            let body: TokenResponse = response
                .json()
                .await
                .map_err(|e| AppError::Upstream(format!("token response malformed: {e}")))?;

            if let Some(token) = body.access_token.filter(|t| !t.is_empty()) {
                return Ok(SecretString::from(token));
            }

            match body.error.as_deref() {
                Some("authorization_pending") => debug!("device sign-in still pending"),
                Some("slow_down") => interval += SLOW_DOWN_STEP,
                Some(code) => {
                    return Err(AppError::AuthFailed(
                        body.error_description.unwrap_or_else(|| code.to_owned()),
                    ));
                }
                None => {
                    return Err(AppError::Upstream(
                        "token response carried neither a token nor an error".to_owned(),
                    ));
                }
            }
            sleep(interval).await;
        }
    }
}

/// Login and logout on top of a token cache
pub struct Authenticator {
    flow: DeviceCodeFlow,
    cache: Arc<dyn TokenCache>,
}

impl Authenticator {
    pub fn new(flow: DeviceCodeFlow, cache: Arc<dyn TokenCache>) -> Self {
        Self { flow, cache }
    }

    pub async fn start_login(&self) -> AppResult<DeviceCodeChallenge> {
        self.flow.start().await
    }

    /// Wait for the user to finish signing in and cache the token
    pub async fn complete_login(&self, challenge: &DeviceCodeChallenge) -> AppResult<()> {
        let token = self.flow.poll(challenge).await?;
        self.cache.store(&token)?;
        info!("device sign-in completed; access token cached");
        Ok(())
    }

    pub fn logout(&self) -> AppResult<bool> {
        self.cache.clear()
    }

    pub fn has_cached_token(&self) -> bool {
        self.cache.load().is_some()
    }
}

/// In-memory cache for tests
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryTokenCache {
    token: std::sync::Mutex<Option<String>>,
}

#[cfg(test)]
impl MemoryTokenCache {
    pub fn with_token(token: &str) -> Self {
        Self {
            token: std::sync::Mutex::new(Some(token.to_owned())),
        }
    }
}

#[cfg(test)]
impl TokenCache for MemoryTokenCache {
    fn load(&self) -> Option<SecretString> {
        self.token
            .lock()
            .expect("token lock")
            .clone()
            .map(SecretString::from)
    }

    fn store(&self, token: &SecretString) -> AppResult<()> {
        *self.token.lock().expect("token lock") = Some(token.expose_secret().to_owned());
        Ok(())
    }

    fn clear(&self) -> AppResult<bool> {
        Ok(self.token.lock().expect("token lock").take().is_some())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use secrecy::{ExposeSecret, SecretString};
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{
        Authenticator, DeviceCodeFlow, FileTokenCache, LoginPrompt, MemoryTokenCache,
        TokenCache, auth_headers,
    };
    use crate::config::OAuthConfig;
    use crate::errors::AppError;

    fn oauth_for(server: &MockServer, client_id: Option<&str>) -> OAuthConfig {
        OAuthConfig {
            authority_url: server.uri(),
            tenant_id: "common".to_owned(),
            client_id: client_id.map(str::to_owned),
            scopes: vec!["Mail.Send".to_owned(), "Mail.ReadWrite".to_owned()],
        }
    }

    fn device_code_body() -> serde_json::Value {
        json!({
            "device_code": "dev-123",
            "user_code": "ABCD-EFGH",
            "verification_uri": "https://microsoft.com/devicelogin",
            "expires_in": 30,
            "interval": 0,
            "message": "Open the page and enter ABCD-EFGH"
        })
    }

    #[test]
    fn file_cache_round_trips_and_clears() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("token.json");
        let cache = FileTokenCache::new(&path);
        assert!(cache.load().is_none());

        cache
            .store(&SecretString::from("abc".to_owned()))
            .expect("store succeeds");
        let raw = std::fs::read_to_string(&path).expect("file written");
        assert_eq!(raw, r#"{"access_token":"abc"}"#);
        assert_eq!(cache.load().expect("token cached").expose_secret(), "abc");

        assert!(cache.clear().expect("clear succeeds"));
        assert!(!cache.clear().expect("second clear succeeds"));
        assert!(cache.load().is_none());
    }

    #[test]
    fn file_cache_ignores_malformed_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("token.json");
        std::fs::write(&path, "not json").expect("write");
        assert!(FileTokenCache::new(path).load().is_none());
    }

    #[test]
    fn auth_headers_require_a_cached_token() {
        let err = auth_headers(&MemoryTokenCache::default()).expect_err("must fail");
        assert!(matches!(err, AppError::AuthFailed(_)));

        let headers = auth_headers(&MemoryTokenCache::with_token("t0k")).expect("cached");
        assert_eq!(headers.token().expose_secret(), "t0k");
    }

    #[tokio::test]
    async fn login_requires_client_id() {
        let server = MockServer::start().await;
        let flow = DeviceCodeFlow::new(reqwest::Client::new(), oauth_for(&server, None));
        let err = flow.start().await.expect_err("must fail");
        assert!(err.to_string().contains("MAIL_GRAPH_CLIENT_ID"));
    }

    #[tokio::test]
    async fn device_flow_polls_until_token_and_caches_it() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/common/oauth2/v2.0/devicecode"))
            .and(body_string_contains("client_id=app-id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(device_code_body()))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/common/oauth2/v2.0/token"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({ "error": "authorization_pending" })),
            )
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/common/oauth2/v2.0/token"))
            .and(body_string_contains("device_code=dev-123"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "access_token": "fresh", "token_type": "Bearer" })),
            )
            .with_priority(2)
            .mount(&server)
            .await;

        let cache = Arc::new(MemoryTokenCache::default());
        let authenticator = Authenticator::new(
            DeviceCodeFlow::new(reqwest::Client::new(), oauth_for(&server, Some("app-id"))),
            cache.clone(),
        );

        let challenge = authenticator.start_login().await.expect("challenge");
        let prompt = LoginPrompt::from(&challenge);
        assert_eq!(prompt.user_code, "ABCD-EFGH");
        assert_eq!(prompt.message, "Open the page and enter ABCD-EFGH");

        authenticator
            .complete_login(&challenge)
            .await
            .expect("login completes");
        assert_eq!(cache.load().expect("stored").expose_secret(), "fresh");
        assert!(authenticator.logout().expect("logout"));
        assert!(!authenticator.has_cached_token());
    }

    #[tokio::test]
    async fn device_flow_surfaces_declined_sign_in() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/common/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "authorization_declined",
                "error_description": "the user declined"
            })))
            .mount(&server)
            .await;

        let flow = DeviceCodeFlow::new(reqwest::Client::new(), oauth_for(&server, Some("app-id")));
        let challenge = serde_json::from_value(device_code_body()).expect("challenge");
        let err = flow.poll(&challenge).await.expect_err("must fail");
        assert!(matches!(err, AppError::AuthFailed(msg) if msg == "the user declined"));
    }
}
