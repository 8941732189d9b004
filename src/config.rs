//! Configuration module for the Graph mail server
//!
//! All configuration is loaded from environment variables following the pattern
//! `MAIL_GRAPH_<KEY>`. A `.env` file in the working directory is honored by
//! `main` before this module runs.

use std::env;
use std::env::VarError;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::errors::{AppError, AppResult};

/// Default Microsoft Graph endpoint
const DEFAULT_API_URL: &str = "https://graph.microsoft.com/v1.0";
/// Default OAuth authority host
const DEFAULT_AUTHORITY_URL: &str = "https://login.microsoftonline.com";

/// OAuth application settings for the device-code flow
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// Authority host, without tenant (e.g. `https://login.microsoftonline.com`)
    pub authority_url: String,
    /// Tenant segment (`common`, `organizations`, or a tenant GUID)
    pub tenant_id: String,
    /// Application (client) ID; login is unavailable without it
    pub client_id: Option<String>,
    /// Requested scopes
    pub scopes: Vec<String>,
}

impl OAuthConfig {
    /// Tenant-scoped OAuth 2.0 v2 endpoint base
    pub fn endpoint_base(&self) -> String {
        format!("{}/{}/oauth2/v2.0", self.authority_url, self.tenant_id)
    }
}

/// Server-wide configuration
///
/// Shared by the MCP server and the HTTP API. Built once in `main` and passed
/// explicitly to every component that needs it.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Graph REST base URL, without trailing slash
    pub api_url: String,
    /// OAuth settings used by `login`
    pub oauth: OAuthConfig,
    /// Location of the cached access token
    pub token_cache_path: PathBuf,
    /// Per-call upstream timeout in milliseconds
    pub http_timeout_ms: u64,
    /// Maximum in-flight calls during an individual-mode fan-out
    pub fanout_concurrency: usize,
    /// Bind address of the HTTP front end
    pub http_bind: SocketAddr,
}

impl ServerConfig {
    /// Load all configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if a variable is set but malformed.
    ///
    /// # Example Environment
    ///
    /// ```text
    /// MAIL_GRAPH_CLIENT_ID=00000000-0000-0000-0000-000000000000
    /// MAIL_GRAPH_TENANT_ID=common
    /// MAIL_GRAPH_SCOPES="Mail.ReadWrite Mail.Send"
    /// MAIL_GRAPH_FANOUT_CONCURRENCY=4
    /// ```
    pub fn load_from_env() -> AppResult<Self> {
        let fanout_concurrency = parse_usize_env("MAIL_GRAPH_FANOUT_CONCURRENCY", 4)?;
        if fanout_concurrency == 0 {
            return Err(AppError::invalid("MAIL_GRAPH_FANOUT_CONCURRENCY must be at least 1"));
        }

        Ok(Self {
            api_url: normalize_base_url(&string_env("MAIL_GRAPH_API_URL", DEFAULT_API_URL)?)?,
            oauth: OAuthConfig {
                authority_url: normalize_base_url(&string_env(
                    "MAIL_GRAPH_AUTHORITY_URL",
                    DEFAULT_AUTHORITY_URL,
                )?)?,
                tenant_id: string_env("MAIL_GRAPH_TENANT_ID", "common")?,
                client_id: optional_env("MAIL_GRAPH_CLIENT_ID")?,
                scopes: parse_scopes(&string_env(
                    "MAIL_GRAPH_SCOPES",
                    "Mail.ReadWrite Mail.Send",
                )?),
            },
            token_cache_path: PathBuf::from(string_env(
                "MAIL_GRAPH_TOKEN_CACHE_PATH",
                ".token.json",
            )?),
            http_timeout_ms: parse_u64_env("MAIL_GRAPH_HTTP_TIMEOUT_MS", 30_000)?,
            fanout_concurrency,
            http_bind: parse_socket_addr_env("MAIL_GRAPH_HTTP_BIND", "127.0.0.1:8000")?,
        })
    }
}

/// Trim whitespace and trailing slashes; reject empty URLs
fn normalize_base_url(raw: &str) -> AppResult<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(AppError::invalid("base URL must not be empty"));
    }
    Ok(trimmed.to_owned())
}

fn parse_scopes(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_owned).collect()
}

/// Read an optional environment variable; blank values count as unset
fn optional_env(key: &str) -> AppResult<Option<String>> {
    match env::var(key) {
        Ok(v) if v.trim().is_empty() => Ok(None),
        Ok(v) => Ok(Some(v.trim().to_owned())),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(AppError::InvalidInput(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

fn string_env(key: &str, default: &str) -> AppResult<String> {
    Ok(optional_env(key)?.unwrap_or_else(|| default.to_owned()))
}

/// Parse a `u64` environment variable with default fallback
///
/// # Errors
///
/// Returns `InvalidInput` if the variable is set but not a valid `u64`.
fn parse_u64_env(key: &str, default: u64) -> AppResult<u64> {
    match env::var(key) {
        Ok(v) => v.trim().parse::<u64>().map_err(|_| {
            AppError::InvalidInput(format!("invalid u64 environment variable {key}: '{v}'"))
        }),
        Err(VarError::NotPresent) => Ok(default),
        Err(VarError::NotUnicode(_)) => Err(AppError::InvalidInput(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

/// Parse a `usize` environment variable with default fallback
fn parse_usize_env(key: &str, default: usize) -> AppResult<usize> {
    match env::var(key) {
        Ok(v) => v.trim().parse::<usize>().map_err(|_| {
            AppError::InvalidInput(format!("invalid usize environment variable {key}: '{v}'"))
        }),
        Err(VarError::NotPresent) => Ok(default),
        Err(VarError::NotUnicode(_)) => Err(AppError::InvalidInput(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

fn parse_socket_addr_env(key: &str, default: &str) -> AppResult<SocketAddr> {
    let raw = string_env(key, default)?;
    raw.parse::<SocketAddr>().map_err(|_| {
        AppError::InvalidInput(format!("invalid socket address in {key}: '{raw}'"))
    })
}

/// Parse a boolean value with flexible spellings
///
/// Accepts: `1`, `true`, `yes`, `y`, `on` (truthy) or `0`, `false`, `no`,
/// `n`, `off` (falsy). Case-insensitive. Used for the `is_read` query
/// parameter of the HTTP API.
pub fn parse_bool_value(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}
