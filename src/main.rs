//! mail-graph-mcp-rs: Microsoft Graph mail over MCP and HTTP
//!
//! This server sends, forwards, replies to, deletes and fetches mail through
//! the Microsoft Graph REST API. It speaks the Model Context Protocol (MCP)
//! over stdio, or over streamable HTTP alongside a plain JSON API.
//!
//! # Architecture
//!
//! - [`main`]: Process entry point with CLI, env loading and transport selection
//! - [`config`]: Environment-driven configuration
//! - [`errors`]: Application error model with MCP and HTTP error mapping
//! - [`recipients`]: Recipient normalization and address validation
//! - [`payload`]: Upstream request bodies for send, reply and forward
//! - [`delivery`]: Group and individual fan-out with per-recipient outcomes
//! - [`graph`]: Graph REST transport with uniform upstream errors
//! - [`auth`]: Device-code login and bearer token cache
//! - [`fetch`]: Message listing filters and response shaping
//! - [`mailer`]: Mail operations shared by both front ends
//! - [`server`]: MCP tool handlers
//! - [`http_api`]: Plain HTTP routes
//! - [`models`]: Input/output DTOs and schema-bearing types

mod auth;
mod config;
mod delivery;
mod errors;
mod fetch;
mod graph;
mod http_api;
mod mailer;
mod models;
mod payload;
mod recipients;
mod server;
#[cfg(test)]
mod testing;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use auth::{Authenticator, DeviceCodeFlow, FileTokenCache, LoginPrompt, TokenCache};
use clap::{Parser, Subcommand, ValueEnum};
use config::ServerConfig;
use graph::GraphClient;
use mailer::MailService;
use rmcp::ServiceExt;
use rmcp::transport::stdio;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};
use server::MailGraphServer;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn std::error::Error>;

#[derive(Parser, Debug)]
#[command(
    name = "mail-graph-mcp-rs",
    version,
    about = "Microsoft Graph mail MCP server and HTTP API"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Serve MCP tools (default: stdio)
    Serve {
        #[arg(long, value_enum, default_value_t = Transport::Stdio)]
        transport: Transport,
        /// Overrides MAIL_GRAPH_HTTP_BIND in http mode
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Sign in with a device code and cache the access token
    Login,
    /// Remove the cached access token
    Logout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    Stdio,
    Http,
}

impl Default for Command {
    fn default() -> Self {
        Self::Serve {
            transport: Transport::Stdio,
            bind: None,
        }
    }
}

/// Application entry point
///
/// Initializes tracing from environment, loads config, and runs the selected
/// command. With no command the MCP server is served over stdio, which is
/// what MCP clients expect when they spawn the process.
///
/// # Environment Variables
///
/// See [`ServerConfig::load_from_env`] for full configuration options.
///
/// # Example
///
/// ```no_run
/// MAIL_GRAPH_CLIENT_ID=00000000-0000-0000-0000-000000000000 cargo run -- login
/// cargo run -- serve --transport http --bind 127.0.0.1:8000
/// ```
#[tokio::main]
async fn main() -> Result<(), BoxError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::load_from_env()?;
    let tokens: Arc<dyn TokenCache> =
        Arc::new(FileTokenCache::new(config.token_cache_path.clone()));
    let oauth_http = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.http_timeout_ms))
        .build()?;
    let auth = Arc::new(Authenticator::new(
        DeviceCodeFlow::new(oauth_http, config.oauth.clone()),
        Arc::clone(&tokens),
    ));

    match cli.command.unwrap_or_default() {
        Command::Login => {
            let challenge = auth.start_login().await?;
            println!("{}", LoginPrompt::from(&challenge).message);
            auth.complete_login(&challenge).await?;
            println!("Signed in; access token cached at {}", config.token_cache_path.display());
        }
        Command::Logout => {
            if auth.logout()? {
                println!("Cached access token removed");
            } else {
                println!("No cached access token");
            }
        }
        Command::Serve { transport, bind } => {
            if !auth.has_cached_token() {
                warn!(
                    path = %config.token_cache_path.display(),
                    "no cached access token; mail tools will fail until login completes"
                );
            }
            let mail = Arc::new(MailService::new(
                GraphClient::new(&config)?,
                tokens,
                config.fanout_concurrency,
            ));
            let server = MailGraphServer::new(Arc::clone(&mail), auth);
            match transport {
                Transport::Stdio => {
                    let service = server.serve(stdio()).await?;
                    service.waiting().await?;
                }
                Transport::Http => {
                    serve_http(server, mail, bind.unwrap_or(config.http_bind)).await?;
                }
            }
        }
    }
    Ok(())
}

/// Serve the JSON API and MCP-over-HTTP until Ctrl-C
async fn serve_http(
    server: MailGraphServer,
    mail: Arc<MailService>,
    bind: SocketAddr,
) -> Result<(), BoxError> {
    let shutdown = CancellationToken::new();
    let mcp = StreamableHttpService::new(
        move || Ok(server.clone()),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig::default(),
    );
    let app = http_api::router(mail).nest_service("/mcp", mcp);

    let listener = TcpListener::bind(bind).await?;
    info!(%bind, "HTTP API listening; MCP mounted at /mcp");

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown requested"),
            Err(e) => warn!(error = %e, "cannot listen for Ctrl-C; shutting down"),
        }
        trigger.cancel();
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}
