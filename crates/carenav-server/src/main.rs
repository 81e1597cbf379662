mod config;
mod error;
mod history;
mod rate_limit;
mod server;

use std::net::SocketAddr;
use std::sync::Arc;

use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use rmcp::{ServiceExt, transport::stdio};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use carenav_common::guidance::GuidancePolicy;
use carenav_common::llm::{LlmClient, LlmClientConfig};

use config::Config;
use history::ReportHistory;
use rate_limit::RateLimiter;
use server::CareNavServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries MCP JSON-RPC in stdio mode
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting carenav MCP server");

    let config = Config::from_env()?;
    info!(
        redis = config.redis_url.is_some(),
        http_addr = ?config.http_addr,
        guidance_deadline_ms = config.guidance_deadline.as_millis(),
        rate_limit_rps = ?config.rate_limit_rps,
        "configuration loaded"
    );

    let llm_config = LlmClientConfig::from_env()?;
    info!(
        base_url = %llm_config.base_url,
        model = %llm_config.model,
        timeout_ms = llm_config.request_timeout.as_millis(),
        "guidance client configured"
    );
    if llm_config.api_key.is_none() {
        warn!("no CARENAV_LLM_API_KEY or GEMINI_API_KEY set, guidance will use fallback results");
    }
    let llm = Arc::new(LlmClient::new(llm_config)?);
    let policy = GuidancePolicy::new(llm).with_deadline(config.guidance_deadline);

    let history = ReportHistory::connect(config.redis_url.as_deref()).await;
    info!(persistent = history.is_persistent().await, "report history ready");
    let limiter = config.rate_limit_rps.and_then(RateLimiter::new);

    let server = CareNavServer::new(policy, history, limiter);

    match config.http_addr {
        Some(addr) => serve_http(server, addr).await,
        None => serve_stdio(server).await,
    }
}

async fn serve_stdio(server: CareNavServer) -> anyhow::Result<()> {
    info!("MCP server ready, serving on stdio");
    let service = server.serve(stdio()).await.inspect_err(|e| {
        tracing::error!(error = %e, "MCP server error");
    })?;

    service.waiting().await?;
    info!("MCP server shut down");
    Ok(())
}

async fn serve_http(server: CareNavServer, addr: SocketAddr) -> anyhow::Result<()> {
    let service = StreamableHttpService::new(
        move || Ok(server.clone()),
        LocalSessionManager::default().into(),
        Default::default(),
    );
    let router = axum::Router::new().nest_service("/mcp", service);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(%addr, "MCP server ready, serving streamable HTTP at /mcp");
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;
    info!("MCP server shut down");
    Ok(())
}
