use anyhow::Result;
use clap::Parser;
use rmcp::transport::sse_server::SseServer;
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use rmcp::{ServiceExt, transport::stdio};

mod cache;
mod cli;
mod config;
mod discovery;
mod dispatch;
mod logging;
mod prompts;
mod runner;
mod schema;
mod service;

use cli::Cli;
use service::GlabService;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load_config(&cli).await?;

    tracing::info!("Starting glab-mcp server");

    match cli.transport.as_str() {
        "stdio" => {
            tracing::info!("Starting glab-mcp with stdio transport");
            let service = GlabService::new(&config);
            service.preflight().await?;
            let running = service.serve(stdio()).await.inspect_err(|e| {
                tracing::error!("Serving error: {:?}", e);
            })?;
            running.waiting().await?;
        }
        "sse" => {
            tracing::info!(
                "Starting glab-mcp with SSE transport at {}",
                cli.bind_address
            );
            let service = GlabService::new(&config);
            service.preflight().await?;
            let ct = SseServer::serve(cli.bind_address.parse()?)
                .await?
                .with_service(move || service.clone());

            tokio::signal::ctrl_c().await?;
            ct.cancel();
        }
        "streamable-http" => {
            let bind_address = cli.bind_address.clone();
            tracing::info!(
                "Starting glab-mcp with streamable-http transport at {}/mcp",
                bind_address
            );

            let shared = GlabService::new(&config);
            shared.preflight().await?;
            let service = StreamableHttpService::new(
                move || Ok(shared.clone()),
                LocalSessionManager::default().into(),
                Default::default(),
            );

            let router = axum::Router::new().nest_service("/mcp", service);

            let _ = axum::serve(tokio::net::TcpListener::bind(bind_address).await?, router)
                .with_graceful_shutdown(async {
                    tokio::signal::ctrl_c().await.unwrap();
                    tracing::info!("Received Ctrl+C, shutting down glab-mcp server...");
                    // Give the log a moment to flush
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    std::process::exit(0);
                })
                .await;
        }
        _ => unreachable!(),
    }

    Ok(())
}
