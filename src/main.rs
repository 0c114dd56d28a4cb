//! Paystack Webhook Router
//!
//! Multi-tenant payment webhook ingestion, recording, and forwarding service.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use paystack_router::handlers::{status_router, AppState};
use paystack_router::metrics;
use paystack_router::paystack::{
    webhook_router, Dispatcher, InMemoryAccountStore, InMemoryForwardLog,
    InMemoryTransactionStore, RouterConfig, WebhookState, WEBHOOK_PATH,
};

/// Paystack Webhook Router
#[derive(Parser, Debug)]
#[command(name = "pay-router")]
#[command(author = "Eleven One Labs <engineering@elevenone.app>")]
#[command(version)]
#[command(about = "Multi-tenant Paystack webhook ingestion and forwarding")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Host to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = if args.verbose { "debug" } else { "info" };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    metrics::init();

    // PAYSTACK_SECRET_KEY and FORWARD_URL must be set
    let config = RouterConfig::from_env()?;
    tracing::info!(
        forward_url = %config.forward_url,
        forward_tenant = %config.forward_tenant,
        primary_tenant = %config.primary_tenant,
        "Router configuration loaded"
    );

    let dispatcher = Arc::new(Dispatcher::new(
        config,
        Arc::new(InMemoryTransactionStore::new()),
        Arc::new(InMemoryAccountStore::new()),
        Arc::new(InMemoryForwardLog::new()),
    ));
    let app_state = Arc::new(AppState::new());

    let app = axum::Router::new()
        .merge(webhook_router(WebhookState::new(
            dispatcher,
            app_state.clone(),
        )))
        .merge(status_router(app_state))
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!("Paystack webhook router listening on {}", addr);
    tracing::info!("Webhook endpoint: POST {}{}", addr, WEBHOOK_PATH);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Completes when SIGTERM or Ctrl+C arrives, for Axum's graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
