// throne-proxy - Anthropic Messages API gateway for OpenAI-compatible backends
// Author: kelexine (https://github.com/kelexine)

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use throne_proxy::cli::Args;
use throne_proxy::config::AppConfig;
use throne_proxy::gateway::Gateway;
use throne_proxy::server::create_router;
use throne_proxy::utils::logging;
use tokio::signal;
use tracing::{error, info};

fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Phase 1: Load configuration, CLI flags on top
    let mut config = AppConfig::load(args.config.as_deref())?;
    args.apply(&mut config);

    // Phase 2: Initialize logging
    logging::init(&config.logging)?;
    info!("Starting throne-proxy v{}", env!("CARGO_PKG_VERSION"));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.workers.max(1))
        .enable_all()
        .build()?;

    runtime.block_on(run(args, config))
}

async fn run(args: Args, config: AppConfig) -> Result<()> {
    // Phase 3: Resolve the upstream and compile capability profiles
    let gateway = Gateway::from_app_config(&config)?;
    let routing = &gateway.config().routing;
    info!(
        "Upstream: {} at {} ({})",
        routing.provider, routing.base_url, routing.endpoint_kind
    );

    // Phase 3.5: Handle --check flag
    if args.check {
        return match gateway.upstream().check_connectivity().await {
            Ok(count) => {
                println!("✓ {} reachable, {} models listed", routing.base_url, count);
                Ok(())
            }
            Err(e) => {
                error!("Connectivity check failed: {}", e);
                Err(e.into())
            }
        };
    }

    // Phase 4: Build and start HTTP server
    let app = create_router(gateway, &config.performance);
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Phase 5: Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
