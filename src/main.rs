use tracing::info;

use plugin_adapter::{
    app::{build_router, AppState},
    config::Config,
    provider,
    server::Server,
    telemetry,
};

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::from_env()?;
    telemetry::init(&cfg.logging())?;

    info!("Provider     : {:?}", cfg.provider);
    info!("Domain filter: {}", cfg.domain_filter());
    info!("Dry run      : {}", cfg.dry_run);
    info!("Owner ID     : {}", cfg.txt_owner_id);

    let provider = provider::from_config(&cfg)?;
    let app = build_router(AppState::new(provider));

    let server = Server::bind(&cfg.server()?, app).await?;
    info!("Listening on {}", server.local_addr()?);
    server.run(shutdown_signal()).await?;

    info!("shut down cleanly");
    Ok(())
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
