use anyhow::Context;
use dceassist::{api, config::Config, logging, processing::AnalysisPipeline, session::SessionStore};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("invalid configuration")?;
    logging::init_tracing();

    let pipeline = AnalysisPipeline::from_config(&config).context("failed to build LLM client")?;
    tracing::info!(
        model = %config.llm.model,
        url = %config.llm.url,
        chunk_size = pipeline.chunk_size(),
        "Analysis pipeline ready"
    );

    let uploads_root = config.uploads_root();
    std::fs::create_dir_all(&uploads_root)
        .with_context(|| format!("failed to create {}", uploads_root.display()))?;
    let sessions = Arc::new(SessionStore::new(uploads_root));
    let app = api::create_router(Arc::new(pipeline), Arc::clone(&sessions));

    let (listener, port) = bind_listener(config.server_port)
        .await
        .context("failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Err(err) = sessions.cleanup().await {
        tracing::warn!(error = %err, root = %sessions.root().display(), "Failed to clean uploads root");
    }
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

async fn bind_listener(server_port: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4100..=4199;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4100-4199",
    ))
}
