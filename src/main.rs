//! # Vault Gateway
//!
//! Entrypoint for the HTTP gateway: load configuration from the
//! environment, build the transport and accessor, start the background
//! token-renewal timer, and serve the REST boundary until SIGINT/SIGTERM.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use vault_gateway::config::GatewayConfig;
use vault_gateway::kv::{SecretStore, VaultKv};
use vault_gateway::metrics;
use vault_gateway::server::{serve, AppState};
use vault_gateway::transport::VaultTransport;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vault_gateway=info".into()),
        )
        .init();

    info!(
        "Starting vault-gateway {} ({}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_GIT_HASH"),
        env!("BUILD_DATETIME")
    );

    metrics::register_metrics()?;

    let config = GatewayConfig::from_env().context("failed to load gateway configuration")?;
    let transport =
        Arc::new(VaultTransport::new(&config).context("failed to initialize vault transport")?);

    // Optional ahead-of-expiry renewal; aborted on shutdown. Requests also
    // renew inline, so the gateway stays correct without the timer.
    let renewal = transport.spawn_renewal_timer();

    let store: Arc<dyn SecretStore> =
        Arc::new(VaultKv::new(Arc::clone(&transport), config.mount.clone()));
    let state = Arc::new(AppState {
        store,
        config: config.redacted(),
    });

    serve(config.listen_port, state, shutdown_signal()).await?;

    renewal.abort();
    info!("Gateway stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => error!("failed to install SIGTERM handler: {err}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
