#![cfg_attr(test, allow(clippy::disallowed_methods))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
use std::net::SocketAddr;

use tokend::{
    config::{ServerConfig, TokenSourceConfig},
    server,
    source::AnySourceLoader,
    tokens::{TokenRegistry, TokenSnapshot},
    watcher::WatchHandle,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tokend=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment variables
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let (registry, watch) = match build_registry(&config, cancel.clone()).await {
        Ok(started) => started,
        Err(message) => {
            tracing::error!("{message}");
            std::process::exit(1);
        }
    };

    if registry.is_empty() {
        tracing::warn!("token registry is empty, every authenticated request will be rejected");
    }

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {e}");
            }
            tracing::info!("shutting down");
            cancel.cancel();
        }
    });

    let addr = SocketAddr::from(([127, 0, 0, 1], config.listen_port));
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to bind: {e}");
            std::process::exit(1);
        });

    if let Err(e) = server::serve(listener, registry, cancel.clone()).await {
        tracing::error!("Server error: {e}");
        cancel.cancel();
    }

    if let Some(watch) = watch
        && let Err(e) = watch.stopped().await
    {
        tracing::error!("Token watcher panicked: {e}");
        std::process::exit(1);
    }
}

/// Build the registry described by `config`.
///
/// Watched sources are loaded once before this returns. A watched source that
/// cannot be loaded or parsed at startup is fatal.
async fn build_registry(
    config: &ServerConfig,
    cancel: CancellationToken,
) -> Result<(TokenRegistry, Option<WatchHandle>), String> {
    match &config.token_source {
        TokenSourceConfig::Watched {
            descriptor,
            reload_interval,
        } => {
            let loader = AnySourceLoader::new(config.http_timeout)
                .map_err(|e| format!("Failed to create HTTP client: {e}"))?;
            tracing::info!(
                "Loading tokens: source={descriptor}, reload_interval={}s",
                reload_interval.as_secs()
            );
            let (registry, watch) =
                TokenRegistry::watch(descriptor.clone(), loader, *reload_interval, cancel)
                    .await
                    .map_err(|e| format!("Failed to load tokens: {e}"))?;
            Ok((registry, Some(watch)))
        }
        TokenSourceConfig::Static {
            client_secrets,
            server_secrets,
        } => {
            let snapshot =
                TokenSnapshot::from_secrets(client_secrets.clone(), server_secrets.clone());
            tracing::info!("Loaded {} static tokens", snapshot.len());
            Ok((TokenRegistry::new(snapshot), None))
        }
    }
}
