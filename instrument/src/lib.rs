pub mod api;
pub mod client;
pub mod config;
pub mod conversion;
pub mod errors;
pub mod identity;
pub mod metrics_defs;
pub mod retrieval;
pub mod types;
pub mod validator;
pub mod version;

#[cfg(test)]
mod testutils;

use api::AppState;
use client::ClientFactory;
use conversion::Converter;
use identity::{IdentityError, MetadataServerTokenProvider, TokenProvider};
use retrieval::Retriever;
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("could not build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("could not build identity provider: {0}")]
    Identity(#[from] IdentityError),
}

/// Wires the upstream clients together, binds the listener and serves until
/// `shutdown` resolves.
pub async fn run<F>(config: config::Config, shutdown: F) -> Result<(), RunError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let tokens: Arc<dyn TokenProvider> = Arc::new(MetadataServerTokenProvider::new(
        &config.identity,
        config.upstream_timeout(),
    )?);
    let clients = Arc::new(ClientFactory::new(config.upstream_timeout(), tokens)?);

    if config.cir.base_url.is_none() {
        tracing::warn!("CIR base URL is not set, instrument requests will fail");
    }
    if config.converter.base_url.is_none() {
        tracing::warn!("Converter base URL is not set, upgrades will fail");
    }

    let state = AppState {
        retriever: Arc::new(Retriever::new(config.cir, clients.clone())),
        converter: Arc::new(Converter::new(config.converter, clients)),
    };

    let listener =
        TcpListener::bind(format!("{}:{}", config.listener.host, config.listener.port)).await?;
    tracing::info!(address = %listener.local_addr()?, "Instrument proxy listening");

    api::serve(listener, state, shutdown).await?;
    tracing::info!("Instrument proxy stopped");
    Ok(())
}
