//! Ara Identity Resolver
//!
//! A network node that resolves DID documents over HTTP, backed by a
//! peer-replicated TTL cache and pluggable per-method drivers.

use ara_resolver::config::ResolverConfig;
use ara_resolver::error::ResolverResult;
use ara_resolver::Resolver;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ResolverResult<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ara_resolver=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = ResolverConfig::from_env()?;

    let resolver = Arc::new(Resolver::new(config));
    resolver.start().await?;

    // Run until interrupted, then tear down peers and the local store
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    resolver.destroy().await?;

    Ok(())
}
