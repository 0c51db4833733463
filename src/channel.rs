/// Discovery channel for announcing this resolver on the network
use crate::error::ResolverResult;
use crate::swarm::{DiscoveryKey, Swarm};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

pub struct Channel {
    swarm: Arc<dyn Swarm>,
    announced: Mutex<Option<DiscoveryKey>>,
}

impl Channel {
    pub fn new(swarm: Arc<dyn Swarm>) -> Self {
        Self {
            swarm,
            announced: Mutex::new(None),
        }
    }

    /// Nothing to wait for until announce; kept for the component readiness
    /// sequence the resolver walks before going ready.
    pub async fn ready(&self) -> ResolverResult<()> {
        Ok(())
    }

    /// Announce that this resolver serves on the given port under the
    /// network discovery key
    pub async fn announce(&self, discovery_key: DiscoveryKey, port: u16) -> ResolverResult<()> {
        self.swarm.join(discovery_key, port).await?;
        *self.announced.lock().await = Some(discovery_key);
        info!(key = %hex::encode(discovery_key), port, "announced on discovery channel");
        Ok(())
    }

    /// Leave the announced channel
    pub async fn destroy(&self) -> ResolverResult<()> {
        if let Some(discovery_key) = self.announced.lock().await.take() {
            self.swarm.leave(discovery_key).await?;
        }
        Ok(())
    }
}
