/// Peer discovery swarm boundary
///
/// The wire protocol for peer discovery and replication lives outside this
/// crate. Components talk to it through the `Swarm` trait: join/leave a
/// discovery key and receive connection events over an explicit channel
/// wired at construction time.
use crate::error::ResolverResult;
use async_trait::async_trait;
use blake2::{digest::consts::U32, Blake2b, Digest};
use std::collections::HashSet;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// Key peers join on to find each other for replication
pub type DiscoveryKey = [u8; 32];

/// Derive the discovery key for a public key (BLAKE2b-256)
pub fn discovery_key(public_key: &[u8]) -> DiscoveryKey {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(public_key);
    hasher.finalize().into()
}

/// A peer that connected on the replication swarm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    /// Peer identifier (hex public key)
    pub id: String,
}

/// Events emitted by the swarm
#[derive(Debug, Clone)]
pub enum SwarmEvent {
    Connection(PeerInfo),
    Error(String),
}

#[async_trait]
pub trait Swarm: Send + Sync {
    /// Join a discovery key, announcing on the given port when non-zero
    async fn join(&self, key: DiscoveryKey, port: u16) -> ResolverResult<()>;

    /// Leave a discovery key, tearing down its replication handles
    async fn leave(&self, key: DiscoveryKey) -> ResolverResult<()>;
}

/// Process-local swarm used for wiring and tests.
///
/// Tracks joined keys and lets callers inject connections; no network
/// traffic is involved.
pub struct LocalSwarm {
    joined: Mutex<HashSet<DiscoveryKey>>,
    events: mpsc::UnboundedSender<SwarmEvent>,
}

impl LocalSwarm {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SwarmEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                joined: Mutex::new(HashSet::new()),
                events: tx,
            },
            rx,
        )
    }

    /// Inject an inbound connection, as the transport would on a real swarm
    pub fn inject_connection(&self, peer: PeerInfo) {
        let _ = self.events.send(SwarmEvent::Connection(peer));
    }

    pub async fn joined(&self, key: &DiscoveryKey) -> bool {
        self.joined.lock().await.contains(key)
    }
}

#[async_trait]
impl Swarm for LocalSwarm {
    async fn join(&self, key: DiscoveryKey, port: u16) -> ResolverResult<()> {
        debug!(key = %hex::encode(key), port, "joining discovery key");
        self.joined.lock().await.insert(key);
        Ok(())
    }

    async fn leave(&self, key: DiscoveryKey) -> ResolverResult<()> {
        debug!(key = %hex::encode(key), "leaving discovery key");
        self.joined.lock().await.remove(&key);
        Ok(())
    }
}
