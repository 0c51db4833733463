/// Peer-replicated key/value cache with TTL
///
/// One local store plus zero or more remote peer stores behind the
/// `CacheStore` seam. Reads are TTL-aware and race a short per-source timer;
/// writes hold a single store-wide lock and fan out to every store in
/// parallel.
pub mod entry;
pub mod store;

use crate::error::{ResolverError, ResolverResult};
use crate::identity::Identity;
use crate::swarm::{self, DiscoveryKey, Swarm, SwarmEvent};
use entry::{now_millis, Entry};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use store::{CacheStore, SqliteStore};
use tokio::sync::{mpsc, Mutex, OnceCell, RwLock};
use tracing::{debug, warn};

/// Per-source lookup budget; a slower source is treated as a miss
const LOOKUP_TIMEOUT: Duration = Duration::from_millis(100);

/// Database file name inside a store directory
const STORE_FILE: &str = "cache.sqlite";

/// A non-expired cache hit, with its expiry horizon so callers can decide
/// whether a preemptive refresh is due
#[derive(Debug, Clone, PartialEq)]
pub struct CachedDocument {
    pub document: Value,
    pub ttl: u64,
}

/// A registered peer store and its discovery channel
struct PeerHandle {
    identifier: String,
    store: Arc<dyn CacheStore>,
    discovery_key: DiscoveryKey,
}

pub struct Cache {
    root: PathBuf,
    cache_ttl: u64,
    identity: Option<Arc<Identity>>,
    swarm: Arc<dyn Swarm>,
    local: OnceCell<Arc<dyn CacheStore>>,
    discovery_key: OnceCell<DiscoveryKey>,
    /// Insertion-ordered peer set; lookups walk it newest-first
    peers: RwLock<Vec<PeerHandle>>,
    /// Store-wide mutual exclusion for puts and deletes
    write_lock: Mutex<()>,
    init: OnceCell<()>,
    swarm_events: Mutex<Option<mpsc::UnboundedReceiver<SwarmEvent>>>,
}

impl Cache {
    pub fn new(
        root: PathBuf,
        cache_ttl: u64,
        identity: Arc<Identity>,
        swarm: Arc<dyn Swarm>,
        swarm_events: mpsc::UnboundedReceiver<SwarmEvent>,
    ) -> Self {
        Self {
            root,
            cache_ttl,
            identity: Some(identity),
            swarm,
            local: OnceCell::new(),
            discovery_key: OnceCell::new(),
            peers: RwLock::new(Vec::new()),
            write_lock: Mutex::new(()),
            init: OnceCell::new(),
            swarm_events: Mutex::new(Some(swarm_events)),
        }
    }

    /// A cache over an explicit local store, already ready. Used when the
    /// cache is embedded without a swarm identity (and by tests).
    pub fn detached(local: Arc<dyn CacheStore>, cache_ttl: u64) -> Self {
        let (swarm, _) = swarm::LocalSwarm::new();
        Self {
            root: PathBuf::new(),
            cache_ttl,
            identity: None,
            swarm: Arc::new(swarm),
            local: OnceCell::new_with(Some(local)),
            discovery_key: OnceCell::new(),
            peers: RwLock::new(Vec::new()),
            write_lock: Mutex::new(()),
            init: OnceCell::new_with(Some(())),
            swarm_events: Mutex::new(None),
        }
    }

    /// Initialize the local store and join its discovery channel.
    ///
    /// Memoized: safe to call any number of times; all callers observe the
    /// outcome of the single initialization.
    pub async fn ready(self: &Arc<Self>) -> ResolverResult<()> {
        let cache = Arc::clone(self);
        self.init
            .get_or_try_init(move || async move {
                let identity = cache
                    .identity
                    .as_ref()
                    .ok_or_else(|| ResolverError::Internal("cache has no identity".into()))?;

                identity.ready().await?;

                let discovery_key = swarm::discovery_key(&identity.public_key);
                cache.discovery_key.set(discovery_key).ok();

                let path = cache.root.join(&identity.identifier).join(STORE_FILE);
                let local: Arc<dyn CacheStore> = Arc::new(SqliteStore::open(&path).await?);
                cache
                    .local
                    .set(local)
                    .map_err(|_| ResolverError::Internal("local store already set".into()))?;

                cache.swarm.join(discovery_key, 0).await?;

                if let Some(events) = cache.swarm_events.lock().await.take() {
                    let cache = Arc::clone(&cache);
                    tokio::spawn(async move {
                        cache.handle_swarm_events(events).await;
                    });
                }

                Ok::<_, ResolverError>(())
            })
            .await?;

        Ok(())
    }

    fn local(&self) -> ResolverResult<Arc<dyn CacheStore>> {
        self.local
            .get()
            .cloned()
            .ok_or_else(|| ResolverError::Internal("cache not ready".into()))
    }

    /// Look a key up across peers (most-recently-added first) and finally
    /// the local store. Each source gets one attempt racing a 100 ms timer;
    /// timeouts and per-source errors are misses. The first non-expired hit
    /// wins.
    pub async fn get(&self, key: &str) -> ResolverResult<Option<CachedDocument>> {
        let local = self.local()?;
        let now = now_millis();

        let mut sources: Vec<Arc<dyn CacheStore>> = {
            let peers = self.peers.read().await;
            peers.iter().rev().map(|p| Arc::clone(&p.store)).collect()
        };
        sources.push(local);

        for source in sources {
            let lookup = tokio::time::timeout(LOOKUP_TIMEOUT, source.get(key)).await;
            let bytes = match lookup {
                Ok(Ok(Some(bytes))) => bytes,
                Ok(Ok(None)) => continue,
                Ok(Err(err)) => {
                    debug!(key, %err, "cache source lookup failed");
                    continue;
                }
                Err(_) => {
                    debug!(key, "cache source lookup timed out");
                    continue;
                }
            };

            let entry = match Entry::decode(&bytes) {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(key, %err, "discarding corrupt cache entry");
                    continue;
                }
            };

            if entry.expired(now) {
                continue;
            }

            let document = serde_json::from_slice(&entry.value)?;
            return Ok(Some(CachedDocument {
                document,
                ttl: entry.ttl,
            }));
        }

        Ok(None)
    }

    /// Store a value under a key on every peer store and the local store in
    /// parallel. Holds the store-wide write lock until every write has
    /// settled; any single write failure fails the operation, but sibling
    /// writes are never cancelled mid-flight.
    pub async fn put(&self, key: &str, value: &Value) -> ResolverResult<()> {
        let local = self.local()?;
        let entry = Entry::new(serde_json::to_vec(value)?, self.cache_ttl);
        let encoded = entry.encode();

        let _guard = self.write_lock.lock().await;

        // snapshot before fanning out so a concurrent add_peer cannot race
        let mut stores: Vec<Arc<dyn CacheStore>> = {
            let peers = self.peers.read().await;
            peers.iter().map(|p| Arc::clone(&p.store)).collect()
        };
        stores.push(local);

        let results =
            futures::future::join_all(stores.iter().map(|store| store.put(key, &encoded))).await;
        results.into_iter().collect::<ResolverResult<Vec<_>>>()?;

        Ok(())
    }

    /// Remove a key from every peer store and the local store, under the
    /// same locking discipline as `put`.
    pub async fn del(&self, key: &str) -> ResolverResult<()> {
        let local = self.local()?;

        let _guard = self.write_lock.lock().await;

        let mut stores: Vec<Arc<dyn CacheStore>> = {
            let peers = self.peers.read().await;
            peers.iter().map(|p| Arc::clone(&p.store)).collect()
        };
        stores.push(local);

        let results = futures::future::join_all(stores.iter().map(|store| store.del(key))).await;
        results.into_iter().collect::<ResolverResult<Vec<_>>>()?;

        Ok(())
    }

    /// Open a peer store by identifier and join its discovery channel under
    /// the hash of its public key.
    pub async fn add_peer(&self, identifier: &str) -> ResolverResult<()> {
        let did = crate::did::Did::parse(&if identifier.starts_with("did:") {
            identifier.to_string()
        } else {
            format!("did:ara:{}", identifier)
        })?;

        let public_key = hex::decode(&did.identifier)
            .map_err(|_| ResolverError::InvalidDid(did.reference.clone()))?;

        let path = self.root.join(&did.identifier).join(STORE_FILE);
        let store: Arc<dyn CacheStore> = Arc::new(SqliteStore::open(&path).await?);
        let discovery_key = swarm::discovery_key(&public_key);
        self.swarm.join(discovery_key, 0).await?;

        self.register_peer(&did.identifier, store, discovery_key)
            .await;
        Ok(())
    }

    /// Register an already-open store as a peer. The newest peer is
    /// consulted first on lookups.
    pub async fn register_peer(
        &self,
        identifier: &str,
        store: Arc<dyn CacheStore>,
        discovery_key: DiscoveryKey,
    ) {
        self.peers.write().await.push(PeerHandle {
            identifier: identifier.to_string(),
            store,
            discovery_key,
        });
    }

    /// Dispose of a peer: leave its channel first, then close the store,
    /// then drop the index entry, in that order.
    pub async fn remove_peer(&self, identifier: &str) -> ResolverResult<()> {
        let mut peers = self.peers.write().await;
        let Some(position) = peers.iter().position(|p| p.identifier == identifier) else {
            return Ok(());
        };

        let peer = &peers[position];
        self.swarm.leave(peer.discovery_key).await?;
        peer.store.close().await?;
        peers.remove(position);

        Ok(())
    }

    /// Authorize non-self peers connecting on the replication swarm.
    /// Grants are append-only; nothing here ever revokes one.
    async fn handle_swarm_events(&self, mut events: mpsc::UnboundedReceiver<SwarmEvent>) {
        let own_id = self
            .identity
            .as_ref()
            .map(|i| i.identifier.clone())
            .unwrap_or_default();

        while let Some(event) = events.recv().await {
            match event {
                SwarmEvent::Connection(peer) => {
                    if peer.id == own_id {
                        continue;
                    }
                    if let Err(err) = self.on_connection(&peer.id).await {
                        warn!(peer = %peer.id, %err, "failed to authorize peer");
                    }
                }
                SwarmEvent::Error(message) => {
                    warn!(%message, "swarm error");
                }
            }
        }
    }

    async fn on_connection(&self, peer_id: &str) -> ResolverResult<()> {
        let local = self.local()?;
        if !local.authorized(peer_id).await? {
            debug!(peer = peer_id, "authorizing cache peer");
            local.authorize(peer_id).await?;
        }
        Ok(())
    }

    /// Close every peer store and the local store, leaving discovery
    /// channels before closing each store.
    pub async fn destroy(&self) -> ResolverResult<()> {
        let mut peers = self.peers.write().await;
        for peer in peers.drain(..) {
            self.swarm.leave(peer.discovery_key).await?;
            peer.store.close().await?;
        }
        drop(peers);

        if let Some(discovery_key) = self.discovery_key.get() {
            self.swarm.leave(*discovery_key).await?;
        }
        if let Some(local) = self.local.get() {
            local.close().await?;
        }

        Ok(())
    }
}
