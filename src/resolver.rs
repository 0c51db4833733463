/// Resolver lifecycle: owns the identity, channel, cache, and HTTP server
/// and sequences startup and teardown.
///
/// The lifecycle is an explicit state enum guarded at every transition,
/// with an orthogonal stall flag that aborts an in-progress start at the
/// next checkpoint instead of continuing silently.
use crate::{
    cache::Cache,
    channel::Channel,
    config::ResolverConfig,
    context::AppContext,
    drivers::{ara::AraDriver, DriverRegistry},
    error::{ResolverError, ResolverResult},
    identity::Identity,
    identity_store::FsIdentityStore,
    keyring, server,
    swarm::LocalSwarm,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

/// Lifecycle states, in start order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverState {
    Idle,
    Starting,
    Started,
    Ready,
}

impl ResolverState {
    /// Busy means a start is in progress or has completed
    pub fn busy(&self) -> bool {
        !matches!(self, ResolverState::Idle)
    }
}

/// Components owned while the resolver runs
struct Running {
    identity: Arc<Identity>,
    cache: Arc<Cache>,
    channel: Arc<Channel>,
    server: JoinHandle<ResolverResult<()>>,
    port: u16,
}

pub struct Resolver {
    config: Arc<ResolverConfig>,
    state: Mutex<ResolverState>,
    stalled: AtomicBool,
    running: Mutex<Option<Running>>,
}

impl Resolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Mutex::new(ResolverState::Idle),
            stalled: AtomicBool::new(false),
            running: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> ResolverState {
        *self.state.lock().await
    }

    /// Port the server is bound to, once started
    pub async fn port(&self) -> Option<u16> {
        self.running.lock().await.as_ref().map(|r| r.port)
    }

    /// Abort an in-progress start at its next checkpoint
    pub fn stall(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }

    fn check_stall(&self, at: &'static str) -> ResolverResult<()> {
        if self.stalled.load(Ordering::SeqCst) {
            Err(ResolverError::Stalled(at))
        } else {
            Ok(())
        }
    }

    /// Start the resolver and wait for everything to be ready.
    ///
    /// Returns `false` without doing anything when a start is already in
    /// progress or complete.
    pub async fn start(self: &Arc<Self>) -> ResolverResult<bool> {
        {
            let mut state = self.state.lock().await;
            if state.busy() {
                return Ok(false);
            }
            *state = ResolverState::Starting;
        }
        self.stalled.store(false, Ordering::SeqCst);

        match self.start_inner().await {
            Ok(()) => Ok(true),
            Err(err) => {
                // wind back so a later start can retry
                *self.state.lock().await = ResolverState::Idle;
                Err(err)
            }
        }
    }

    async fn start_inner(self: &Arc<Self>) -> ResolverResult<()> {
        let config = &self.config;
        config.validate()?;

        let identity = Arc::new(Identity::new(
            &config.identity.identifier,
            &config.identity.password,
            config.identity.identity_root.clone(),
            config.identity.keyring.clone(),
            config.identity.secret.as_bytes().to_vec(),
        )?);

        let (swarm, swarm_events) = LocalSwarm::new();
        let swarm = Arc::new(swarm);

        let cache = Arc::new(Cache::new(
            config.cache.root.clone(),
            config.cache.ttl,
            Arc::clone(&identity),
            swarm.clone(),
            swarm_events,
        ));
        let channel = Arc::new(Channel::new(swarm));

        let identity_store = Arc::new(FsIdentityStore::new(
            config.identity.identity_root.clone(),
            config.resolution.remote.clone(),
            config.resolution.cache_dir.clone(),
            config.cache.ttl,
        ));
        let mut drivers = DriverRegistry::new();
        drivers.register("ara", Arc::new(AraDriver::new(identity_store)));

        let context = AppContext::new(
            Arc::clone(&self.config),
            Arc::clone(&cache),
            Arc::new(drivers),
            Some(Arc::clone(&identity)),
        );

        *self.state.lock().await = ResolverState::Started;

        // readiness in dependency order: the cache needs the identity's key
        // material, the channel needs a discovery key derived from it
        identity.ready().await?;
        channel.ready().await?;
        cache.ready().await?;
        self.check_stall("while waiting to be ready")?;

        let packed = identity.keyring()?.get(&config.identity.network)?;
        let keys = keyring::unpack(packed)?;

        let listener = server::bind(&config.server.address, config.server.port).await?;
        self.check_stall("while starting server")?;
        let port = listener.local_addr()?.port();
        let server = tokio::spawn(server::serve(listener, context));

        // anything failing past this point must take the listener down with
        // it, or a retried start would leave an orphaned server behind
        let wired = async {
            for node in &config.cache.nodes {
                cache.add_peer(node).await?;
            }
            self.check_stall("while adding peers")?;

            channel.announce(keys.discovery_key, port).await
        }
        .await;
        if let Err(err) = wired {
            server.abort();
            return Err(err);
        }

        *self.state.lock().await = ResolverState::Ready;
        *self.running.lock().await = Some(Running {
            identity,
            cache,
            channel,
            server,
            port,
        });

        info!(port, "resolver ready");
        Ok(())
    }

    /// Stop the server and close the cache concurrently; the node counts as
    /// closed only when both succeed.
    pub async fn destroy(&self) -> ResolverResult<()> {
        let Some(running) = self.running.lock().await.take() else {
            return Ok(());
        };

        running.server.abort();
        let (cache_result, channel_result) =
            tokio::join!(running.cache.destroy(), running.channel.destroy());
        cache_result?;
        channel_result?;

        drop(running.identity);
        *self.state.lock().await = ResolverState::Idle;
        info!("resolver closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, IdentityConfig, ResolutionConfig, ServerConfig};
    use ed25519_dalek::SigningKey;

    async fn fixture_config(dir: &std::path::Path) -> ResolverConfig {
        let seed = [3u8; 32];
        let signing_key = SigningKey::from_bytes(&seed);
        let identifier = hex::encode(signing_key.verifying_key().to_bytes());

        let keystore_dir = dir.join("identities").join(&identifier).join("keystore");
        tokio::fs::create_dir_all(&keystore_dir).await.unwrap();
        tokio::fs::write(keystore_dir.join("ara"), hex::encode(seed))
            .await
            .unwrap();
        tokio::fs::write(
            dir.join("keyring"),
            format!(r#"{{"resolver.test":"{}"}}"#, "22".repeat(32)),
        )
        .await
        .unwrap();

        ResolverConfig {
            identity: IdentityConfig {
                identifier,
                password: "passphrase".to_string(),
                keyring: dir.join("keyring"),
                secret: "shared".to_string(),
                network: "resolver.test".to_string(),
                identity_root: dir.join("identities"),
            },
            server: ServerConfig {
                address: "127.0.0.1".to_string(),
                port: 0,
                timeout: 5000,
            },
            cache: CacheConfig {
                ttl: 60_000,
                root: dir.join("cache"),
                nodes: vec![],
            },
            resolution: ResolutionConfig {
                remote: None,
                cache_dir: dir.join("resolutions"),
            },
        }
    }

    #[tokio::test]
    async fn test_start_is_busy_when_started() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = Arc::new(Resolver::new(fixture_config(dir.path()).await));

        assert!(resolver.start().await.unwrap());
        assert_eq!(resolver.state().await, ResolverState::Ready);
        assert!(resolver.port().await.unwrap() > 0);

        // second start is a no-op
        assert!(!resolver.start().await.unwrap());

        resolver.destroy().await.unwrap();
        assert_eq!(resolver.state().await, ResolverState::Idle);
    }

    #[tokio::test]
    async fn test_restart_after_destroy() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = Arc::new(Resolver::new(fixture_config(dir.path()).await));

        assert!(resolver.start().await.unwrap());
        resolver.destroy().await.unwrap();
        assert!(resolver.start().await.unwrap());
        resolver.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_fails_without_keystore() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fixture_config(dir.path()).await;
        config.identity.identifier = "ee".repeat(32); // no keystore on disk

        let resolver = Arc::new(Resolver::new(config));
        assert!(matches!(
            resolver.start().await,
            Err(ResolverError::StorageUnavailable(_))
        ));
        // failed start winds back to idle so it can be retried
        assert_eq!(resolver.state().await, ResolverState::Idle);
    }

    #[tokio::test]
    async fn test_failed_start_stops_the_server() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fixture_config(dir.path()).await;
        // an unparseable peer identifier fails start after the listener is up
        config.cache.nodes = vec!["did:ara:not-hex".to_string()];

        // reserve a concrete port so the orphan would be observable
        let reserved = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = reserved.local_addr().unwrap().port();
        drop(reserved);
        config.server.port = port;

        let resolver = Arc::new(Resolver::new(config));
        assert!(resolver.start().await.is_err());
        assert_eq!(resolver.state().await, ResolverState::Idle);

        // the spawned server was aborted along with the failed start
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_stall_check() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = Arc::new(Resolver::new(fixture_config(dir.path()).await));

        resolver.stall();
        assert!(matches!(
            resolver.check_stall("while testing"),
            Err(ResolverError::Stalled("while testing"))
        ));

        // start clears a stale stall flag before running
        assert!(resolver.start().await.unwrap());
        resolver.destroy().await.unwrap();
    }
}
