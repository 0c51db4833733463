/// Configuration management for the resolver node
use crate::error::{ResolverError, ResolverResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main node configuration, read once at startup and immutable afterwards
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    pub identity: IdentityConfig,
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub resolution: ResolutionConfig,
}

/// Node identity and keyring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// DID (or bare 64-hex identifier) of this node's identity
    pub identifier: String,
    /// Passphrase for the identity keystore
    pub password: String,
    /// Path to the network keyring file
    pub keyring: PathBuf,
    /// Shared secret for the network keys
    pub secret: String,
    /// Human readable network name for keys in the keyring
    pub network: String,
    /// Root directory of locally archived identities
    pub identity_root: PathBuf,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    /// Request timeout in milliseconds
    pub timeout: u64,
}

/// Cache engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entry TTL in milliseconds
    pub ttl: u64,
    /// Path to the cache data root
    pub root: PathBuf,
    /// Public keys of other resolver nodes to share the cache with
    pub nodes: Vec<String>,
}

/// Remote resolution configuration for the identity store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionConfig {
    /// Base URL of a remote resolver for non-archived identifiers
    pub remote: Option<String>,
    /// On-disk cache directory for remote resolutions
    pub cache_dir: PathBuf,
}

impl ResolverConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> ResolverResult<Self> {
        dotenv::dotenv().ok();

        let identifier = env::var("RESOLVER_IDENTITY")
            .map_err(|_| ResolverError::Internal("RESOLVER_IDENTITY is required".to_string()))?;
        let password = env::var("RESOLVER_PASSWORD")
            .map_err(|_| ResolverError::Internal("RESOLVER_PASSWORD is required".to_string()))?;
        let keyring: PathBuf = env::var("RESOLVER_KEYRING")
            .map_err(|_| ResolverError::Internal("RESOLVER_KEYRING is required".to_string()))?
            .into();
        let secret = env::var("RESOLVER_SECRET")
            .map_err(|_| ResolverError::Internal("RESOLVER_SECRET is required".to_string()))?;
        let network = env::var("RESOLVER_NETWORK")
            .unwrap_or_else(|_| "resolver".to_string());

        let data_directory: PathBuf = env::var("RESOLVER_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let identity_root = env::var("RESOLVER_IDENTITY_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("identities"));

        let address = env::var("RESOLVER_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("RESOLVER_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .map_err(|_| ResolverError::Internal("Invalid port number".to_string()))?;
        let timeout = env::var("RESOLVER_TIMEOUT")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .map_err(|_| ResolverError::Internal("Invalid request timeout".to_string()))?;

        let cache_ttl = env::var("RESOLVER_CACHE_TTL")
            .unwrap_or_else(|_| "3600000".to_string())
            .parse()
            .map_err(|_| ResolverError::Internal("Invalid cache TTL".to_string()))?;
        let cache_root = env::var("RESOLVER_CACHE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("cache"));
        let cache_nodes = env::var("RESOLVER_CACHE_NODES")
            .unwrap_or_else(|_| String::new())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let remote = env::var("RESOLVER_REMOTE").ok();
        let resolution_cache_dir = env::var("RESOLVER_RESOLUTION_CACHE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("resolutions"));

        Ok(Self {
            identity: IdentityConfig {
                identifier,
                password,
                keyring,
                secret,
                network,
                identity_root,
            },
            server: ServerConfig {
                address,
                port,
                timeout,
            },
            cache: CacheConfig {
                ttl: cache_ttl,
                root: cache_root,
                nodes: cache_nodes,
            },
            resolution: ResolutionConfig {
                remote,
                cache_dir: resolution_cache_dir,
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> ResolverResult<()> {
        if self.identity.secret.is_empty() {
            return Err(ResolverError::Internal(
                "keyring secret cannot be empty".to_string(),
            ));
        }

        if self.server.timeout == 0 {
            return Err(ResolverError::Internal(
                "request timeout must be positive".to_string(),
            ));
        }

        if self.cache.ttl == 0 {
            return Err(ResolverError::Internal(
                "cache TTL must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
