/// Identity store boundary used by the "ara" driver
///
/// Mirrors the identity filesystem layout: documents for locally archived
/// identities live under `<root>/<identifier>/`, and identifiers that are
/// not archived locally are resolved over the network through a configured
/// remote resolver endpoint, with an on-disk TTL cache keyed by identifier.
use crate::cache::entry::{now_millis, Entry};
use crate::did;
use crate::document::DidDocument;
use crate::error::{ResolverError, ResolverResult};
use crate::response::ResolutionResponse;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, warn};

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Read a file from an identity's directory
    async fn read_file(&self, identifier: &str, relative_path: &str) -> ResolverResult<Vec<u8>>;

    /// Resolve an identifier through the identity network
    async fn resolve(&self, identifier: &str) -> ResolverResult<Option<DidDocument>>;
}

/// Filesystem identity store with a remote resolution fallback
pub struct FsIdentityStore {
    root: PathBuf,
    /// Base URL of a remote resolver, e.g. `https://resolver.example.com`
    remote: Option<String>,
    /// On-disk cache directory for remote resolutions
    cache_dir: PathBuf,
    cache_ttl: u64,
    client: reqwest::Client,
}

impl FsIdentityStore {
    pub fn new(root: PathBuf, remote: Option<String>, cache_dir: PathBuf, cache_ttl: u64) -> Self {
        Self {
            root,
            remote,
            cache_dir,
            cache_ttl,
            client: reqwest::Client::new(),
        }
    }

    async fn cached_resolution(&self, identifier: &str) -> Option<DidDocument> {
        if !did::is_hex_identifier(identifier) {
            return None;
        }
        let path = self.cache_dir.join(identifier);
        let raw = tokio::fs::read(&path).await.ok()?;
        let entry = Entry::decode(&raw).ok()?;
        if entry.expired(now_millis()) {
            return None;
        }
        serde_json::from_slice(&entry.value).ok()
    }

    async fn cache_resolution(&self, identifier: &str, document: &DidDocument) {
        if !did::is_hex_identifier(identifier) {
            debug!(identifier, "not a hex identifier, skipping disk cache");
            return;
        }
        let result = async {
            tokio::fs::create_dir_all(&self.cache_dir).await?;
            let entry = Entry::new(serde_json::to_vec(document)?, self.cache_ttl);
            tokio::fs::write(self.cache_dir.join(identifier), entry.encode()).await?;
            Ok::<_, ResolverError>(())
        }
        .await;

        if let Err(err) = result {
            warn!(identifier, %err, "failed to cache remote resolution");
        }
    }
}

#[async_trait]
impl IdentityStore for FsIdentityStore {
    async fn read_file(&self, identifier: &str, relative_path: &str) -> ResolverResult<Vec<u8>> {
        // identifiers come off the wire; only a bare hex key may become a
        // path component under the identity root
        if !did::is_hex_identifier(identifier) {
            return Err(ResolverError::InvalidDid(identifier.to_string()));
        }
        let path = self.root.join(identifier).join(relative_path);
        Ok(tokio::fs::read(&path).await?)
    }

    async fn resolve(&self, identifier: &str) -> ResolverResult<Option<DidDocument>> {
        if let Some(document) = self.cached_resolution(identifier).await {
            debug!(identifier, "remote resolution served from disk cache");
            return Ok(Some(document));
        }

        let Some(remote) = &self.remote else {
            return Ok(None);
        };

        let url = format!("{}/1.0/identifiers/did:ara:{}", remote, identifier);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ResolverError::Internal(format!("remote resolution failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ResolverError::Internal(format!(
                "remote resolver returned {}",
                response.status()
            )));
        }

        let envelope: ResolutionResponse = response
            .json()
            .await
            .map_err(|e| ResolverError::Internal(format!("bad resolution envelope: {}", e)))?;
        let document: DidDocument = serde_json::from_value(envelope.did_document)?;

        self.cache_resolution(identifier, &document).await;
        Ok(Some(document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document(id: &str) -> DidDocument {
        DidDocument {
            context: None,
            id: id.to_string(),
            public_key: vec![],
            authentication: vec![],
            proof: None,
        }
    }

    #[tokio::test]
    async fn test_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let identifier = "ab".repeat(32);
        let identity_dir = dir.path().join(&identifier);
        tokio::fs::create_dir_all(&identity_dir).await.unwrap();
        tokio::fs::write(identity_dir.join("ddo.json"), b"{}")
            .await
            .unwrap();

        let store = FsIdentityStore::new(
            dir.path().to_path_buf(),
            None,
            dir.path().join("cache"),
            1000,
        );
        assert_eq!(
            store.read_file(&identifier, "ddo.json").await.unwrap(),
            b"{}".to_vec()
        );
        assert!(store.read_file(&identifier, "missing").await.is_err());
    }

    #[tokio::test]
    async fn test_read_file_rejects_non_hex_identifier() {
        let dir = tempfile::tempdir().unwrap();

        // a document planted outside the identity root, reachable only by
        // walking up out of it
        let outside = dir.path().join("outside");
        tokio::fs::create_dir_all(&outside).await.unwrap();
        tokio::fs::write(outside.join("ddo.json"), br#"{"id":"did:ara:stolen"}"#)
            .await
            .unwrap();

        let root = dir.path().join("identities");
        tokio::fs::create_dir_all(&root).await.unwrap();
        let store = FsIdentityStore::new(root, None, dir.path().join("cache"), 1000);

        // 64 characters, but an escape rather than a key
        let escape = format!("../outside/{}", "a".repeat(53));
        assert_eq!(escape.len(), 64);
        assert!(matches!(
            store.read_file(&escape, "ddo.json").await,
            Err(ResolverError::InvalidDid(_))
        ));
        assert!(matches!(
            store.read_file("../outside", "ddo.json").await,
            Err(ResolverError::InvalidDid(_))
        ));
    }

    #[tokio::test]
    async fn test_disk_cache_refuses_non_hex_identifier() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        let store = FsIdentityStore::new(dir.path().join("identities"), None, cache_dir, 60_000);

        let escape = format!("../{}", "b".repeat(61));
        store
            .cache_resolution(&escape, &sample_document("did:ara:x"))
            .await;
        // nothing written anywhere, and nothing readable back
        assert!(!dir.path().join("b".repeat(61)).exists());
        assert!(store.cached_resolution(&escape).await.is_none());
    }

    #[tokio::test]
    async fn test_resolve_without_remote_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsIdentityStore::new(
            dir.path().to_path_buf(),
            None,
            dir.path().join("cache"),
            1000,
        );
        assert_eq!(store.resolve("abc").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_resolve_prefers_fresh_disk_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        tokio::fs::create_dir_all(&cache_dir).await.unwrap();

        let identifier = "ab".repeat(32);
        let document = sample_document("did:ara:abc");
        let entry = Entry::new(serde_json::to_vec(&document).unwrap(), 60_000);
        tokio::fs::write(cache_dir.join(&identifier), entry.encode())
            .await
            .unwrap();

        // remote points nowhere; a fresh cache entry must short-circuit it
        let store = FsIdentityStore::new(
            dir.path().to_path_buf(),
            Some("http://127.0.0.1:1".to_string()),
            cache_dir,
            60_000,
        );
        assert_eq!(store.resolve(&identifier).await.unwrap(), Some(document));
    }

    #[tokio::test]
    async fn test_resolve_ignores_expired_disk_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        tokio::fs::create_dir_all(&cache_dir).await.unwrap();

        let identifier = "ab".repeat(32);
        let document = sample_document("did:ara:abc");
        let entry = Entry::with_ttl(serde_json::to_vec(&document).unwrap(), 1);
        tokio::fs::write(cache_dir.join(&identifier), entry.encode())
            .await
            .unwrap();

        let store = FsIdentityStore::new(dir.path().to_path_buf(), None, cache_dir, 1000);
        assert_eq!(store.resolve(&identifier).await.unwrap(), None);
    }
}
