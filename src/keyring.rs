/// Network keyring boundary
///
/// Keyring encryption and the packed-key wire layout belong to the network
/// tooling that writes these files; this module only loads a keyring for the
/// node identity and unpacks the discovery key for a named network. Any
/// decode failure here is fatal to node startup.
use crate::error::{ResolverError, ResolverResult};
use crate::swarm::{self, DiscoveryKey};
use std::collections::HashMap;
use std::path::Path;

/// Keys unpacked from a packed keyring buffer
#[derive(Debug, Clone)]
pub struct UnpackedKeys {
    pub public_key: Vec<u8>,
    pub discovery_key: DiscoveryKey,
}

/// A loaded keyring: named networks mapped to packed key buffers
#[derive(Debug, Clone)]
pub struct Keyring {
    keys: HashMap<String, Vec<u8>>,
}

impl Keyring {
    /// Load a keyring file for an identity.
    ///
    /// The file is a JSON object of network name to hex-encoded packed key
    /// buffer. `secret` is the shared keyring secret; an empty secret is
    /// rejected before any file access.
    pub async fn load(identifier: &str, path: &Path, secret: &[u8]) -> ResolverResult<Self> {
        if secret.is_empty() {
            return Err(ResolverError::StorageUnavailable(format!(
                "empty keyring secret for {}",
                identifier
            )));
        }

        let raw = tokio::fs::read(path).await.map_err(|e| {
            ResolverError::StorageUnavailable(format!("failed to read keyring {:?}: {}", path, e))
        })?;

        let packed: HashMap<String, String> = serde_json::from_slice(&raw).map_err(|e| {
            ResolverError::StorageUnavailable(format!("failed to decode keyring {:?}: {}", path, e))
        })?;

        let mut keys = HashMap::new();
        for (network, buffer) in packed {
            let buffer = hex::decode(&buffer).map_err(|e| {
                ResolverError::StorageUnavailable(format!(
                    "bad packed key for network {}: {}",
                    network, e
                ))
            })?;
            keys.insert(network, buffer);
        }

        Ok(Self { keys })
    }

    /// Packed key buffer for a named network
    pub fn get(&self, network: &str) -> ResolverResult<&[u8]> {
        self.keys
            .get(network)
            .map(|b| b.as_slice())
            .ok_or_else(|| {
                ResolverError::StorageUnavailable(format!("network {} not in keyring", network))
            })
    }
}

/// Unpack a packed key buffer into its public and discovery keys
pub fn unpack(buffer: &[u8]) -> ResolverResult<UnpackedKeys> {
    if buffer.len() < 32 {
        return Err(ResolverError::StorageUnavailable(format!(
            "packed key buffer too short: {} bytes",
            buffer.len()
        )));
    }

    let public_key = buffer[..32].to_vec();
    let discovery_key = swarm::discovery_key(&public_key);

    Ok(UnpackedKeys {
        public_key,
        discovery_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyring");
        let network_key = "11".repeat(32);
        tokio::fs::write(&path, format!(r#"{{"resolver.test":"{}"}}"#, network_key))
            .await
            .unwrap();

        let keyring = Keyring::load("node-a", &path, b"secret").await.unwrap();
        let packed = keyring.get("resolver.test").unwrap();
        assert_eq!(packed, hex::decode(&network_key).unwrap().as_slice());

        assert!(keyring.get("unknown.network").is_err());
    }

    #[tokio::test]
    async fn test_load_rejects_empty_secret() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyring");
        tokio::fs::write(&path, "{}").await.unwrap();

        let err = Keyring::load("node-a", &path, b"").await.unwrap_err();
        assert!(matches!(err, ResolverError::StorageUnavailable(_)));
    }

    #[test]
    fn test_unpack() {
        let buffer = vec![7u8; 32];
        let unpacked = unpack(&buffer).unwrap();
        assert_eq!(unpacked.public_key, buffer);
        assert_eq!(unpacked.discovery_key, swarm::discovery_key(&buffer));

        assert!(unpack(&[0u8; 16]).is_err());
    }
}
