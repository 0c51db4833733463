/// Node identity: the DID, key material, and keyring of this resolver
use crate::error::{ResolverError, ResolverResult};
use crate::{did::Did, keyring::Keyring};
use blake2::{digest::consts::U32, Blake2b, Digest};
use ed25519_dalek::SigningKey;
use std::path::PathBuf;
use tokio::sync::OnceCell;

/// Relative path of the signing-key keystore inside an identity directory
const KEYSTORE_PATH: &str = "keystore/ara";

/// Key material loaded once `ready()` resolves
struct Material {
    signing_key: SigningKey,
    keyring: Keyring,
}

pub struct Identity {
    pub did: Did,
    /// 64-hex-character public key identifier
    pub identifier: String,
    pub public_key: Vec<u8>,
    /// BLAKE2b digest of the passphrase, never the raw bytes
    password_digest: [u8; 32],
    identity_root: PathBuf,
    keyring_path: PathBuf,
    secret: Vec<u8>,
    material: OnceCell<Material>,
}

impl Identity {
    pub fn new(
        identifier: &str,
        password: &str,
        identity_root: PathBuf,
        keyring_path: PathBuf,
        secret: Vec<u8>,
    ) -> ResolverResult<Self> {
        // accept both bare identifiers and full DID URIs
        let did = if identifier.starts_with("did:") {
            Did::parse(identifier)?
        } else {
            Did::parse(&format!("did:ara:{}", identifier))?
        };

        let public_key = hex::decode(&did.identifier)
            .map_err(|_| ResolverError::InvalidDid(did.reference.clone()))?;
        if public_key.len() != 32 {
            return Err(ResolverError::InvalidDid(did.reference.clone()));
        }

        let mut hasher = Blake2b::<U32>::new();
        hasher.update(password.as_bytes());
        let password_digest = hasher.finalize().into();

        Ok(Self {
            identifier: did.identifier.clone(),
            did,
            public_key,
            password_digest,
            identity_root,
            keyring_path,
            secret,
            material: OnceCell::new(),
        })
    }

    /// Load the signing key and keyring. Memoized: concurrent callers all
    /// await the same single initialization, later calls return the first
    /// outcome. Failure here is fatal to node startup.
    pub async fn ready(&self) -> ResolverResult<()> {
        self.material
            .get_or_try_init(|| async {
                let keystore_path = self
                    .identity_root
                    .join(&self.identifier)
                    .join(KEYSTORE_PATH);

                let raw = tokio::fs::read(&keystore_path).await.map_err(|e| {
                    ResolverError::StorageUnavailable(format!(
                        "failed to read keystore {:?}: {}",
                        keystore_path, e
                    ))
                })?;

                let seed = hex::decode(String::from_utf8_lossy(&raw).trim()).map_err(|e| {
                    ResolverError::StorageUnavailable(format!("bad keystore encoding: {}", e))
                })?;
                let seed: [u8; 32] = seed.try_into().map_err(|_| {
                    ResolverError::StorageUnavailable("keystore seed must be 32 bytes".to_string())
                })?;
                let signing_key = SigningKey::from_bytes(&seed);

                let keyring =
                    Keyring::load(&self.identifier, &self.keyring_path, &self.secret).await?;

                Ok::<_, ResolverError>(Material {
                    signing_key,
                    keyring,
                })
            })
            .await?;

        Ok(())
    }

    /// Keyring handle; only valid after `ready()`
    pub fn keyring(&self) -> ResolverResult<&Keyring> {
        self.material
            .get()
            .map(|m| &m.keyring)
            .ok_or_else(|| ResolverError::Internal("identity not ready".to_string()))
    }

    /// Signing key for self-signed documents; only valid after `ready()`
    pub fn signing_key(&self) -> ResolverResult<&SigningKey> {
        self.material
            .get()
            .map(|m| &m.signing_key)
            .ok_or_else(|| ResolverError::Internal("identity not ready".to_string()))
    }

    /// The hashed passphrase, for collaborators that derive keys from it
    pub fn password_digest(&self) -> &[u8; 32] {
        &self.password_digest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write_identity_fixture(identifier: &str, dir: &std::path::Path) {
        let keystore_dir = dir.join(identifier).join("keystore");
        tokio::fs::create_dir_all(&keystore_dir).await.unwrap();
        tokio::fs::write(keystore_dir.join("ara"), "42".repeat(32))
            .await
            .unwrap();
        tokio::fs::write(
            dir.join("keyring"),
            format!(r#"{{"resolver.test":"{}"}}"#, "11".repeat(32)),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_ready_loads_material() {
        let dir = tempfile::tempdir().unwrap();
        let identifier = "ab".repeat(32);
        write_identity_fixture(&identifier, dir.path()).await;

        let identity = Identity::new(
            &identifier,
            "passphrase",
            dir.path().to_path_buf(),
            dir.path().join("keyring"),
            b"secret".to_vec(),
        )
        .unwrap();

        assert!(identity.signing_key().is_err());

        identity.ready().await.unwrap();
        identity.ready().await.unwrap(); // idempotent

        assert!(identity.signing_key().is_ok());
        assert!(identity.keyring().unwrap().get("resolver.test").is_ok());
        assert_eq!(identity.did.method, "ara");
        assert_eq!(identity.public_key.len(), 32);
    }

    #[tokio::test]
    async fn test_ready_fails_without_keystore() {
        let dir = tempfile::tempdir().unwrap();
        let identity = Identity::new(
            &"cd".repeat(32),
            "passphrase",
            dir.path().to_path_buf(),
            dir.path().join("keyring"),
            b"secret".to_vec(),
        )
        .unwrap();

        assert!(matches!(
            identity.ready().await,
            Err(ResolverError::StorageUnavailable(_))
        ));
    }

    #[test]
    fn test_rejects_short_identifier() {
        let dir = std::path::PathBuf::from("/tmp");
        let err = Identity::new("abcd", "pw", dir.clone(), dir.join("k"), b"s".to_vec());
        assert!(err.is_err());
    }
}
