/// DID document (DDO) model and content digests
use crate::error::ResolverResult;
use blake2::{digest::consts::U32, Blake2b, Digest};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 32-byte BLAKE2b, the content digest every driver signs over
pub type Blake2b256 = Blake2b<U32>;

/// Verification key type expected on signed documents
pub const ED25519_VERIFICATION_KEY_2018: &str = "Ed25519VerificationKey2018";

/// A public key entry in a DID document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub key_type: String,
    /// Present in the legacy document shape; stripped by the verification fallback
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key_hex: Option<String>,
}

/// Linked-data proof attached to a signed document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Proof {
    #[serde(rename = "type")]
    pub proof_type: String,
    pub creator: String,
    pub signature_value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// A resolved identity document, optionally signed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    #[serde(rename = "@context", skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub public_key: Vec<PublicKeyEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authentication: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<Proof>,
}

impl DidDocument {
    /// Content digest over the document excluding the proof itself.
    ///
    /// Serialization goes through `serde_json::Value` so key order is
    /// deterministic (sorted) for signer and verifier alike.
    pub fn digest(&self) -> ResolverResult<[u8; 32]> {
        let mut value = serde_json::to_value(self)?;
        if let Some(map) = value.as_object_mut() {
            map.remove("proof");
        }
        let bytes = serde_json::to_vec(&value)?;

        let mut hasher = Blake2b256::new();
        hasher.update(&bytes);
        Ok(hasher.finalize().into())
    }

    /// Copy of the document with the legacy `controller` property stripped
    /// from every public-key entry, for the verification fallback path.
    pub fn without_controllers(&self) -> Self {
        let mut doc = self.clone();
        for key in &mut doc.public_key {
            key.controller = None;
        }
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> DidDocument {
        DidDocument {
            context: None,
            id: "did:ara:abc".to_string(),
            public_key: vec![PublicKeyEntry {
                id: "did:ara:abc#owner".to_string(),
                key_type: ED25519_VERIFICATION_KEY_2018.to_string(),
                controller: Some("did:ara:abc".to_string()),
                owner: None,
                public_key_hex: Some("00ff".to_string()),
            }],
            authentication: vec![],
            proof: None,
        }
    }

    #[test]
    fn test_digest_excludes_proof() {
        let unsigned = sample_document();
        let mut signed = unsigned.clone();
        signed.proof = Some(Proof {
            proof_type: ED25519_VERIFICATION_KEY_2018.to_string(),
            creator: "did:ara:abc#owner".to_string(),
            signature_value: "aa".repeat(64),
            nonce: None,
            created: None,
            domain: None,
        });

        assert_eq!(unsigned.digest().unwrap(), signed.digest().unwrap());
    }

    #[test]
    fn test_digest_changes_with_content() {
        let doc = sample_document();
        let mut mutated = doc.clone();
        mutated.public_key[0].public_key_hex = Some("00fe".to_string());
        assert_ne!(doc.digest().unwrap(), mutated.digest().unwrap());
    }

    #[test]
    fn test_without_controllers() {
        let doc = sample_document();
        let stripped = doc.without_controllers();
        assert!(stripped.public_key.iter().all(|k| k.controller.is_none()));
        assert_ne!(doc.digest().unwrap(), stripped.digest().unwrap());
    }

    #[test]
    fn test_serde_camel_case() {
        let doc = sample_document();
        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("\"publicKey\""));
        assert!(json.contains("\"publicKeyHex\""));
        let back: DidDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }
}
