/// DID URI parsing (`did:<method>:<identifier>[#fragment]`)
use crate::error::{ResolverError, ResolverResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A parsed decentralized identifier, immutable once parsed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Did {
    /// Method tag, e.g. "ara"
    pub method: String,
    /// Method-specific opaque identifier
    pub identifier: String,
    /// Optional fragment after '#'
    pub fragment: Option<String>,
    /// Full original URI
    pub reference: String,
}

impl Did {
    /// Parse a DID URI string
    pub fn parse(uri: &str) -> ResolverResult<Self> {
        let reference = uri.to_string();

        let rest = uri
            .strip_prefix("did:")
            .ok_or_else(|| ResolverError::InvalidDid(reference.clone()))?;

        let (rest, fragment) = match rest.split_once('#') {
            Some((head, frag)) if !frag.is_empty() => (head, Some(frag.to_string())),
            Some((head, _)) => (head, None),
            None => (rest, None),
        };

        let (method, identifier) = rest
            .split_once(':')
            .ok_or_else(|| ResolverError::InvalidDid(reference.clone()))?;

        if method.is_empty()
            || identifier.is_empty()
            || !method.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(ResolverError::InvalidDid(reference));
        }

        Ok(Self {
            method: method.to_string(),
            identifier: identifier.to_string(),
            fragment,
            reference,
        })
    }

    /// The root DID without any fragment (`did:<method>:<identifier>`)
    pub fn did(&self) -> String {
        format!("did:{}:{}", self.method, self.identifier)
    }
}

/// Length of a hex-encoded 32-byte public key identifier
pub const HEX_IDENTIFIER_LENGTH: usize = 64;

/// Whether an identifier is a bare lowercase-hex public key. Anything else
/// must never be used as a filesystem path component: identifiers arrive
/// from the network and may contain separators.
pub fn is_hex_identifier(identifier: &str) -> bool {
    identifier.len() == HEX_IDENTIFIER_LENGTH
        && identifier
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reference)
    }
}
