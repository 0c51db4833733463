/// Binary codec for cached values
///
/// An entry is an 8-byte big-endian TTL (epoch milliseconds) followed by the
/// raw value bytes. This is the wire and storage format shared by the local
/// store and every replicated peer, so all participants must agree on it
/// bit-for-bit.
use crate::error::{ResolverError, ResolverResult};
use std::time::{SystemTime, UNIX_EPOCH};

const TTL_HEADER_LEN: usize = 8;

/// Current time in epoch milliseconds
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A cached value with an expiry horizon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub value: Vec<u8>,
    /// Expiry timestamp in epoch milliseconds
    pub ttl: u64,
}

impl Entry {
    /// Create an entry expiring `cache_ttl` milliseconds from now
    pub fn new(value: Vec<u8>, cache_ttl: u64) -> Self {
        Self {
            value,
            ttl: now_millis() + cache_ttl,
        }
    }

    /// Create an entry with an explicit expiry timestamp
    pub fn with_ttl(value: Vec<u8>, ttl: u64) -> Self {
        Self { value, ttl }
    }

    /// An entry is expired once its TTL is no longer in the future
    pub fn expired(&self, now: u64) -> bool {
        self.ttl <= now
    }

    /// Encode to the shared binary form
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(TTL_HEADER_LEN + self.value.len());
        buffer.extend_from_slice(&self.ttl.to_be_bytes());
        buffer.extend_from_slice(&self.value);
        buffer
    }

    /// Decode from the shared binary form.
    ///
    /// Total over any input of at least 8 bytes; shorter input is corrupt.
    pub fn decode(buffer: &[u8]) -> ResolverResult<Self> {
        if buffer.len() < TTL_HEADER_LEN {
            return Err(ResolverError::CorruptEntry(buffer.len()));
        }

        let mut header = [0u8; TTL_HEADER_LEN];
        header.copy_from_slice(&buffer[..TTL_HEADER_LEN]);

        Ok(Self {
            ttl: u64::from_be_bytes(header),
            value: buffer[TTL_HEADER_LEN..].to_vec(),
        })
    }
}
