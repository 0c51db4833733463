/// Resolution response envelope
use crate::did::Did;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;

/// Driver label reported in resolver metadata
pub const HTTP_DRIVER: &str = "HttpDriver";

/// Metadata about how a resolution was served
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResolverMetadata {
    pub retrieved: DateTime<Utc>,
    /// Resolution duration in milliseconds
    pub duration: u64,
    pub driver_id: String,
    pub driver: String,
}

/// JSON envelope returned for `/1.0/identifiers/:did`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResponse {
    pub did_document: Value,
    pub did_reference: Did,
    pub method_metadata: Value,
    pub resolver_metadata: ResolverMetadata,
}

impl ResolutionResponse {
    /// Assemble an envelope. Pure given its inputs; the only ambient read is
    /// the retrieval timestamp.
    pub fn assemble(did_document: Value, did: Did, start: Instant, driver_id: &str) -> Self {
        Self {
            did_document,
            did_reference: did,
            method_metadata: Value::Object(Default::default()),
            resolver_metadata: ResolverMetadata {
                retrieved: Utc::now(),
                duration: start.elapsed().as_millis() as u64,
                driver_id: driver_id.to_string(),
                driver: HTTP_DRIVER.to_string(),
            },
        }
    }
}
