/// Method-specific resolution drivers
///
/// A driver resolves one DID method. The registry is populated at startup;
/// an unknown method is a normal lookup miss, surfaced as Not Implemented by
/// the HTTP layer rather than an error here.
pub mod ara;

use crate::did::Did;
use crate::document::DidDocument;
use crate::error::ResolverResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

#[async_trait]
pub trait Driver: Send + Sync {
    /// Resolve a DID to its document. `Ok(None)` means the method handled
    /// the identifier but found nothing.
    async fn resolve(&self, did: &Did) -> ResolverResult<Option<DidDocument>>;
}

#[derive(Default)]
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn Driver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, method: &str, driver: Arc<dyn Driver>) {
        self.drivers.insert(method.to_string(), driver);
    }

    pub fn get(&self, method: &str) -> Option<Arc<dyn Driver>> {
        self.drivers.get(method).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullDriver;

    #[async_trait]
    impl Driver for NullDriver {
        async fn resolve(&self, _did: &Did) -> ResolverResult<Option<DidDocument>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_unknown_method_is_a_miss() {
        let mut registry = DriverRegistry::new();
        registry.register("ara", Arc::new(NullDriver));

        assert!(registry.get("ara").is_some());
        assert!(registry.get("xyz").is_none());
    }
}
