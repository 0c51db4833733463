/// Shared request-handling state
use crate::{cache::Cache, config::ResolverConfig, drivers::DriverRegistry, identity::Identity};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

/// State threaded through every HTTP handler
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ResolverConfig>,
    pub cache: Arc<Cache>,
    pub drivers: Arc<DriverRegistry>,
    /// Node identity; absent in embedded setups, which makes the
    /// well-known document route respond Not Implemented
    pub identity: Option<Arc<Identity>>,
    /// Identifiers with a preemptive refresh in flight
    refreshing: Arc<Mutex<HashSet<String>>>,
}

impl AppContext {
    pub fn new(
        config: Arc<ResolverConfig>,
        cache: Arc<Cache>,
        drivers: Arc<DriverRegistry>,
        identity: Option<Arc<Identity>>,
    ) -> Self {
        Self {
            config,
            cache,
            drivers,
            identity,
            refreshing: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Mark a refresh as in flight; false when one already is
    pub async fn begin_refresh(&self, identifier: &str) -> bool {
        self.refreshing.lock().await.insert(identifier.to_string())
    }

    /// Clear the in-flight marker, in success and error continuations alike
    pub async fn end_refresh(&self, identifier: &str) {
        self.refreshing.lock().await.remove(identifier);
    }
}
