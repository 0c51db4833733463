pub mod cache;
pub mod channel;
pub mod config;
pub mod context;
pub mod did;
pub mod document;
pub mod drivers;
pub mod error;
pub mod identity;
pub mod identity_store;
pub mod keyring;
pub mod resolver;
pub mod response;
pub mod server;
pub mod swarm;

pub use error::{ResolverError, ResolverResult};
pub use resolver::{Resolver, ResolverState};
