//! Database Module
//!
//! Backing-store contract, the resilient connection manager, and the
//! in-process and MongoDB stores behind it.

mod backend;
mod connection;
mod memory;
mod mongo;

// Re-export public types
pub use backend::{
    compare_values, Backend, Connector, Filter, FindQuery, Handle, Record, SortOrder, ID_FIELD,
};
pub use connection::{ConnectionManager, ConnectionSettings, HealthReport};
pub use memory::{MemoryConnector, MemoryServer, MEMORY_SCHEME};
pub use mongo::MongoConnector;
