//! Geo Catalog - cities, countries and states over a document store
//!
//! A resilient connection manager with retry and backoff, a bounded TTL
//! read-through cache, natural-key entity stores and a partial-failure
//! bulk runner, served over HTTP.

pub mod api;
pub mod cache;
pub mod config;
pub mod context;
pub mod db;
pub mod entity;
pub mod error;
pub mod models;
pub mod tasks;
pub mod validation;

pub use api::{create_router, AppState};
pub use config::Config;
pub use context::{CancellationToken, OpContext};
pub use error::{Result, StoreError};
pub use tasks::spawn_sweeper_task;
