//! API Module
//!
//! HTTP handlers and routing for the catalog REST API.
//!
//! # Endpoints
//! - `GET /health` - Store connectivity check
//! - `GET /stats` - Cache statistics per resource
//! - `GET|POST /:resource` - List (optionally paged) or create
//! - `GET /:resource/count`, `/:resource/search`, `/:resource/code/:code`
//! - `GET|PUT|DELETE /:resource/:key` - Single record by natural key
//! - `POST|PUT|DELETE /:resource/bulk` - Batch create, update or delete

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
