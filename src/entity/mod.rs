//! Entity Module
//!
//! Resource catalog, natural-key CRUD store and the bulk runner on top of it.

mod bulk;
mod resource;
mod store;

// Re-export public types
pub use bulk::{BatchItemError, BulkOperationRunner, BulkResult};
pub use resource::{Resource, ALL_RESOURCES, CITIES, COUNTRIES, STATES};
pub use store::{EntityStore, Page, PageRequest, SearchCriteria, MAX_PAGE_LIMIT};
