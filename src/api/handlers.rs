//! API Handlers
//!
//! HTTP request handlers for the health, stats and resource endpoints.
//! Each request gets its own [`OpContext`] bounded by the request timeout.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

use crate::cache::ReadThroughCache;
use crate::config::Config;
use crate::context::OpContext;
use crate::db::{ConnectionManager, ConnectionSettings};
use crate::entity::{BulkOperationRunner, BulkResult, EntityStore, ALL_RESOURCES};
use crate::error::{Result, StoreError};
use crate::models::{
    record_body, records_by_key, CountResponse, CreateResponse, HealthResponse, ListQuery,
    MessageResponse, ResourceStats, SearchQuery, StatsResponse,
};

/// Store and bulk runner serving one resource.
pub struct ResourceService {
    pub store: Arc<EntityStore>,
    pub bulk: BulkOperationRunner,
}

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub conn: Arc<ConnectionManager>,
    pub resources: Arc<BTreeMap<&'static str, ResourceService>>,
    pub request_timeout: Duration,
}

impl AppState {
    /// Builds one cached entity store per resource over a shared connection.
    pub fn new(
        conn: Arc<ConnectionManager>,
        cache_max_size: usize,
        cache_ttl: Duration,
        request_timeout: Duration,
    ) -> Self {
        let resources = ALL_RESOURCES
            .iter()
            .map(|resource| {
                let cache = Arc::new(ReadThroughCache::new(cache_max_size, cache_ttl));
                let store = Arc::new(EntityStore::new(*resource, conn.clone(), cache));
                let service = ResourceService {
                    bulk: BulkOperationRunner::new(store.clone()),
                    store,
                };
                (resource.name, service)
            })
            .collect();

        Self {
            conn,
            resources: Arc::new(resources),
            request_timeout,
        }
    }

    /// Creates the state from configuration, picking the backing store by URI.
    pub fn from_config(config: &Config) -> Result<Self> {
        let settings = ConnectionSettings::from_config(config)?;
        let connector = settings.connector()?;
        let conn = Arc::new(ConnectionManager::new(connector, settings));
        Ok(Self::new(
            conn,
            config.cache_max_size,
            config.cache_ttl(),
            config.request_timeout(),
        ))
    }

    /// Every resource cache, for the expiry sweeper.
    pub fn caches(&self) -> Vec<Arc<ReadThroughCache>> {
        self.resources
            .values()
            .map(|service| service.store.cache().clone())
            .collect()
    }

    fn service(&self, resource: &str) -> Result<&ResourceService> {
        self.resources
            .get(resource)
            .ok_or_else(|| StoreError::not_found(resource))
    }

    fn context(&self) -> OpContext {
        OpContext::with_timeout(self.request_timeout)
    }
}

// == Service endpoints ==
/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let report = state.conn.health_check(&state.context()).await;
    Json(HealthResponse::from_report(report))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let resources = state
        .resources
        .iter()
        .map(|(name, service)| {
            let stats = ResourceStats::from(service.store.cache().stats());
            (name.to_string(), stats)
        })
        .collect();
    Json(StatsResponse { resources })
}

// == Reads ==
/// Handler for GET /:resource
///
/// Returns every record keyed by name, or one page when `page` is given.
pub async fn list_handler(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Response> {
    let service = state.service(&resource)?;
    let ctx = state.context();

    if let Some(request) = query.page_request() {
        let page = service.store.read_page(&ctx, &request).await?;
        return Ok(Json(page).into_response());
    }

    let records = service.store.read_all(&ctx).await?;
    let key_field = service.store.resource().key_field;
    Ok(Json(records_by_key(records, key_field)).into_response())
}

/// Handler for GET /:resource/count
pub async fn count_handler(
    State(state): State<AppState>,
    Path(resource): Path<String>,
) -> Result<Json<CountResponse>> {
    let service = state.service(&resource)?;
    let count = service.store.count(&state.context()).await?;
    Ok(Json(CountResponse { resource, count }))
}

/// Handler for GET /:resource/search
pub async fn search_handler(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Value>> {
    let service = state.service(&resource)?;
    let criteria = query.into_criteria()?;
    let records = service.store.search(&state.context(), &criteria).await?;
    let key_field = service.store.resource().key_field;
    Ok(Json(Value::Object(records_by_key(records, key_field))))
}

/// Handler for GET /:resource/code/:code
pub async fn code_handler(
    State(state): State<AppState>,
    Path((resource, code)): Path<(String, String)>,
) -> Result<Json<Value>> {
    let service = state.service(&resource)?;
    let record = service
        .store
        .find_by_code(&state.context(), &code)
        .await?
        .ok_or_else(|| StoreError::not_found(code))?;
    Ok(Json(Value::Object(record)))
}

/// Handler for GET /:resource/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path((resource, key)): Path<(String, String)>,
) -> Result<Json<Value>> {
    let service = state.service(&resource)?;
    let record = service.store.read_one(&state.context(), &key).await?;
    Ok(Json(Value::Object(record)))
}

// == Writes ==
/// Handler for POST /:resource
pub async fn create_handler(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<CreateResponse>)> {
    let service = state.service(&resource)?;
    let record = record_body(body)?;
    let catalog = service.store.resource();
    catalog.schema.validate_create(&record)?;

    let key = record
        .get(catalog.key_field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let id = service.store.create(&state.context(), record).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateResponse::new(catalog.name, key, id)),
    ))
}

/// Handler for PUT /:resource/:key
pub async fn update_handler(
    State(state): State<AppState>,
    Path((resource, key)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<MessageResponse>> {
    let service = state.service(&resource)?;
    let fields = record_body(body)?;
    service.store.resource().schema.validate_update(&fields)?;

    service.store.update(&state.context(), &key, fields).await?;
    Ok(Json(MessageResponse::updated(&resource, key)))
}

/// Handler for DELETE /:resource/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path((resource, key)): Path<(String, String)>,
) -> Result<Json<MessageResponse>> {
    let service = state.service(&resource)?;
    service.store.delete(&state.context(), &key).await?;
    Ok(Json(MessageResponse::deleted(&resource, key)))
}

// == Bulk ==
/// Handler for POST /:resource/bulk
pub async fn bulk_create_handler(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<BulkResult>> {
    let service = state.service(&resource)?;
    let result = service.bulk.bulk_create(&state.context(), &body).await?;
    Ok(Json(result))
}

/// Handler for PUT /:resource/bulk
pub async fn bulk_update_handler(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<BulkResult>> {
    let service = state.service(&resource)?;
    let result = service.bulk.bulk_update(&state.context(), &body).await?;
    Ok(Json(result))
}

/// Handler for DELETE /:resource/bulk
pub async fn bulk_delete_handler(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<BulkResult>> {
    let service = state.service(&resource)?;
    let result = service.bulk.bulk_delete(&state.context(), &body).await?;
    Ok(Json(result))
}
