//! In-process document store
//!
//! `MemoryServer` plays the role of the database server: it owns the data and
//! outlives the sessions opened against it. Sessions opened before a
//! `restart()` stop working, and `set_available(false)` makes every connect
//! and every call fail, which is how outages are simulated.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::db::backend::{
    compare_values, Backend, Connector, Filter, FindQuery, Handle, Record, SortOrder, ID_FIELD,
};
use crate::error::{Result, StoreError};

/// URI scheme accepted by [`MemoryConnector`].
pub const MEMORY_SCHEME: &str = "memory://";

// == Memory Server ==
#[derive(Debug, Default)]
pub struct MemoryServer {
    collections: Mutex<HashMap<String, Vec<Record>>>,
    down: AtomicBool,
    epoch: AtomicU64,
    latency_ms: AtomicU64,
    connect_attempts: Mutex<Vec<Instant>>,
    find_calls: AtomicU64,
}

impl MemoryServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Brings the server up or down.
    pub fn set_available(&self, available: bool) {
        self.down.store(!available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        !self.down.load(Ordering::SeqCst)
    }

    /// Drops every open session; data is kept.
    pub fn restart(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Delay applied to every connect and every call.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of connect attempts seen so far.
    pub fn connect_attempts(&self) -> usize {
        self.attempt_log().len()
    }

    /// Instants at which connect attempts arrived.
    pub fn connect_times(&self) -> Vec<Instant> {
        self.attempt_log().clone()
    }

    /// Number of `find` calls served.
    pub fn find_calls(&self) -> u64 {
        self.find_calls.load(Ordering::SeqCst)
    }

    /// Number of stored documents in `collection`, bypassing sessions.
    pub fn document_count(&self, collection: &str) -> usize {
        self.data().get(collection).map_or(0, Vec::len)
    }

    fn data(&self) -> MutexGuard<'_, HashMap<String, Vec<Record>>> {
        self.collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn attempt_log(&self) -> MutexGuard<'_, Vec<Instant>> {
        self.connect_attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn simulate_latency(&self) {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

// == Connector ==
/// Opens sessions against a shared [`MemoryServer`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    server: Arc<MemoryServer>,
}

impl MemoryConnector {
    pub fn new(server: Arc<MemoryServer>) -> Self {
        Self { server }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, uri: Option<&str>) -> Result<Handle> {
        self.server.attempt_log().push(Instant::now());

        if let Some(uri) = uri {
            if !uri.starts_with(MEMORY_SCHEME) {
                return Err(StoreError::Backend(format!(
                    "unsupported connection URI scheme: {}",
                    uri.split("://").next().unwrap_or(uri)
                )));
            }
        }

        self.server.simulate_latency().await;
        if !self.server.is_available() {
            return Err(StoreError::Backend("server unavailable".to_string()));
        }

        let epoch = self.server.epoch.load(Ordering::SeqCst);
        debug!("Opened memory session at epoch {}", epoch);
        Ok(Arc::new(MemorySession {
            server: self.server.clone(),
            epoch,
        }))
    }
}

// == Session ==
#[derive(Debug)]
struct MemorySession {
    server: Arc<MemoryServer>,
    epoch: u64,
}

impl MemorySession {
    async fn check(&self) -> Result<()> {
        self.server.simulate_latency().await;
        if !self.server.is_available() {
            return Err(StoreError::Backend("server unavailable".to_string()));
        }
        if self.server.epoch.load(Ordering::SeqCst) != self.epoch {
            return Err(StoreError::Backend("connection reset by server".to_string()));
        }
        Ok(())
    }
}

fn strip_id(mut record: Record) -> Record {
    record.remove(ID_FIELD);
    record
}

fn project(record: Record, fields: &[String]) -> Record {
    record
        .into_iter()
        .filter(|(name, _)| fields.iter().any(|f| f == name))
        .collect()
}

#[async_trait]
impl Backend for MemorySession {
    async fn insert_one(&self, collection: &str, mut record: Record) -> Result<String> {
        self.check().await?;
        let id = Uuid::new_v4().to_string();
        record.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        self.server
            .data()
            .entry(collection.to_string())
            .or_default()
            .push(record);
        Ok(id)
    }

    async fn find(&self, collection: &str, query: &FindQuery) -> Result<Vec<Record>> {
        self.check().await?;
        self.server.find_calls.fetch_add(1, Ordering::SeqCst);

        let mut matched: Vec<Record> = self
            .server
            .data()
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| query.filter.matches(doc))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if !query.sort.is_empty() {
            matched.sort_by(|a, b| {
                query
                    .sort
                    .iter()
                    .map(|(field, order)| {
                        let ord = compare_values(a.get(field), b.get(field));
                        match order {
                            SortOrder::Ascending => ord,
                            SortOrder::Descending => ord.reverse(),
                        }
                    })
                    .find(|ord| ord.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(matched
            .into_iter()
            .skip(query.skip)
            .take(limit)
            .map(strip_id)
            .map(|doc| match &query.projection {
                Some(fields) => project(doc, fields),
                None => doc,
            })
            .collect())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        self.check().await?;
        Ok(self
            .server
            .data()
            .get(collection)
            .map_or(0, |docs| docs.iter().filter(|doc| filter.matches(doc)).count()) as u64)
    }

    async fn update_one(&self, collection: &str, filter: &Filter, mut patch: Record) -> Result<u64> {
        self.check().await?;
        patch.remove(ID_FIELD);

        let mut data = self.server.data();
        let target = data
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|doc| filter.matches(doc)));
        match target {
            Some(doc) => {
                doc.extend(patch);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<u64> {
        self.check().await?;

        let mut data = self.server.data();
        let Some(docs) = data.get_mut(collection) else {
            return Ok(0);
        };
        match docs.iter().position(|doc| filter.matches(doc)) {
            Some(pos) => {
                docs.remove(pos);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn ping(&self) -> Result<()> {
        self.check().await
    }
}
