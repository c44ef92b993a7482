//! Bulk Operation Runner
//!
//! Applies a batch of creates, updates or deletes to one entity store,
//! continuing past items that fail on their own.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::context::OpContext;
use crate::db::Record;
use crate::entity::EntityStore;
use crate::error::{Result, StoreError};

// == Result types ==
/// One failed item of a batch.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BatchItemError {
    /// Position in the submitted batch
    pub index: usize,
    /// Natural key of the item, when one could be read
    pub key: Option<String>,
    pub error: String,
}

/// Tally of a batch, built in input order.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct BulkResult {
    pub success_count: usize,
    pub failed_count: usize,
    pub errors: Vec<BatchItemError>,
    /// Generated ids of successful creates, in input order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub created_ids: Vec<String>,
}

impl BulkResult {
    fn record_failure(&mut self, index: usize, key: Option<String>, err: &StoreError) {
        self.failed_count += 1;
        self.errors.push(BatchItemError {
            index,
            key,
            error: err.to_string(),
        });
    }
}

#[derive(Debug, Clone, Copy)]
enum BulkKind {
    Create,
    Update,
    Delete,
}

impl BulkKind {
    fn verb(self) -> &'static str {
        match self {
            BulkKind::Create => "create",
            BulkKind::Update => "update",
            BulkKind::Delete => "delete",
        }
    }
}

// == Bulk Operation Runner ==
pub struct BulkOperationRunner {
    store: Arc<EntityStore>,
}

impl BulkOperationRunner {
    pub fn new(store: Arc<EntityStore>) -> Self {
        Self { store }
    }

    /// Creates every record object in `items`.
    pub async fn bulk_create(&self, ctx: &OpContext, items: &Value) -> Result<BulkResult> {
        self.run(ctx, items, BulkKind::Create).await
    }

    /// Applies `{"key": ..., "fields": {...}}` items (`id` accepted for `key`).
    pub async fn bulk_update(&self, ctx: &OpContext, items: &Value) -> Result<BulkResult> {
        self.run(ctx, items, BulkKind::Update).await
    }

    /// Deletes items given as a key string or `{"key": ...}`.
    pub async fn bulk_delete(&self, ctx: &OpContext, items: &Value) -> Result<BulkResult> {
        self.run(ctx, items, BulkKind::Delete).await
    }

    async fn run(&self, ctx: &OpContext, items: &Value, kind: BulkKind) -> Result<BulkResult> {
        let items = items
            .as_array()
            .ok_or_else(|| StoreError::Validation("Records must be a list".to_string()))?;
        let name = self.store.resource().name;
        let mut result = BulkResult::default();

        for (index, item) in items.iter().enumerate() {
            let key = item_key(item);
            let outcome = match kind {
                BulkKind::Create => self.create_item(ctx, item).await.map(Some),
                BulkKind::Update => self.update_item(ctx, item).await.map(|_| None),
                BulkKind::Delete => self.delete_item(ctx, item).await.map(|_| None),
            };

            match outcome {
                Ok(id) => {
                    result.success_count += 1;
                    result.created_ids.extend(id);
                }
                Err(err) if err.is_item_recoverable() => {
                    warn!("Bulk {} of {} item {} failed: {}", kind.verb(), name, index, err);
                    result.record_failure(index, key, &err);
                }
                Err(err) => {
                    warn!(
                        "Bulk {} of {} aborted at item {} after {} succeeded: {}",
                        kind.verb(),
                        name,
                        index,
                        result.success_count,
                        err
                    );
                    return Err(err);
                }
            }
        }

        info!(
            "Bulk {} of {}: {} succeeded, {} failed",
            kind.verb(),
            name,
            result.success_count,
            result.failed_count
        );
        Ok(result)
    }

    async fn create_item(&self, ctx: &OpContext, item: &Value) -> Result<String> {
        let record = as_record(item, "Each record must be an object")?;
        self.store.resource().schema.validate_create(record)?;
        self.store.create(ctx, record.clone()).await
    }

    async fn update_item(&self, ctx: &OpContext, item: &Value) -> Result<()> {
        let object = as_record(item, "Each update must be an object")?;
        let key = required_key(item)?;
        let fields = object
            .get("fields")
            .and_then(Value::as_object)
            .ok_or_else(|| StoreError::Validation("fields must be an object".to_string()))?;
        self.store.resource().schema.validate_update(fields)?;
        self.store.update(ctx, key, fields.clone()).await
    }

    async fn delete_item(&self, ctx: &OpContext, item: &Value) -> Result<()> {
        let key = required_key(item)?;
        self.store.delete(ctx, key).await
    }
}

fn as_record<'a>(item: &'a Value, message: &str) -> Result<&'a Record> {
    item.as_object()
        .ok_or_else(|| StoreError::Validation(message.to_string()))
}

/// Key an item addresses: a bare string, or `key`/`id`/`name` of an object.
fn item_key(item: &Value) -> Option<String> {
    match item {
        Value::String(key) => Some(key.clone()),
        Value::Object(object) => ["key", "id", "name"]
            .iter()
            .find_map(|field| object.get(*field).and_then(Value::as_str))
            .map(str::to_string),
        _ => None,
    }
}

fn required_key(item: &Value) -> Result<&str> {
    let key = match item {
        Value::String(key) => Some(key.as_str()),
        Value::Object(object) => object
            .get("key")
            .or_else(|| object.get("id"))
            .and_then(Value::as_str),
        _ => None,
    };
    key.filter(|key| !key.trim().is_empty())
        .ok_or_else(|| StoreError::Validation("Each item needs a non-empty key".to_string()))
}
