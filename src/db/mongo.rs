//! MongoDB backend
//!
//! Sessions over the `mongodb` driver for `mongodb://` and `mongodb+srv://`
//! URIs. Records keep a UUID string in `_id`, as the in-process store does.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::{self, doc, Bson, Document};
use mongodb::options::{ClientOptions, FindOptions};
use mongodb::{Client, Collection, Database};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::db::backend::{
    Backend, Connector, Filter, FindQuery, Handle, Record, SortOrder, ID_FIELD,
};
use crate::error::{Result, StoreError};

/// Database used when the URI names none.
pub const DEFAULT_DATABASE: &str = "geo_catalog";

const MONGO_SCHEMES: [&str; 2] = ["mongodb://", "mongodb+srv://"];

/// True for URIs the MongoDB driver understands.
pub fn is_mongo_uri(uri: &str) -> bool {
    MONGO_SCHEMES.iter().any(|scheme| uri.starts_with(scheme))
}

fn driver_error(err: mongodb::error::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

// == Connector ==
/// Opens driver sessions; each `connect` builds a fresh client.
#[derive(Debug, Clone)]
pub struct MongoConnector {
    server_selection_timeout: Duration,
}

impl MongoConnector {
    pub fn new(server_selection_timeout: Duration) -> Self {
        Self {
            server_selection_timeout,
        }
    }
}

#[async_trait]
impl Connector for MongoConnector {
    async fn connect(&self, uri: Option<&str>) -> Result<Handle> {
        let uri = uri.filter(|uri| is_mongo_uri(uri)).ok_or_else(|| {
            StoreError::Config("a mongodb:// or mongodb+srv:// URI is required".to_string())
        })?;

        let mut options = ClientOptions::parse(uri).await.map_err(driver_error)?;
        options.server_selection_timeout = Some(self.server_selection_timeout);
        options
            .app_name
            .get_or_insert_with(|| DEFAULT_DATABASE.to_string());

        let client = Client::with_options(options).map_err(driver_error)?;
        let db = client
            .default_database()
            .unwrap_or_else(|| client.database(DEFAULT_DATABASE));
        debug!("Opened MongoDB session on database '{}'", db.name());
        Ok(Arc::new(MongoSession { db }))
    }
}

// == Session ==
struct MongoSession {
    db: Database,
}

impl MongoSession {
    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection(name)
    }
}

#[async_trait]
impl Backend for MongoSession {
    async fn insert_one(&self, collection: &str, mut record: Record) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        record.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        let document = to_document(&record)?;
        self.collection(collection)
            .insert_one(document, None)
            .await
            .map_err(driver_error)?;
        Ok(id)
    }

    async fn find(&self, collection: &str, query: &FindQuery) -> Result<Vec<Record>> {
        let filter = filter_document(&query.filter)?;
        let mut cursor = self
            .collection(collection)
            .find(filter, find_options(query))
            .await
            .map_err(driver_error)?;

        let mut records = Vec::new();
        while cursor.advance().await.map_err(driver_error)? {
            let document = cursor.deserialize_current().map_err(driver_error)?;
            records.push(record_from_document(document));
        }
        Ok(records)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        self.collection(collection)
            .count_documents(filter_document(filter)?, None)
            .await
            .map_err(driver_error)
    }

    async fn update_one(&self, collection: &str, filter: &Filter, mut patch: Record) -> Result<u64> {
        patch.remove(ID_FIELD);
        let filter = filter_document(filter)?;

        // `$set` rejects an empty document; report the match alone.
        if patch.is_empty() {
            let found = self
                .collection(collection)
                .find_one(filter, None)
                .await
                .map_err(driver_error)?;
            return Ok(u64::from(found.is_some()));
        }

        let result = self
            .collection(collection)
            .update_one(filter, doc! { "$set": to_document(&patch)? }, None)
            .await
            .map_err(driver_error)?;
        Ok(result.matched_count)
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let result = self
            .collection(collection)
            .delete_one(filter_document(filter)?, None)
            .await
            .map_err(driver_error)?;
        Ok(result.deleted_count)
    }

    async fn ping(&self) -> Result<()> {
        self.db
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(driver_error)?;
        Ok(())
    }
}

// == Conversions ==
fn to_document(record: &Record) -> Result<Document> {
    bson::to_document(record)
        .map_err(|err| StoreError::Backend(format!("cannot encode record: {}", err)))
}

fn filter_document(filter: &Filter) -> Result<Document> {
    to_document(filter.fields())
}

/// Driver options for `query`; `_id` is always projected away.
fn find_options(query: &FindQuery) -> FindOptions {
    let mut options = FindOptions::default();

    if !query.sort.is_empty() {
        let mut sort = Document::new();
        for (field, order) in &query.sort {
            let direction = match order {
                SortOrder::Ascending => 1,
                SortOrder::Descending => -1,
            };
            sort.insert(field.clone(), direction);
        }
        options.sort = Some(sort);
    }

    let mut projection = Document::new();
    projection.insert(ID_FIELD, 0);
    for field in query.projection.iter().flatten() {
        projection.insert(field.clone(), 1);
    }
    options.projection = Some(projection);

    if query.skip > 0 {
        options.skip = Some(query.skip as u64);
    }
    options.limit = query
        .limit
        .map(|limit| i64::try_from(limit).unwrap_or(i64::MAX));
    options
}

fn record_from_document(mut document: Document) -> Record {
    document.remove(ID_FIELD);
    match Bson::Document(document).into_relaxed_extjson() {
        Value::Object(record) => record,
        _ => Record::new(),
    }
}
