//! Entity Store
//!
//! CRUD against one collection, addressed by natural key and fronted by a
//! read-through cache.
//!
//! Two identities coexist: `create` returns the store-generated id as an
//! acknowledgement, while every later read, update and delete addresses the
//! record by its natural key (`Resource::key_field`).

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::cache::ReadThroughCache;
use crate::context::OpContext;
use crate::db::{ConnectionManager, Filter, FindQuery, Record, SortOrder};
use crate::entity::Resource;
use crate::error::{Result, StoreError};

/// Largest page `read_page` serves.
pub const MAX_PAGE_LIMIT: usize = 100;

// == Query types ==
/// Filters for [`EntityStore::search`]; all present criteria must match.
#[derive(Debug, Clone, Default)]
pub struct SearchCriteria {
    /// Case-insensitive substring of the natural key
    pub name: Option<String>,
    /// Case-insensitive exact match on the code field
    pub code: Option<String>,
    /// Case-insensitive substring of the resource's extra field
    pub extra: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PageRequest {
    /// 1-based page number
    pub page: usize,
    pub limit: usize,
    /// Defaults to the natural key
    pub sort_by: Option<String>,
    pub order: SortOrder,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 50,
            sort_by: None,
            order: SortOrder::Ascending,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub records: Vec<Record>,
    pub page: usize,
    pub limit: usize,
    pub total: u64,
    pub pages: u64,
}

// == Entity Store ==
pub struct EntityStore {
    resource: Resource,
    conn: Arc<ConnectionManager>,
    cache: Arc<ReadThroughCache>,
}

impl EntityStore {
    pub fn new(
        resource: Resource,
        conn: Arc<ConnectionManager>,
        cache: Arc<ReadThroughCache>,
    ) -> Self {
        Self {
            resource,
            conn,
            cache,
        }
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn cache(&self) -> &Arc<ReadThroughCache> {
        &self.cache
    }

    fn key_filter(&self, key: &str) -> Filter {
        Filter::eq(self.resource.key_field, key)
    }

    /// Natural key of `record`, if it has a string one.
    fn key_of<'a>(&self, record: &'a Record) -> Option<&'a str> {
        record.get(self.resource.key_field).and_then(Value::as_str)
    }

    /// Natural key carried by `fields`, rejecting non-string and blank values.
    fn key_in<'a>(&self, fields: &'a Record) -> Result<Option<&'a str>> {
        match fields.get(self.resource.key_field) {
            None => Ok(None),
            Some(Value::String(key)) if !key.trim().is_empty() => Ok(Some(key.as_str())),
            Some(_) => Err(StoreError::Validation(format!(
                "{} must be a non-empty string",
                self.resource.key_field
            ))),
        }
    }

    async fn find(&self, ctx: &OpContext, query: FindQuery) -> Result<Vec<Record>> {
        let collection = self.resource.collection;
        self.conn
            .guarded_call(ctx, |db| async move { db.find(collection, &query).await })
            .await
    }

    async fn find_by_key(&self, ctx: &OpContext, key: &str) -> Result<Option<Record>> {
        let query = FindQuery::new(self.key_filter(key)).limit(1);
        Ok(self.find(ctx, query).await?.into_iter().next())
    }

    async fn count_matching(&self, ctx: &OpContext, filter: Filter) -> Result<u64> {
        let collection = self.resource.collection;
        self.conn
            .guarded_call(ctx, |db| async move { db.count(collection, &filter).await })
            .await
    }

    async fn insert(&self, ctx: &OpContext, record: Record) -> Result<String> {
        let collection = self.resource.collection;
        self.conn
            .guarded_call(ctx, |db| async move { db.insert_one(collection, record).await })
            .await
    }

    async fn delete_by_key(&self, ctx: &OpContext, key: &str) -> Result<u64> {
        let collection = self.resource.collection;
        let filter = self.key_filter(key);
        self.conn
            .guarded_call(ctx, |db| async move { db.delete_one(collection, &filter).await })
            .await
    }

    // == Read All ==
    /// Every record in the collection, read from the store.
    ///
    /// Never served from the cache; each returned record is cached on the
    /// way out unless a write invalidated something meanwhile.
    pub async fn read_all(&self, ctx: &OpContext) -> Result<Vec<Record>> {
        let ticket = self.cache.ticket();
        let records = self
            .find(
                ctx,
                FindQuery::default().sort_by(self.resource.key_field, SortOrder::Ascending),
            )
            .await?;

        for record in &records {
            if let Some(key) = self.key_of(record) {
                if !self.cache.fill_if_current(key, record, ticket) {
                    break;
                }
            }
        }
        Ok(records)
    }

    // == Read One ==
    /// The record for `key`, from the cache when fresh, else from the store.
    pub async fn read_one(&self, ctx: &OpContext, key: &str) -> Result<Record> {
        if let Some(record) = self.cache.get(key) {
            debug!("{} cache hit for '{}'", self.resource.name, key);
            return Ok(record);
        }

        let ticket = self.cache.ticket();
        let record = self
            .find_by_key(ctx, key)
            .await?
            .ok_or_else(|| StoreError::not_found(key))?;
        self.cache.fill_if_current(key, &record, ticket);
        Ok(record)
    }

    // == Create ==
    /// Inserts a new record and returns its generated id.
    pub async fn create(&self, ctx: &OpContext, fields: Record) -> Result<String> {
        let key = self.key_in(&fields)?.ok_or_else(|| {
            StoreError::Validation(format!(
                "Missing required fields: {}",
                self.resource.key_field
            ))
        })?;
        let key = key.to_string();

        if self.count_matching(ctx, self.key_filter(&key)).await? > 0 {
            return Err(StoreError::Validation(format!(
                "{} '{}' already exists",
                self.resource.name, key
            )));
        }

        let id = self.insert(ctx, fields).await?;
        self.cache.invalidate(&key);
        info!("Created {} '{}' ({})", self.resource.name, key, id);
        Ok(id)
    }

    // == Update ==
    /// Merges `fields` into the record for `key`.
    ///
    /// When `fields` carries a different natural key the record is renamed:
    /// the old record is deleted and a merged one inserted. The rename is not
    /// atomic; if the insert fails the record is gone and is logged in full.
    pub async fn update(&self, ctx: &OpContext, key: &str, fields: Record) -> Result<()> {
        let renamed_to = self
            .key_in(&fields)?
            .filter(|new_key| *new_key != key)
            .map(str::to_string);
        match renamed_to {
            Some(new_key) => self.rename(ctx, key, &new_key, fields).await,
            None => self.update_in_place(ctx, key, fields).await,
        }
    }

    async fn update_in_place(&self, ctx: &OpContext, key: &str, fields: Record) -> Result<()> {
        let collection = self.resource.collection;
        let filter = self.key_filter(key);
        let matched = self
            .conn
            .guarded_call(ctx, |db| async move {
                db.update_one(collection, &filter, fields).await
            })
            .await?;

        // Invalidate without refilling so the next read is a real round-trip.
        self.cache.invalidate(key);
        if matched == 0 {
            return Err(StoreError::not_found(key));
        }
        debug!("Updated {} '{}'", self.resource.name, key);
        Ok(())
    }

    async fn rename(
        &self,
        ctx: &OpContext,
        old_key: &str,
        new_key: &str,
        fields: Record,
    ) -> Result<()> {
        let existing = self
            .find_by_key(ctx, old_key)
            .await?
            .ok_or_else(|| StoreError::not_found(old_key))?;

        if self.count_matching(ctx, self.key_filter(new_key)).await? > 0 {
            return Err(StoreError::Validation(format!(
                "{} '{}' already exists",
                self.resource.name, new_key
            )));
        }

        let mut merged = existing;
        merged.extend(fields);

        let deleted = self.delete_by_key(ctx, old_key).await?;
        self.cache.invalidate(old_key);
        if deleted == 0 {
            return Err(StoreError::not_found(old_key));
        }

        match self.insert(ctx, merged.clone()).await {
            Ok(_) => {
                self.cache.invalidate(new_key);
                info!(
                    "Renamed {} '{}' to '{}'",
                    self.resource.name, old_key, new_key
                );
                Ok(())
            }
            Err(err) => {
                let lost = serde_json::Value::Object(merged).to_string();
                error!(
                    "Rename of {} '{}' to '{}' lost the record after delete: {} (record: {})",
                    self.resource.name, old_key, new_key, err, lost
                );
                Err(err)
            }
        }
    }

    // == Delete ==
    pub async fn delete(&self, ctx: &OpContext, key: &str) -> Result<()> {
        let deleted = self.delete_by_key(ctx, key).await?;
        self.cache.invalidate(key);
        if deleted == 0 {
            return Err(StoreError::not_found(key));
        }
        info!("Deleted {} '{}'", self.resource.name, key);
        Ok(())
    }

    // == Supplementary reads ==
    /// Number of records in the collection.
    pub async fn count(&self, ctx: &OpContext) -> Result<u64> {
        self.count_matching(ctx, Filter::all()).await
    }

    /// First record whose code field equals `code`, ignoring case.
    pub async fn find_by_code(&self, ctx: &OpContext, code: &str) -> Result<Option<Record>> {
        let target = code.trim();
        if target.is_empty() {
            return Ok(None);
        }
        let code_field = self.resource.code_field;
        let records = self.find(ctx, FindQuery::default()).await?;
        Ok(records.into_iter().find(|record| {
            record
                .get(code_field)
                .and_then(Value::as_str)
                .map_or(false, |code| code.eq_ignore_ascii_case(target))
        }))
    }

    /// Records matching every present criterion.
    pub async fn search(&self, ctx: &OpContext, criteria: &SearchCriteria) -> Result<Vec<Record>> {
        if criteria.extra.is_some() && self.resource.extra_field.is_none() {
            warn!(
                "{} has no extra search field, ignoring that criterion",
                self.resource.name
            );
        }

        let records = self
            .find(
                ctx,
                FindQuery::default().sort_by(self.resource.key_field, SortOrder::Ascending),
            )
            .await?;
        Ok(records
            .into_iter()
            .filter(|record| self.matches(record, criteria))
            .collect())
    }

    fn matches(&self, record: &Record, criteria: &SearchCriteria) -> bool {
        let text = |field: &str| {
            record
                .get(field)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_lowercase()
        };

        if let Some(name) = &criteria.name {
            if !text(self.resource.key_field).contains(&name.to_lowercase()) {
                return false;
            }
        }
        if let Some(code) = &criteria.code {
            if !text(self.resource.code_field).eq_ignore_ascii_case(code.trim()) {
                return false;
            }
        }
        if let (Some(extra), Some(field)) = (&criteria.extra, self.resource.extra_field) {
            if !text(field).contains(&extra.to_lowercase()) {
                return false;
            }
        }
        true
    }

    /// One page of records in the requested order.
    pub async fn read_page(&self, ctx: &OpContext, request: &PageRequest) -> Result<Page> {
        if request.page == 0 {
            return Err(StoreError::Validation("page must be at least 1".to_string()));
        }
        if request.limit == 0 || request.limit > MAX_PAGE_LIMIT {
            return Err(StoreError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_LIMIT
            )));
        }
        let sort_by = request
            .sort_by
            .as_deref()
            .unwrap_or(self.resource.key_field);
        if self.resource.schema.field(sort_by).is_none() {
            return Err(StoreError::Validation(format!(
                "cannot sort {} by '{}'",
                self.resource.name, sort_by
            )));
        }

        let total = self.count(ctx).await?;
        let skip = (request.page - 1).checked_mul(request.limit);
        let records = match skip {
            // Past the last record: nothing to fetch.
            Some(skip) if (skip as u64) < total => {
                let query = FindQuery::default()
                    .sort_by(sort_by, request.order)
                    .skip(skip)
                    .limit(request.limit);
                self.find(ctx, query).await?
            }
            _ => Vec::new(),
        };
        let limit = request.limit as u64;

        Ok(Page {
            records,
            page: request.page,
            limit: request.limit,
            total,
            pages: (total + limit - 1) / limit,
        })
    }
}
