//! Request DTOs for the catalog API
//!
//! Query strings and bodies accepted by the resource endpoints.

use serde::Deserialize;
use serde_json::Value;

use crate::db::{Record, SortOrder};
use crate::entity::{PageRequest, SearchCriteria};
use crate::error::{Result, StoreError};

/// Query string of `GET /:resource`.
///
/// Without `page` the whole collection is returned.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
}

impl ListQuery {
    /// Page request described by this query, or `None` for an unpaged listing.
    pub fn page_request(&self) -> Option<PageRequest> {
        let page = self.page?;
        let defaults = PageRequest::default();
        Some(PageRequest {
            page,
            limit: self.limit.unwrap_or(defaults.limit),
            sort_by: self.sort_by.clone(),
            order: self
                .order
                .as_deref()
                .map_or(defaults.order, SortOrder::parse),
        })
    }
}

/// Query string of `GET /:resource/search`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    pub name: Option<String>,
    pub code: Option<String>,
    pub extra: Option<String>,
}

impl SearchQuery {
    /// Converts to store criteria, requiring at least one non-blank parameter.
    pub fn into_criteria(self) -> Result<SearchCriteria> {
        let keep = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        let criteria = SearchCriteria {
            name: keep(self.name),
            code: keep(self.code),
            extra: keep(self.extra),
        };
        if criteria.name.is_none() && criteria.code.is_none() && criteria.extra.is_none() {
            return Err(StoreError::Validation(
                "Provide at least one of name, code or extra".to_string(),
            ));
        }
        Ok(criteria)
    }
}

/// Interprets a request body as a record object.
pub fn record_body(body: Value) -> Result<Record> {
    match body {
        Value::Object(record) => Ok(record),
        _ => Err(StoreError::Validation(
            "Request body must be a JSON object".to_string(),
        )),
    }
}
