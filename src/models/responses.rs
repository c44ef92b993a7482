//! Response DTOs for the catalog API
//!
//! Defines the structure of outgoing HTTP response bodies.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::cache::CacheStats;
use crate::db::{HealthReport, Record};

/// Response body for `POST /:resource`
#[derive(Debug, Clone, Serialize)]
pub struct CreateResponse {
    pub message: String,
    /// Store-generated id; later calls address the record by `key`
    pub id: String,
    pub key: String,
}

impl CreateResponse {
    pub fn new(resource: &str, key: impl Into<String>, id: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Created {} '{}'", resource, key),
            id: id.into(),
            key,
        }
    }
}

/// Response body for updates and deletes.
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
    pub key: String,
}

impl MessageResponse {
    pub fn updated(resource: &str, key: impl Into<String>) -> Self {
        Self::new("Updated", resource, key.into())
    }

    pub fn deleted(resource: &str, key: impl Into<String>) -> Self {
        Self::new("Deleted", resource, key.into())
    }

    fn new(verb: &str, resource: &str, key: String) -> Self {
        Self {
            message: format!("{} {} '{}'", verb, resource, key),
            key,
        }
    }
}

/// Response body for `GET /:resource/count`
#[derive(Debug, Clone, Serialize)]
pub struct CountResponse {
    pub resource: String,
    pub count: u64,
}

/// Records keyed by their natural key, as returned by the listing endpoints.
pub fn records_by_key(records: Vec<Record>, key_field: &str) -> Map<String, Value> {
    let mut keyed = Map::new();
    for record in records {
        let key = record
            .get(key_field)
            .and_then(Value::as_str)
            .map(str::to_string);
        if let Some(key) = key {
            keyed.insert(key, Value::Object(record));
        }
    }
    keyed
}

/// Cache statistics of one resource.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceStats {
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub evictions: u64,
    pub invalidations: u64,
    pub total_entries: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl From<CacheStats> for ResourceStats {
    fn from(stats: CacheStats) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            hits: stats.hits,
            misses: stats.misses,
            expired: stats.expired,
            evictions: stats.evictions,
            invalidations: stats.invalidations,
            total_entries: stats.total_entries,
        }
    }
}

/// Response body for `GET /stats`
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub resources: BTreeMap<String, ResourceStats>,
}

/// Response body for `GET /health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "ok" when the store answered, otherwise "degraded"
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
    /// Current time in seconds since the epoch
    pub unix: i64,
    pub db: HealthReport,
}

impl HealthResponse {
    pub fn from_report(db: HealthReport) -> Self {
        let now = chrono::Utc::now();
        Self {
            status: if db.ok { "ok" } else { "degraded" }.to_string(),
            timestamp: now.to_rfc3339(),
            unix: now.timestamp(),
            db,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_response_serialize() {
        let resp = CreateResponse::new("cities", "Lima", "abc-123");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["id"], json!("abc-123"));
        assert_eq!(json["key"], json!("Lima"));
        assert_eq!(json["message"], json!("Created cities 'Lima'"));
    }

    #[test]
    fn test_records_by_key_skips_unkeyed() {
        let records = vec![
            json!({"name": "Lima", "state_code": "LI"}),
            json!({"state_code": "XX"}),
        ]
        .into_iter()
        .filter_map(|v| v.as_object().cloned())
        .collect();

        let keyed = records_by_key(records, "name");
        assert_eq!(keyed.len(), 1);
        assert_eq!(keyed["Lima"]["state_code"], json!("LI"));
    }

    #[test]
    fn test_resource_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..CacheStats::default()
        };
        let resp = ResourceStats::from(stats);
        assert!((resp.hit_rate - 0.8).abs() < 0.001);
    }

    #[test]
    fn test_health_response_status() {
        let healthy = HealthResponse::from_report(HealthReport {
            ok: true,
            round_trip_ms: Some(1.5),
            error: None,
        });
        assert_eq!(healthy.status, "ok");

        let degraded = HealthResponse::from_report(HealthReport {
            ok: false,
            round_trip_ms: None,
            error: Some("down".to_string()),
        });
        let json = serde_json::to_string(&degraded).unwrap();
        assert!(json.contains("degraded"));
        assert!(json.contains("timestamp"));
    }
}
