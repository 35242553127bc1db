//! Response DTOs for the cache server API
//!
//! Defines the structure of outgoing HTTP response bodies.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::cache::{CachedItem, Identity, SearchParameter, StatisticsSnapshot, TierLookup};

/// One cached item as returned by lookups and searches.
#[derive(Debug, Clone, Serialize)]
pub struct ItemResponse {
    pub key: String,
    pub id: Option<i64>,
    pub value: Value,
    pub parameters: Vec<SearchParameter>,
    pub created_at: DateTime<Utc>,
    pub ttl_ms: i64,
    /// None when the item never expires
    pub ttl_remaining_ms: Option<i64>,
    /// Tier that answered a point lookup ("l1" or "l2")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<&'static str>,
}

impl From<CachedItem<Value>> for ItemResponse {
    fn from(item: CachedItem<Value>) -> Self {
        Self {
            ttl_remaining_ms: item.ttl_remaining().map(|d| d.num_milliseconds()),
            ttl_ms: item.ttl.num_milliseconds(),
            key: item.string_key,
            id: item.numeric_id,
            value: item.value,
            parameters: item.parameters,
            created_at: item.created_at,
            tier: None,
        }
    }
}

impl ItemResponse {
    /// Builds the response for a point lookup, or None on a miss.
    pub fn from_lookup(lookup: TierLookup<Value>) -> Option<Self> {
        let (item, tier) = match lookup {
            TierLookup::L1Hit(item) => (item, "l1"),
            TierLookup::L2Hit(item) => (item, "l2"),
            TierLookup::Miss => return None,
        };
        Some(Self {
            tier: Some(tier),
            ..Self::from(item)
        })
    }
}

/// Response body for PUT /items
#[derive(Debug, Clone, Serialize)]
pub struct PutResponse {
    pub message: String,
    pub identity: String,
}

impl PutResponse {
    pub fn new(identity: &Identity) -> Self {
        Self {
            message: format!("Item '{}' stored successfully", identity),
            identity: identity.to_string(),
        }
    }
}

/// Response body for POST /search
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub count: usize,
    pub items: Vec<ItemResponse>,
    /// Parameters that matched after degradation; absent for plain searches
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<Vec<SearchParameter>>,
}

impl SearchResponse {
    pub fn new(items: Vec<CachedItem<Value>>, matched: Option<Vec<SearchParameter>>) -> Self {
        let items: Vec<ItemResponse> = items.into_iter().map(ItemResponse::from).collect();
        Self {
            count: items.len(),
            items,
            matched,
        }
    }
}

/// Response body for the link endpoints
#[derive(Debug, Clone, Serialize)]
pub struct LinkResponse {
    pub message: String,
    /// False when the link added nothing new
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
}

impl LinkResponse {
    pub fn linked_id(identity: &Identity) -> Self {
        Self {
            message: format!("Linked as '{}'", identity),
            changed: true,
            identity: Some(identity.to_string()),
        }
    }

    pub fn linked_parameters(changed: bool) -> Self {
        let message = if changed {
            "Parameters linked successfully"
        } else {
            "Parameters already linked"
        };
        Self {
            message: message.to_string(),
            changed,
            identity: None,
        }
    }
}

/// Response body for the DELETE endpoints
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    pub message: String,
    pub removed: Vec<String>,
}

impl InvalidateResponse {
    pub fn new(removed: Vec<Identity>) -> Self {
        Self {
            message: format!("{} item(s) invalidated", removed.len()),
            removed: removed.into_iter().map(|i| i.to_string()).collect(),
        }
    }

    pub fn all() -> Self {
        Self {
            message: "All items invalidated".to_string(),
            removed: Vec::new(),
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub snapshot: StatisticsSnapshot,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
    pub miss_rate: f64,
    pub keys_to_values_ratio: f64,
    pub l1_hit_rate: f64,
    pub l2_hit_rate: f64,
    /// Entries currently held in the local tier
    pub l1_entries: usize,
}

impl StatsResponse {
    pub fn new(snapshot: StatisticsSnapshot, l1_entries: usize) -> Self {
        Self {
            hit_rate: snapshot.hit_rate(),
            miss_rate: snapshot.miss_rate(),
            keys_to_values_ratio: snapshot.keys_to_values_ratio(),
            l1_hit_rate: snapshot.l1.hit_rate(),
            l2_hit_rate: snapshot.l2.hit_rate(),
            l1_entries,
            snapshot,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
