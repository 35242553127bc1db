//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;

use crate::cache::{ttl_from_millis, CacheEngine, TierLookup, TieredCache};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    HealthResponse, InvalidateResponse, ItemResponse, LinkIdRequest, LinkParametersRequest,
    LinkResponse, PutRequest, PutResponse, SearchRequest, SearchResponse, StatsResponse,
};
use crate::storage::MemoryBackend;

/// The cache type served over HTTP.
pub type HttpCache = TieredCache<Value, MemoryBackend>;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<HttpCache>,
}

impl AppState {
    pub fn new(cache: HttpCache) -> Self {
        Self {
            cache: Arc::new(cache),
        }
    }

    /// Builds the engine and its local tier from the Config.
    pub fn from_config(config: &Config) -> Self {
        let engine = CacheEngine::new(MemoryBackend::new(), config.cache_settings());
        Self::new(TieredCache::new(engine, config.tier_settings()))
    }
}

fn found(lookup: TierLookup<Value>, what: impl FnOnce() -> String) -> Result<Json<ItemResponse>> {
    ItemResponse::from_lookup(lookup)
        .map(Json)
        .ok_or_else(|| CacheError::NotFound(what()))
}

/// Handler for PUT /items
pub async fn put_handler(
    State(state): State<AppState>,
    Json(req): Json<PutRequest>,
) -> Result<Json<PutResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::Validation(error_msg));
    }

    let identity = state.cache.put(
        &req.key,
        req.id,
        &req.parameters,
        req.value,
        req.ttl_ms.map(ttl_from_millis),
    )?;

    Ok(Json(PutResponse::new(&identity)))
}

/// Handler for GET /items/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<ItemResponse>> {
    let lookup = state.cache.lookup(&key)?;
    found(lookup, || format!("Key '{}' not found", key))
}

/// Handler for GET /items/:key/:id
pub async fn get_with_id_handler(
    State(state): State<AppState>,
    Path((key, id)): Path<(String, i64)>,
) -> Result<Json<ItemResponse>> {
    let lookup = state.cache.lookup_with_id(&key, id)?;
    found(lookup, || format!("Key '{}' with id {} not found", key, id))
}

/// Handler for GET /ids/:id
pub async fn get_by_id_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ItemResponse>> {
    let lookup = state.cache.lookup_by_id(id)?;
    found(lookup, || format!("Id {} not found", id))
}

/// Handler for POST /search
pub async fn search_handler(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    let response = if req.degrade {
        let result = state.cache.search_with_degradation(&req.parameters)?;
        SearchResponse::new(result.items, Some(result.matched))
    } else {
        SearchResponse::new(state.cache.search(&req.parameters)?, None)
    };
    Ok(Json(response))
}

/// Handler for POST /link/id
pub async fn link_id_handler(
    State(state): State<AppState>,
    Json(req): Json<LinkIdRequest>,
) -> Result<Json<LinkResponse>> {
    let identity = state.cache.link_id(&req.key, req.id)?;
    Ok(Json(LinkResponse::linked_id(&identity)))
}

/// Handler for POST /link/parameters
pub async fn link_parameters_handler(
    State(state): State<AppState>,
    Json(req): Json<LinkParametersRequest>,
) -> Result<Json<LinkResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::Validation(error_msg));
    }

    let changed = match (req.key.as_deref(), req.id) {
        (Some(key), _) => state.cache.link_parameters(key, &req.parameters)?,
        (None, Some(id)) => state.cache.link_parameters_by_id(id, &req.parameters)?,
        (None, None) => {
            return Err(CacheError::Validation("Either key or id is required".to_string()))
        }
    };
    Ok(Json(LinkResponse::linked_parameters(changed)))
}

/// Handler for DELETE /items/:key
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<InvalidateResponse>> {
    Ok(Json(InvalidateResponse::new(state.cache.invalidate(&key)?)))
}

/// Handler for DELETE /items/:key/:id
pub async fn invalidate_with_id_handler(
    State(state): State<AppState>,
    Path((key, id)): Path<(String, i64)>,
) -> Result<Json<InvalidateResponse>> {
    Ok(Json(InvalidateResponse::new(
        state.cache.invalidate_with_id(&key, id)?,
    )))
}

/// Handler for DELETE /ids/:id
pub async fn invalidate_by_id_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<InvalidateResponse>> {
    Ok(Json(InvalidateResponse::new(state.cache.invalidate_by_id(id)?)))
}

/// Handler for DELETE /items
pub async fn invalidate_all_handler(
    State(state): State<AppState>,
) -> Result<Json<InvalidateResponse>> {
    state.cache.invalidate_all()?;
    Ok(Json(InvalidateResponse::all()))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::new(
        state.cache.statistics(),
        state.cache.local_len(),
    ))
}

/// Handler for POST /stats/reset
///
/// Zeroes the counters without touching stored items.
pub async fn reset_stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    state.cache.stats().reset();
    stats_handler(State(state)).await
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
