//! Hiercache - A hierarchical multi-key cache
//!
//! Items are found by a string key, an optional numeric id, or any contiguous,
//! level-ordered combination of their search parameters.

pub mod api;
pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod models;
pub mod storage;
pub mod tasks;

pub use api::AppState;
pub use cache::{CacheEngine, SearchParameter, TieredCache};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::spawn_cleanup_task;
