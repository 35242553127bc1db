//! Cached Item Module
//!
//! Defines an item as stored by the engine, with TTL support.

use chrono::{DateTime, Duration, Utc};

use crate::cache::{Identity, SearchParameter};
use crate::error::Result;

// == Cached Item ==
/// A value together with every handle it can be found by.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedItem<T> {
    /// Required string key
    pub string_key: String,
    /// Optional numeric id
    pub numeric_id: Option<i64>,
    /// The stored value
    pub value: T,
    /// Search parameters in the order they were supplied
    pub parameters: Vec<SearchParameter>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Lifetime; zero or negative means the item never expires
    pub ttl: Duration,
}

impl<T> CachedItem<T> {
    // == Constructor ==
    /// Creates a new item stamped with the current time.
    pub fn new(
        string_key: impl Into<String>,
        numeric_id: Option<i64>,
        value: T,
        parameters: Vec<SearchParameter>,
        ttl: Duration,
    ) -> Self {
        Self {
            string_key: string_key.into(),
            numeric_id,
            value,
            parameters,
            created_at: Utc::now(),
            ttl,
        }
    }

    /// Resolves this item's canonical identity.
    pub fn identity(&self) -> Result<Identity> {
        Identity::resolve(&self.string_key, self.numeric_id)
    }

    // == Is Expired ==
    /// Checks if the item has expired.
    ///
    /// True only when a positive TTL has been strictly exceeded.
    pub fn is_expired(&self) -> bool {
        is_expired_at(self.created_at, self.ttl, Utc::now())
    }

    // == Time To Live ==
    /// Returns the remaining lifetime, or None if the item never expires.
    ///
    /// Returns `Some(Duration::zero())` once the item has expired.
    pub fn ttl_remaining(&self) -> Option<Duration> {
        remaining_at(self.created_at, self.ttl, Utc::now())
    }
}

// == Utility Functions ==
/// Converts a TTL in milliseconds. Zero or negative becomes zero, which never expires.
pub fn ttl_from_millis(millis: i64) -> Duration {
    Duration::try_milliseconds(millis)
        .filter(|ttl| *ttl > Duration::zero())
        .unwrap_or_else(Duration::zero)
}

/// Expiry rule shared by items and stored records.
pub fn is_expired_at(created_at: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    ttl > Duration::zero() && now - created_at > ttl
}

/// Remaining lifetime at `now`, floored at zero.
pub fn remaining_at(
    created_at: DateTime<Utc>,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Option<Duration> {
    if ttl <= Duration::zero() {
        return None;
    }
    let remaining = ttl - (now - created_at);
    Some(remaining.max(Duration::zero()))
}
