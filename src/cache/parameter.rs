//! Search Parameter Module
//!
//! A single hierarchical search attribute such as `region=us` at level 0.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

// == Search Parameter ==
/// One named, leveled attribute an item can be found by.
///
/// Lower levels are broader (level 0 = region, level 1 = tier, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchParameter {
    /// Attribute name
    pub name: String,
    /// Attribute value
    pub value: String,
    /// Hierarchy rank
    pub level: i32,
}

impl SearchParameter {
    /// Creates a new SearchParameter.
    pub fn new(name: impl Into<String>, value: impl Into<String>, level: i32) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            level,
        }
    }

    // == Canonical Key ==
    /// Returns the canonical key `L{level}:{name}={value}`.
    pub fn key(&self) -> String {
        format!("L{}:{}={}", self.level, self.name, self.value)
    }
}

// Level first, then name, then value. Equal levels are ordered by name and value
// so pattern generation never depends on caller-supplied order.
impl Ord for SearchParameter {
    fn cmp(&self, other: &Self) -> Ordering {
        self.level
            .cmp(&other.level)
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.value.cmp(&other.value))
    }
}

impl PartialOrd for SearchParameter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SearchParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}
