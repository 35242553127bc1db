//! Identity Module
//!
//! Derives the canonical identity naming one cached item.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// Joins the escaped key with the numeric id.
const ID_DELIMITER: char = ':';
const ESCAPE: char = '\\';

// == Identity ==
/// Canonical string uniquely naming one cached item.
///
/// Built from `(key, numeric_id)`. Inside the key, `\` becomes `\\` and `:` becomes `\:`,
/// so the only unescaped `:` is the one that introduces the numeric id. Two different
/// pairs therefore never produce the same identity, even for keys like `"a:1"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    // == Resolve ==
    /// Resolves the identity for a key and optional numeric id.
    ///
    /// Fails with `Validation` when the key is empty.
    pub fn resolve(key: &str, numeric_id: Option<i64>) -> Result<Self> {
        if key.is_empty() {
            return Err(CacheError::empty_key());
        }

        let mut encoded = String::with_capacity(key.len() + 21);
        for ch in key.chars() {
            if ch == ESCAPE || ch == ID_DELIMITER {
                encoded.push(ESCAPE);
            }
            encoded.push(ch);
        }

        if let Some(id) = numeric_id {
            encoded.push(ID_DELIMITER);
            encoded.push_str(&id.to_string());
        }

        Ok(Self(encoded))
    }

    /// Returns the encoded form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
