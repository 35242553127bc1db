//! JSON Serializer Module
//!
//! serde_json-backed implementation of the codec trait.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::SearchParameter;
use crate::codec::{Encoded, Serializer, TypeRegistry};
use crate::error::{CacheError, Result};

// == JSON Serializer ==
/// Encodes values as JSON and tags them with their Rust type name.
#[derive(Debug, Default)]
pub struct JsonSerializer {
    registry: TypeRegistry,
}

impl JsonSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Types this serializer has handled so far.
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }
}

impl Serializer for JsonSerializer {
    fn encode<T: Serialize + 'static>(&self, value: &T) -> Result<Encoded> {
        let type_tag = self.registry.register::<T>();
        Ok(Encoded {
            bytes: serde_json::to_vec(value)?,
            type_tag: type_tag.to_string(),
        })
    }

    fn decode<T: DeserializeOwned + 'static>(&self, bytes: &[u8], type_tag: &str) -> Result<T> {
        let expected = self.registry.register::<T>();
        if !self.registry.matches::<T>(type_tag) {
            return Err(CacheError::Serialization(format!(
                "stored type '{}' cannot be read as '{}'",
                type_tag, expected
            )));
        }
        Ok(serde_json::from_slice(bytes)?)
    }

    fn encode_parameters(&self, parameters: &[SearchParameter]) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(parameters)?)
    }

    fn decode_parameters(&self, bytes: &[u8]) -> Result<Vec<SearchParameter>> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
