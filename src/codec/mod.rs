//! Codec Module
//!
//! Encodes values and parameter lists to bytes for the storage backends.

mod json;
mod registry;

pub use json::JsonSerializer;
pub use registry::TypeRegistry;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::SearchParameter;
use crate::error::Result;

// == Encoded Value ==
/// Bytes plus the type tag they were produced from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub type_tag: String,
}

// == Serializer Trait ==
/// Value codec used by the engine.
///
/// Every method fails with `CacheError::Serialization`.
pub trait Serializer: Send + Sync {
    /// Encodes a value, registering its type.
    fn encode<T: Serialize + 'static>(&self, value: &T) -> Result<Encoded>;

    /// Decodes bytes stored under `type_tag` into `T`.
    ///
    /// Fails when `type_tag` does not name `T`.
    fn decode<T: DeserializeOwned + 'static>(&self, bytes: &[u8], type_tag: &str) -> Result<T>;

    fn encode_parameters(&self, parameters: &[SearchParameter]) -> Result<Vec<u8>>;

    fn decode_parameters(&self, bytes: &[u8]) -> Result<Vec<SearchParameter>>;
}
