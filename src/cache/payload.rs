//! Cached payload forms and their JSON codec.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{CacheError, Result};

/// What a cache tier hands back for a key.
///
/// The remote tier only ever produces `Encoded`; the local tier keeps
/// whatever it was given, so a promoted remote hit stays `Encoded` there
/// while a freshly loaded value stays `Value`.
#[derive(Debug)]
pub enum Payload<T> {
    /// Encoded bytes as stored in the remote tier.
    Encoded(Arc<[u8]>),
    /// A structured value shared read-only between tiers.
    Value(Arc<T>),
}

impl<T> Clone for Payload<T> {
    fn clone(&self) -> Self {
        match self {
            Payload::Encoded(bytes) => Payload::Encoded(Arc::clone(bytes)),
            Payload::Value(value) => Payload::Value(Arc::clone(value)),
        }
    }
}

impl<T> Payload<T> {
    pub fn value(value: T) -> Self {
        Payload::Value(Arc::new(value))
    }

    pub fn encoded(bytes: impl Into<Arc<[u8]>>) -> Self {
        Payload::Encoded(bytes.into())
    }

    pub fn is_encoded(&self) -> bool {
        matches!(self, Payload::Encoded(_))
    }
}

impl<T: Serialize> Payload<T> {
    /// Bytes for the remote tier. Encoded payloads pass through untouched.
    pub fn to_bytes(&self) -> Result<Arc<[u8]>> {
        match self {
            Payload::Encoded(bytes) => Ok(Arc::clone(bytes)),
            Payload::Value(value) => encode(value.as_ref()).map(Arc::from),
        }
    }
}

/// Encode a value for storage.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(CacheError::Encode)
}

/// Decode `bytes` into `target`, replacing its contents.
///
/// `target` is left untouched on failure.
pub fn decode_into<T: DeserializeOwned>(target: &mut T, bytes: &[u8]) -> serde_json::Result<()> {
    *target = serde_json::from_slice(bytes)?;
    Ok(())
}
