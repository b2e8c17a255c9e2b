//! Typed extensions carried in the opaque extension slots of matchmaking messages
//!
//! Open Match transports extensions as `google.protobuf.Any` values. Over the
//! JSON gateway a `BytesValue` wrapper is rendered as
//! `{"@type": "type.googleapis.com/google.protobuf.BytesValue", "value": "<base64>"}`.

pub mod filter;

pub use filter::{SelectionFilter, FILTER_EXTENSION_KEY};

use crate::error::{MatchmakingError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Type URL of the wrapper used for every extension payload
pub const BYTES_VALUE_TYPE_URL: &str = "type.googleapis.com/google.protobuf.BytesValue";

/// Extension slot: key -> opaque payload
pub type Extensions = BTreeMap<String, AnyPayload>;

/// JSON rendering of a `google.protobuf.Any` holding a `BytesValue`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnyPayload {
    #[serde(rename = "@type")]
    pub type_url: String,
    #[serde(default)]
    pub value: String,
}

impl AnyPayload {
    /// Wrap raw bytes as a base64 `BytesValue`
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            type_url: BYTES_VALUE_TYPE_URL.to_string(),
            value: STANDARD.encode(bytes),
        }
    }

    /// Unwrap the raw bytes, rejecting foreign payload types
    pub fn to_bytes(&self, key: &str) -> Result<Vec<u8>> {
        if self.type_url != BYTES_VALUE_TYPE_URL {
            return Err(MatchmakingError::InvalidExtension {
                key: key.to_string(),
                reason: format!("unexpected payload type '{}'", self.type_url),
            }
            .into());
        }

        STANDARD.decode(self.value.as_bytes()).map_err(|e| {
            MatchmakingError::InvalidExtension {
                key: key.to_string(),
                reason: format!("payload is not valid base64: {}", e),
            }
            .into()
        })
    }
}

/// Known extension kinds, one per reserved key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extension {
    Filter(SelectionFilter),
}

impl Extension {
    pub fn key(&self) -> &'static str {
        match self {
            Extension::Filter(_) => FILTER_EXTENSION_KEY,
        }
    }

    pub fn encode(&self) -> Result<AnyPayload> {
        match self {
            Extension::Filter(filter) => filter.encode(),
        }
    }

    /// Decode a payload stored under `key`. Unknown keys yield `None`.
    pub fn decode(key: &str, payload: &AnyPayload) -> Result<Option<Self>> {
        match key {
            FILTER_EXTENSION_KEY => Ok(Some(Extension::Filter(SelectionFilter::decode(payload)?))),
            _ => Ok(None),
        }
    }
}

/// Build an extension slot from typed extensions. Later entries replace earlier
/// ones with the same key.
pub fn build_extensions(items: impl IntoIterator<Item = Extension>) -> Result<Extensions> {
    let mut extensions = Extensions::new();
    for item in items {
        extensions.insert(item.key().to_string(), item.encode()?);
    }
    Ok(extensions)
}

/// Decode every known extension in a slot, skipping keys this crate does not own.
pub fn parse_extensions(extensions: &Extensions) -> Result<Vec<Extension>> {
    let mut parsed = Vec::new();
    for (key, payload) in extensions {
        if let Some(ext) = Extension::decode(key, payload)? {
            parsed.push(ext);
        }
    }
    Ok(parsed)
}
