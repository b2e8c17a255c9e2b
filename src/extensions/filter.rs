//! Selection filter: the label and field constraints a profile places on game servers

use super::{AnyPayload, Extensions};
use crate::error::{MatchmakingError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Extension key reserved for the selection filter
pub const FILTER_EXTENSION_KEY: &str = "filter";

/// Key/value constraints used to select game servers.
///
/// `labels` match metadata labels, `fields` match status fields such as
/// `status.state`. Both are ordered so encoding and query strings are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionFilter {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub fields: BTreeMap<String, String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<BTreeMap<String, String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl SelectionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty() && self.fields.is_empty()
    }

    /// Serialize into an opaque extension payload
    pub fn encode(&self) -> Result<AnyPayload> {
        let bytes = serde_json::to_vec(self).map_err(|e| MatchmakingError::InvalidExtension {
            key: FILTER_EXTENSION_KEY.to_string(),
            reason: format!("failed to serialize filter: {}", e),
        })?;
        Ok(AnyPayload::from_bytes(&bytes))
    }

    /// Parse a filter back out of an extension payload
    pub fn decode(payload: &AnyPayload) -> Result<Self> {
        let bytes = payload.to_bytes(FILTER_EXTENSION_KEY)?;
        serde_json::from_slice(&bytes).map_err(|e| {
            MatchmakingError::InvalidExtension {
                key: FILTER_EXTENSION_KEY.to_string(),
                reason: format!("payload is not a selection filter: {}", e),
            }
            .into()
        })
    }

    /// Extension slot containing only this filter
    pub fn to_extensions(&self) -> Result<Extensions> {
        let mut extensions = Extensions::new();
        extensions.insert(FILTER_EXTENSION_KEY.to_string(), self.encode()?);
        Ok(extensions)
    }

    /// Read the filter from an extension slot; `None` when the key is absent.
    pub fn from_extensions(extensions: &Extensions) -> Result<Option<Self>> {
        extensions
            .get(FILTER_EXTENSION_KEY)
            .map(Self::decode)
            .transpose()
    }

    /// Query parameters: one entry per non-empty filter kind, each value the
    /// comma-joined `key=value` pairs in key order.
    pub fn query_params(&self) -> BTreeMap<&'static str, String> {
        let mut params = BTreeMap::new();
        if !self.fields.is_empty() {
            params.insert("fields", join_pairs(&self.fields));
        }
        if !self.labels.is_empty() {
            params.insert("labels", join_pairs(&self.labels));
        }
        params
    }

    /// URL-encoded query string, e.g. `fields=status.state%3DReady&labels=region%3Dus-east-1`
    pub fn to_query_string(&self) -> String {
        self.query_params()
            .iter()
            .map(|(name, value)| format!("{}={}", name, urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

fn join_pairs(pairs: &BTreeMap<String, String>) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::BYTES_VALUE_TYPE_URL;
    use proptest::prelude::*;

    fn dune_filter() -> SelectionFilter {
        SelectionFilter::new()
            .with_label("region", "us-east-1")
            .with_label("world", "Dune")
            .with_field("status.state", "Ready")
    }

    #[test]
    fn test_round_trip() {
        let filter = dune_filter();
        let payload = filter.encode().unwrap();

        assert_eq!(payload.type_url, BYTES_VALUE_TYPE_URL);
        assert_eq!(SelectionFilter::decode(&payload).unwrap(), filter);
    }

    #[test]
    fn test_round_trip_empty_maps() {
        let filter = SelectionFilter::new();
        let decoded = SelectionFilter::decode(&filter.encode().unwrap()).unwrap();

        assert!(decoded.is_empty());
        assert_eq!(decoded, filter);
    }

    #[test]
    fn test_decode_accepts_null_maps() {
        let payload = AnyPayload::from_bytes(br#"{"labels":null,"fields":{"status.state":"Ready"}}"#);
        let filter = SelectionFilter::decode(&payload).unwrap();

        assert!(filter.labels.is_empty());
        assert_eq!(filter.fields.len(), 1);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let payload = AnyPayload::from_bytes(b"not json");
        assert!(SelectionFilter::decode(&payload).is_err());
    }

    #[test]
    fn test_extension_slot() {
        let filter = dune_filter();
        let extensions = filter.to_extensions().unwrap();

        assert!(extensions.contains_key(FILTER_EXTENSION_KEY));
        assert_eq!(
            SelectionFilter::from_extensions(&extensions).unwrap(),
            Some(filter)
        );
        assert_eq!(
            SelectionFilter::from_extensions(&Extensions::new()).unwrap(),
            None
        );
    }

    #[test]
    fn test_query_string() {
        let filter = SelectionFilter::new()
            .with_label("region", "us-east-1")
            .with_field("status.state", "Ready");

        assert_eq!(
            filter.to_query_string(),
            "fields=status.state%3DReady&labels=region%3Dus-east-1"
        );
    }

    #[test]
    fn test_query_string_multiple_pairs_sorted() {
        let filter = SelectionFilter::new()
            .with_label("world", "Dune")
            .with_label("region", "us-east-1");

        assert_eq!(
            filter.to_query_string(),
            "labels=region%3Dus-east-1%2Cworld%3DDune"
        );
        assert_eq!(SelectionFilter::new().to_query_string(), "");
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            labels in proptest::collection::btree_map("[a-z.]{1,8}", "[A-Za-z0-9-]{0,8}", 0..5),
            fields in proptest::collection::btree_map("[a-z.]{1,8}", "[A-Za-z0-9-]{0,8}", 0..5),
        ) {
            let filter = SelectionFilter { labels, fields };
            let decoded = SelectionFilter::decode(&filter.encode().unwrap()).unwrap();
            prop_assert_eq!(decoded, filter);
        }

        #[test]
        fn prop_query_string_is_deterministic(
            labels in proptest::collection::btree_map("[a-z]{1,6}", "[a-z0-9]{1,6}", 0..4),
        ) {
            let a = SelectionFilter { labels: labels.clone(), fields: BTreeMap::new() };
            let b = SelectionFilter { labels, fields: BTreeMap::new() };
            prop_assert_eq!(a.to_query_string(), b.to_query_string());
        }
    }
}
