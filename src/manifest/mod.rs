//! Model manifest handling
//!
//! A manifest is the `model.json` file exported next to a model's weight
//! shards. Only its structure is checked here: the runtime owns the actual
//! interpretation of the weights.

pub mod topology;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{ClassifierError, Result};

pub use topology::{fix_input_layers, fix_model_file, input_size};

/// One entry of the `weightsManifest` array
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WeightGroup {
    /// Shard file paths, relative to the manifest URL
    #[serde(default)]
    pub paths: Vec<String>,
}

/// Check that a parsed manifest has the shape the loader relies on.
///
/// Returns `None` when `weightsManifest` is present and is an array, and a
/// message naming `source_url` otherwise. Array contents are not inspected.
pub fn validate_manifest(manifest: &Value, source_url: &str) -> Option<String> {
    match manifest.get("weightsManifest") {
        Some(Value::Array(_)) => None,
        _ => Some(format!(
            "Model manifest at {} is missing a weightsManifest array.",
            source_url
        )),
    }
}

/// A manifest that passed validation
#[derive(Debug, Clone)]
pub struct Manifest {
    /// URL the manifest was fetched from
    pub url: String,
    /// The full parsed document
    pub document: Value,
}

impl Manifest {
    /// Parse and validate a manifest body fetched from `url`
    pub fn parse(body: &[u8], url: &str) -> Result<Self> {
        let document: Value =
            serde_json::from_slice(body).map_err(|source| ClassifierError::ManifestParse {
                url: url.to_string(),
                source,
            })?;
        Self::from_value(document, url)
    }

    /// Validate an already-parsed manifest
    pub fn from_value(document: Value, url: &str) -> Result<Self> {
        if let Some(message) = validate_manifest(&document, url) {
            return Err(ClassifierError::InvalidManifest(message));
        }
        Ok(Self {
            url: url.to_string(),
            document,
        })
    }

    /// Weight groups, skipping entries that do not look like descriptors
    pub fn weight_groups(&self) -> Vec<WeightGroup> {
        self.document
            .get("weightsManifest")
            .and_then(Value::as_array)
            .map(|groups| {
                groups
                    .iter()
                    .filter_map(|g| WeightGroup::deserialize(g).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Spatial input size (width, height) declared by the model topology
    pub fn input_size(&self) -> Option<(u32, u32)> {
        input_size(&self.document)
    }

    /// The `format` field, e.g. "layers-model" or "graph-model"
    pub fn format(&self) -> Option<&str> {
        self.document.get("format").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const URL: &str = "./tfjs_model/model.json";

    #[test]
    fn test_valid_manifest_passes() {
        let manifest = json!({ "weightsManifest": [{ "paths": ["group1-shard1of1.bin"] }] });
        assert_eq!(validate_manifest(&manifest, URL), None);
    }

    #[test]
    fn test_empty_weights_array_passes() {
        let manifest = json!({ "weightsManifest": [] });
        assert_eq!(validate_manifest(&manifest, URL), None);
    }

    #[test]
    fn test_missing_weights_manifest() {
        let message = validate_manifest(&json!({}), URL).unwrap();
        assert!(message.contains("missing a weightsManifest array"));
        assert!(message.contains(URL));
    }

    #[test]
    fn test_non_array_weights_manifest() {
        for bad in [
            json!({ "weightsManifest": null }),
            json!({ "weightsManifest": "group1-shard1of1.bin" }),
            json!({ "weightsManifest": { "paths": [] } }),
            json!({ "weightsManifest": 3 }),
            json!([]),
            json!("model"),
        ] {
            let message = validate_manifest(&bad, URL);
            assert!(message.is_some(), "expected rejection for {}", bad);
            assert!(message.unwrap().contains(URL));
        }
    }

    #[test]
    fn test_parse_rejects_invalid_json() {
        let err = Manifest::parse(b"not json", URL).unwrap_err();
        assert!(matches!(err, ClassifierError::ManifestParse { .. }));
        assert!(err.to_string().contains(URL));
    }

    #[test]
    fn test_parse_surfaces_validator_message() {
        let err = Manifest::parse(b"{}", URL).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Model manifest at ./tfjs_model/model.json is missing a weightsManifest array."
        );
    }

    #[test]
    fn test_weight_groups() {
        let manifest = Manifest::from_value(
            json!({
                "format": "layers-model",
                "weightsManifest": [
                    { "paths": ["group1-shard1of2.bin", "group1-shard2of2.bin"], "weights": [] },
                    "junk"
                ]
            }),
            URL,
        )
        .unwrap();

        let groups = manifest.weight_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].paths.len(), 2);
        assert_eq!(manifest.format(), Some("layers-model"));
    }
}
