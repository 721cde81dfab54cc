//! Keras topology helpers for layers-model manifests
//!
//! Newer Keras exports write `batch_shape` on `InputLayer` configs while the
//! TF.js layers loader only understands `batch_input_shape`. The fixer copies
//! one into the other; the input size reader accepts either.

use std::path::Path;

use serde_json::Value;

use crate::error::{ClassifierError, Result};

/// Locate the top-level layer list inside `modelTopology`.
///
/// Handles both the Keras envelope (`model_config.config.layers`) and a bare
/// model config (`config.layers`).
fn top_layers(document: &Value) -> Option<&Value> {
    let topology = document.get("modelTopology")?;
    let model_config = topology.get("model_config").unwrap_or(topology);
    model_config.get("config")?.get("layers")
}

fn top_layers_mut(document: &mut Value) -> Option<&mut Value> {
    let topology = document.get_mut("modelTopology")?;
    let model_config = if topology.get("model_config").is_some() {
        topology.get_mut("model_config")?
    } else {
        topology
    };
    model_config.get_mut("config")?.get_mut("layers")
}

/// Copy `batch_shape` to `batch_input_shape` on every `InputLayer`,
/// recursing into nested functional models.
///
/// Existing `batch_input_shape` values are left untouched. Returns the number
/// of layers patched.
pub fn fix_input_layers(layers: &mut Value) -> usize {
    let Some(layers) = layers.as_array_mut() else {
        return 0;
    };

    let mut patched = 0;
    for layer in layers.iter_mut() {
        let Some(layer) = layer.as_object_mut() else {
            continue;
        };

        let is_input = layer.get("class_name").and_then(Value::as_str) == Some("InputLayer");
        let Some(config) = layer.get_mut("config").and_then(Value::as_object_mut) else {
            continue;
        };

        if is_input && !config.contains_key("batch_input_shape") {
            if let Some(shape) = config.get("batch_shape").cloned() {
                config.insert("batch_input_shape".to_string(), shape);
                patched += 1;
            }
        }

        if let Some(nested) = config.get_mut("layers") {
            patched += fix_input_layers(nested);
        }
    }

    patched
}

/// Patch a `model.json` file in place. Returns the number of layers patched.
pub fn fix_model_file(path: &Path) -> Result<usize> {
    let url = path.display().to_string();
    let contents = std::fs::read(path)?;
    let mut document: Value =
        serde_json::from_slice(&contents).map_err(|source| ClassifierError::ManifestParse {
            url: url.clone(),
            source,
        })?;

    let layers = top_layers_mut(&mut document).ok_or_else(|| {
        ClassifierError::InvalidManifest(format!(
            "Unexpected model.json structure at {}: missing modelTopology.model_config.config.layers",
            url
        ))
    })?;

    let patched = fix_input_layers(layers);

    let serialized = serde_json::to_vec(&document).map_err(|source| {
        ClassifierError::ManifestParse {
            url: url.clone(),
            source,
        }
    })?;
    std::fs::write(path, serialized)?;

    tracing::info!(path = %url, patched, "Patched InputLayer shapes");
    Ok(patched)
}

/// Read the spatial input size `(width, height)` from the first `InputLayer`.
///
/// Shapes are NHWC (`[null, height, width, channels]`); anything else yields
/// `None`.
pub fn input_size(document: &Value) -> Option<(u32, u32)> {
    find_input_shape(top_layers(document)?)
}

fn find_input_shape(layers: &Value) -> Option<(u32, u32)> {
    for layer in layers.as_array()? {
        let config = layer.get("config");

        if layer.get("class_name").and_then(Value::as_str) == Some("InputLayer") {
            let shape = config
                .and_then(|c| c.get("batch_input_shape").or_else(|| c.get("batch_shape")))
                .and_then(Value::as_array);
            if let Some(shape) = shape {
                if shape.len() == 4 {
                    let height = shape[1].as_u64().filter(|&h| h > 0)?;
                    let width = shape[2].as_u64().filter(|&w| w > 0)?;
                    return Some((u32::try_from(width).ok()?, u32::try_from(height).ok()?));
                }
            }
        }

        if let Some(found) = config
            .and_then(|c| c.get("layers"))
            .and_then(find_input_shape)
        {
            return Some(found);
        }
    }
    None
}
