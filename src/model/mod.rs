//! Model loading
//!
//! The loader resolves the model URL against the configured origin, fetches
//! and validates the manifest itself so a bad export fails with a clear
//! message, and only then asks the runtime to build the model.

pub mod fetch;
pub mod onnx;

use std::sync::Arc;

use futures_util::future::BoxFuture;
use ndarray::ArrayView4;
use url::Url;

use crate::error::{ClassifierError, Result};
use crate::manifest::Manifest;

pub use fetch::Fetcher;
pub use onnx::OnnxRuntime;

/// A loaded model that maps an input tensor to class scores
pub trait Classifier: Send + Sync {
    /// Spatial input size `(width, height)` the model expects
    fn input_size(&self) -> (u32, u32);

    /// Run inference on an NHWC `[1, height, width, 3]` batch
    fn predict(&self, input: ArrayView4<'_, f32>) -> Result<Vec<f32>>;
}

/// Shared handle to a loaded model
pub type ModelHandle = Arc<dyn Classifier>;

/// Runtime capability that constructs a model from its manifest
pub trait ModelRuntime: Send + Sync {
    fn load(&self, url: Url, manifest: Manifest) -> BoxFuture<'static, Result<ModelHandle>>;
}

/// Resolve `model_url` against `origin`. Absolute URLs are returned as-is.
pub fn resolve_model_url(origin: &Url, model_url: &str) -> Result<Url> {
    origin.join(model_url).map_err(|e| ClassifierError::InvalidUrl {
        url: model_url.to_string(),
        reason: e.to_string(),
    })
}

/// Loads models through a [`ModelRuntime`] after validating the manifest
#[derive(Clone)]
pub struct ModelLoader {
    origin: Url,
    fetcher: Fetcher,
    runtime: Arc<dyn ModelRuntime>,
}

impl ModelLoader {
    pub fn new(origin: &str, runtime: Arc<dyn ModelRuntime>) -> Result<Self> {
        let origin = Url::parse(origin).map_err(|e| ClassifierError::InvalidUrl {
            url: origin.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            origin,
            fetcher: Fetcher::new()?,
            runtime,
        })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Fetch and validate the manifest at an already resolved URL
    pub async fn fetch_manifest(&self, url: &Url) -> Result<Manifest> {
        let body = self.fetcher.fetch(url, "model manifest").await?;
        Manifest::parse(&body, url.as_str())
    }

    /// Resolve, fetch, validate, then build the model
    pub async fn load_model(&self, model_url: &str) -> Result<ModelHandle> {
        let url = resolve_model_url(&self.origin, model_url)?;
        tracing::info!(url = %url, "Loading model");

        let manifest = self.fetch_manifest(&url).await?;
        tracing::debug!(
            url = %url,
            groups = manifest.weight_groups().len(),
            format = manifest.format().unwrap_or("unknown"),
            "Manifest validated"
        );

        let model = self.runtime.load(url.clone(), manifest).await?;
        let (width, height) = model.input_size();
        tracing::info!(url = %url, width, height, "Model loaded");
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_root_relative() {
        let origin = Url::parse("http://localhost:8000/app/index.html").unwrap();
        let url = resolve_model_url(&origin, "/tfjs_model/model.json").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/tfjs_model/model.json");
    }

    #[test]
    fn test_resolve_relative() {
        let origin = Url::parse("http://localhost:8000/app/").unwrap();
        let url = resolve_model_url(&origin, "./tfjs_model/model.json").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/app/tfjs_model/model.json");
    }

    #[test]
    fn test_resolve_absolute() {
        let origin = Url::parse("http://localhost:8000/").unwrap();
        let url = resolve_model_url(&origin, "https://models.example.com/m/model.json").unwrap();
        assert_eq!(url.as_str(), "https://models.example.com/m/model.json");
    }

    #[test]
    fn test_invalid_origin() {
        struct NoRuntime;
        impl ModelRuntime for NoRuntime {
            fn load(&self, _url: Url, _manifest: Manifest) -> BoxFuture<'static, Result<ModelHandle>> {
                Box::pin(async {
                    Err::<ModelHandle, _>(ClassifierError::Runtime("unused".to_string()))
                })
            }
        }

        let err = ModelLoader::new("not a url", Arc::new(NoRuntime)).err().unwrap();
        assert!(matches!(err, ClassifierError::InvalidUrl { .. }));
    }
}
