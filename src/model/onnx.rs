//! ONNX Runtime backed model runtime
//!
//! The ONNX export of the model is expected next to its manifest. The input
//! size comes from the manifest topology when it declares one.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use ndarray::ArrayView4;
use ort::session::Session;
use parking_lot::Mutex;
use url::Url;

use super::{Classifier, Fetcher, ModelHandle, ModelRuntime};
use crate::error::{ClassifierError, Result};
use crate::manifest::Manifest;
use crate::settings::ClassifierSettings;

/// Builds ONNX Runtime sessions for validated manifests
#[derive(Clone, Debug)]
pub struct OnnxRuntime {
    /// Artifact file name, resolved relative to the manifest URL
    model_file: String,
    /// Input size used when the manifest does not declare one
    fallback_size: (u32, u32),
    intra_threads: usize,
    fetcher: Fetcher,
}

impl OnnxRuntime {
    pub fn new(settings: &ClassifierSettings) -> Result<Self> {
        Ok(Self {
            model_file: settings.model_file.clone(),
            fallback_size: (settings.input_width, settings.input_height),
            intra_threads: settings.intra_threads,
            fetcher: Fetcher::new()?,
        })
    }

    fn build_session(bytes: &[u8], intra_threads: usize) -> Result<Session> {
        let runtime_error = |e: ort::Error| ClassifierError::Runtime(e.to_string());
        Session::builder()
            .map_err(runtime_error)?
            .with_intra_threads(intra_threads)
            .map_err(runtime_error)?
            .commit_from_memory(bytes)
            .map_err(runtime_error)
    }
}

impl OnnxRuntime {
    async fn load_session(self, url: Url, manifest: Manifest) -> Result<ModelHandle> {
        let artifact_url = url.join(&self.model_file).map_err(|e| ClassifierError::InvalidUrl {
            url: self.model_file.clone(),
            reason: e.to_string(),
        })?;
        let bytes = self.fetcher.fetch(&artifact_url, "model weights").await?;

        let intra_threads = self.intra_threads;
        let session = tokio::task::spawn_blocking(move || Self::build_session(&bytes, intra_threads))
            .await
            .map_err(|e| ClassifierError::Runtime(format!("Model construction aborted: {}", e)))??;

        let input_size = manifest.input_size().unwrap_or(self.fallback_size);
        tracing::info!(artifact = %artifact_url, ?input_size, "ONNX session created");

        Ok(Arc::new(OnnxClassifier {
            session: Mutex::new(session),
            input_size,
        }))
    }
}

impl ModelRuntime for OnnxRuntime {
    fn load(&self, url: Url, manifest: Manifest) -> BoxFuture<'static, Result<ModelHandle>> {
        Box::pin(self.clone().load_session(url, manifest))
    }
}

/// A classifier running in an ONNX Runtime session
pub struct OnnxClassifier {
    session: Mutex<Session>,
    input_size: (u32, u32),
}

impl Classifier for OnnxClassifier {
    fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    fn predict(&self, input: ArrayView4<'_, f32>) -> Result<Vec<f32>> {
        let input_tensor = ort::value::Tensor::from_array(input.to_owned())
            .map_err(|e| ClassifierError::Runtime(format!("Failed to create tensor: {}", e)))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![input_tensor])
            .map_err(|e| ClassifierError::Runtime(format!("Inference failed: {}", e)))?;

        let output = outputs
            .iter()
            .next()
            .ok_or_else(|| ClassifierError::Runtime("No output from model".to_string()))?;

        let (_shape, data) = output
            .1
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::Runtime(format!("Failed to extract output: {}", e)))?;

        Ok(data.iter().copied().collect())
    }
}
