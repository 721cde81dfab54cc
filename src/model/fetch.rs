//! Fetching model files over HTTP or from the local filesystem

use std::time::Duration;

use url::Url;

use crate::error::{ClassifierError, Result};

/// Fetches `http`, `https` and `file` URLs
#[derive(Clone, Debug)]
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ClassifierError::Runtime(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Fetch the body at `url`. `what` names the resource in error messages.
    pub async fn fetch(&self, url: &Url, what: &'static str) -> Result<Vec<u8>> {
        match url.scheme() {
            "http" | "https" => self.fetch_http(url, what).await,
            "file" => Self::fetch_file(url, what).await,
            scheme => Err(ClassifierError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme '{}'", scheme),
            }),
        }
    }

    async fn fetch_http(&self, url: &Url, what: &'static str) -> Result<Vec<u8>> {
        let transport = |e: reqwest::Error| ClassifierError::Transport {
            what,
            url: url.to_string(),
            source: Box::new(e),
        };

        let response = self.client.get(url.clone()).send().await.map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassifierError::Fetch {
                what,
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(transport)?;
        tracing::debug!(url = %url, bytes = body.len(), "Fetched {}", what);
        Ok(body.to_vec())
    }

    async fn fetch_file(url: &Url, what: &'static str) -> Result<Vec<u8>> {
        let path = url.to_file_path().map_err(|_| ClassifierError::InvalidUrl {
            url: url.to_string(),
            reason: "not a local file path".to_string(),
        })?;

        match tokio::fs::read(&path).await {
            Ok(body) => Ok(body),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ClassifierError::Fetch {
                what,
                url: url.to_string(),
                status: 404,
            }),
            Err(e) => Err(ClassifierError::Transport {
                what,
                url: url.to_string(),
                source: Box::new(e),
            }),
        }
    }
}
