//! Fetching media bytes from their source URLs

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::error::{RelayError, RelayResult};

/// Large originals can take a while to stream
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Source of item bytes
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    async fn download(&self, url: &str) -> RelayResult<Vec<u8>>;
}

/// Plain HTTP GET
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new() -> RelayResult<Self> {
        let client = Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(RelayError::Transport)?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MediaDownloader for HttpDownloader {
    async fn download(&self, url: &str) -> RelayResult<Vec<u8>> {
        let failed = |reason: String| RelayError::Download {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(failed(format!("HTTP {}", status.as_u16())));
        }

        let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
