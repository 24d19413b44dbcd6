//! Anonymous-read Google Cloud Storage client.

use bytes::Bytes;
use reqwest::StatusCode;

use crate::{CloudError, ObjectStore};

const STORAGE_ENDPOINT: &str = "https://storage.googleapis.com";

/// A public GCS bucket holding block execution records.
///
/// Records are world-readable, so requests carry no credentials; the
/// bucket name and object name fully determine the URL.
pub struct GcsBucket {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
}

impl GcsBucket {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: STORAGE_ENDPOINT.to_string(),
            bucket: bucket.into(),
        }
    }

    /// Point at a different storage endpoint (emulators, tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait::async_trait]
impl ObjectStore for GcsBucket {
    async fn get(&self, name: &str) -> Result<Bytes, CloudError> {
        let url = format!("{}/{}/{}", self.endpoint, self.bucket, name);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CloudError::Transport {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        match response.status() {
            StatusCode::OK => response.bytes().await.map_err(|e| CloudError::Transport {
                name: name.to_string(),
                reason: e.to_string(),
            }),
            StatusCode::NOT_FOUND => Err(CloudError::NotFound(name.to_string())),
            status => Err(CloudError::Transport {
                name: name.to_string(),
                reason: format!("unexpected status {status}"),
            }),
        }
    }
}
