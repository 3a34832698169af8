//! Current backup store protocol.
//!
//! Addressing: `{base}/v1/backups/{pubkey}/{network}/{category}`.
//! - `POST` the encrypted blob (`application/octet-stream`), answered with
//!   `{"timestamp": <ms>}`, the server-assigned record timestamp.
//! - `GET` the address, answered with `{"timestamps": [..]}`.
//! - `GET` `{address}/{timestamp}`, answered with the raw encrypted blob.

use super::{request_error, status_error, BackupTransport};
use crate::identity::IdentityProvider;
use crate::registry::{BackupCategory, Network};
use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Deserialize)]
struct UploadResponse {
    timestamp: u64,
}

#[derive(Deserialize)]
struct ListResponse {
    timestamps: Vec<u64>,
}

pub struct HttpBackupTransport {
    http: reqwest::Client,
    base_url: String,
    identity: Arc<dyn IdentityProvider>,
}

impl HttpBackupTransport {
    pub fn new(
        base_url: impl Into<String>,
        identity: Arc<dyn IdentityProvider>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            identity,
        })
    }

    fn address(&self, category: BackupCategory, network: Network) -> String {
        format!(
            "{}/v1/backups/{}/{}/{}",
            self.base_url,
            self.identity.public_key(),
            network,
            category
        )
    }
}

#[async_trait]
impl BackupTransport for HttpBackupTransport {
    async fn upload(
        &self,
        category: BackupCategory,
        network: Network,
        bytes: &[u8],
    ) -> Result<u64> {
        let ciphertext = self.identity.encrypt(bytes).await?;
        let url = self.address(category, network);

        let response = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(ciphertext)
            .send()
            .await
            .map_err(|e| request_error(e, "upload"))?;

        if !response.status().is_success() {
            return Err(status_error(response.status(), "upload"));
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Network(format!("upload: malformed response: {e}")))?;
        Ok(body.timestamp)
    }

    async fn list(&self, category: BackupCategory, network: Network) -> Result<Vec<u64>> {
        let url = self.address(category, network);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| request_error(e, "list"))?;

        if !response.status().is_success() {
            return Err(status_error(response.status(), "list"));
        }

        let body: ListResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Network(format!("list: malformed response: {e}")))?;

        let mut timestamps = body.timestamps;
        timestamps.sort_unstable_by(|a, b| b.cmp(a));
        Ok(timestamps)
    }

    async fn fetch(
        &self,
        category: BackupCategory,
        network: Network,
        timestamp: u64,
    ) -> Result<Bytes> {
        let url = format!("{}/{}", self.address(category, network), timestamp);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| request_error(e, "fetch"))?;

        if !response.status().is_success() {
            return Err(status_error(response.status(), "fetch"));
        }

        let ciphertext = response
            .bytes()
            .await
            .map_err(|e| EngineError::Network(format!("fetch: body read failed: {e}")))?;

        let plaintext = self.identity.decrypt(&ciphertext).await?;
        Ok(Bytes::from(plaintext))
    }
}
