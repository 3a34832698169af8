//! Deprecated backup store protocol, kept for one-directional restore
//! compatibility.
//!
//! Records written before the store migration live behind this endpoint.
//! The restore orchestrator probes it when the current endpoint has nothing
//! for a category; uploads always target the current protocol, so `upload`
//! here is a typed error. The old protocol predates raw bodies: listings
//! come back as record objects and content as a JSON byte array.

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
struct LegacyRecord {
    timestamp: u64,
}

#[derive(Deserialize)]
struct LegacyListResponse {
    backups: Vec<LegacyRecord>,
}

#[derive(Deserialize)]
struct LegacyContentResponse {
    content: Vec<u8>,
}

pub struct LegacyBackupTransport {
    http: reqwest::Client,
    base_url: String,
    identity: Arc<dyn IdentityProvider>,
}

impl LegacyBackupTransport {
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
            "{}/backups/{}/{}/{}",
            self.base_url,
            self.identity.public_key(),
            network,
            category
        )
    }
}

#[async_trait]
impl BackupTransport for LegacyBackupTransport {
    async fn upload(
        &self,
        _category: BackupCategory,
        _network: Network,
        _bytes: &[u8],
    ) -> Result<u64> {
        Err(EngineError::Unsupported(
            "legacy backup endpoint is restore-only",
        ))
    }

    async fn list(&self, category: BackupCategory, network: Network) -> Result<Vec<u64>> {
        let url = self.address(category, network);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| request_error(e, "legacy list"))?;

        if !response.status().is_success() {
            return Err(status_error(response.status(), "legacy list"));
        }

        let body: LegacyListResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Network(format!("legacy list: malformed response: {e}")))?;

        let mut timestamps: Vec<u64> = body.backups.into_iter().map(|r| r.timestamp).collect();
        timestamps.sort_unstable_by(|a, b| b.cmp(a));
        Ok(timestamps)
    }

    async fn fetch(
        &self,
        category: BackupCategory,
        network: Network,
        timestamp: u64,
    ) -> Result<Bytes> {
        let url = format!("{}/{}/content", self.address(category, network), timestamp);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| request_error(e, "legacy fetch"))?;

        if !response.status().is_success() {
            return Err(status_error(response.status(), "legacy fetch"));
        }

        let body: LegacyContentResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Network(format!("legacy fetch: malformed response: {e}")))?;

        let plaintext = self.identity.decrypt(&body.content).await?;
        Ok(Bytes::from(plaintext))
    }
}
