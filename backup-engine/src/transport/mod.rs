//! Transport to the remote backup store.
//!
//! A backup record is an opaque encrypted blob addressed by
//! (identity public key, category, network namespace, timestamp). The
//! transport owns encoding, encryption, and the HTTP protocol; callers hand
//! it plaintext envelope bytes and get plaintext back. Two implementations
//! exist: the current protocol ([`client::HttpBackupTransport`]) and the
//! deprecated one ([`legacy::LegacyBackupTransport`]), which is probed only
//! as a restore fallback. Every failure is a typed error; a transport never
//! answers a problem with a silent empty result.

pub mod client;
pub mod legacy;
pub mod payload;

use crate::registry::{BackupCategory, Network};
use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use bytes::Bytes;

#[async_trait]
pub trait BackupTransport: Send + Sync {
    /// Encrypt and store one snapshot; returns the server-assigned record
    /// timestamp.
    async fn upload(&self, category: BackupCategory, network: Network, bytes: &[u8])
        -> Result<u64>;

    /// Known record timestamps for the address, newest first.
    async fn list(&self, category: BackupCategory, network: Network) -> Result<Vec<u64>>;

    /// Download and decrypt a specific record.
    async fn fetch(
        &self,
        category: BackupCategory,
        network: Network,
        timestamp: u64,
    ) -> Result<Bytes>;
}

/// Map an HTTP response status to the engine error taxonomy.
pub(crate) fn status_error(status: reqwest::StatusCode, context: &str) -> EngineError {
    match status.as_u16() {
        401 | 403 => EngineError::Auth(format!("{context}: HTTP {status}")),
        404 => EngineError::NotFound(context.to_string()),
        _ => EngineError::Network(format!("{context}: HTTP {status}")),
    }
}

/// Map a reqwest transport failure (connect, timeout, TLS) to a transient
/// network error.
pub(crate) fn request_error(err: reqwest::Error, context: &str) -> EngineError {
    EngineError::Network(format!("{context}: {err}"))
}
