//! Backup payload envelope.
//!
//! Every upload carries a fresh full snapshot of one category's domain state
//! (no diffing), wrapped in a small envelope so restore can sanity-check
//! what it fetched. The envelope serializes to UTF-8 JSON; the transport
//! encrypts those bytes before they leave the device.

use crate::registry::{BackupCategory, Network};
use crate::utils::errors::Result;
use crate::utils::now_millis;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Bumped when the envelope layout changes.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupPayload {
    pub category: BackupCategory,
    pub network: Network,
    pub schema_version: u32,
    /// Client-side collection time, unix milliseconds.
    pub timestamp: u64,
    /// The category's domain document.
    pub data: Value,
}

impl BackupPayload {
    pub fn new(category: BackupCategory, network: Network, data: Value) -> Self {
        Self {
            category,
            network,
            schema_version: SCHEMA_VERSION,
            timestamp: now_millis(),
            data,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
