//! Category registry: the closed set of backup categories and the dispatch
//! table tying each one to its collector, applier and default shape.
//!
//! Pure metadata and in-memory dispatch; no I/O happens here. Because
//! `BackupCategory` is a closed enum and every lookup is an exhaustive match
//! (or a map keyed by `ALL`), a category cannot exist without all three of
//! its pieces.

mod shapes;

use crate::domain::DomainStateHandle;
use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One independently-synchronized domain of wallet metadata.
///
/// Fixed at compile time; never created or destroyed at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackupCategory {
    Wallet,
    Settings,
    Widgets,
    Metadata,
    ProviderOrders,
    Contacts,
    PaymentActivity,
}

impl BackupCategory {
    pub const ALL: [BackupCategory; 7] = [
        BackupCategory::Wallet,
        BackupCategory::Settings,
        BackupCategory::Widgets,
        BackupCategory::Metadata,
        BackupCategory::ProviderOrders,
        BackupCategory::Contacts,
        BackupCategory::PaymentActivity,
    ];

    /// Wire name, used in remote addressing paths and payload envelopes.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupCategory::Wallet => "wallet",
            BackupCategory::Settings => "settings",
            BackupCategory::Widgets => "widgets",
            BackupCategory::Metadata => "metadata",
            BackupCategory::ProviderOrders => "providerOrders",
            BackupCategory::Contacts => "contacts",
            BackupCategory::PaymentActivity => "paymentActivity",
        }
    }
}

impl fmt::Display for BackupCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network namespace. Mainnet, testnet and regtest are independent backup
/// spaces under the same identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispatch table over the closed category set.
pub struct CategoryRegistry {
    domain: DomainStateHandle,
}

impl CategoryRegistry {
    pub fn new(domain: DomainStateHandle) -> Self {
        Self { domain }
    }

    /// Canonical example document whose key set defines a valid backup of
    /// this category.
    pub fn default_shape(&self, category: BackupCategory) -> &'static Value {
        shapes::default_shape(category)
    }

    /// Read the live domain state for a category. A category that has never
    /// been written collects as its default shape, so a fresh install still
    /// produces a structurally complete first backup.
    pub fn collect(&self, category: BackupCategory) -> Result<Value> {
        let doc = self
            .domain
            .get(category)
            .unwrap_or_else(|| shapes::default_shape(category).clone());
        if !doc.is_object() {
            return Err(EngineError::Registry(format!(
                "domain document for {category} is not an object"
            )));
        }
        Ok(doc)
    }

    /// Structural validation: every top-level key the default shape expects
    /// must be present in the decoded payload. Guards against corrupted or
    /// foreign-category data reaching the domain state.
    pub fn validate_shape(&self, category: BackupCategory, payload: &Value) -> Result<()> {
        let default = shapes::default_shape(category);
        let Some(payload_obj) = payload.as_object() else {
            return Err(EngineError::ShapeMismatch(format!(
                "{category}: payload is not an object"
            )));
        };
        if let Some(default_obj) = default.as_object() {
            for key in default_obj.keys() {
                if !payload_obj.contains_key(key) {
                    return Err(EngineError::ShapeMismatch(format!(
                        "{category}: missing expected key `{key}`"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Write decoded backup data back into domain state: default shape first,
    /// decoded payload merged over it, then category-specific overrides.
    /// The write goes through the silent restore path, so no dirty-marking
    /// feedback loop can occur.
    pub fn apply(&self, category: BackupCategory, payload: Value) -> Result<()> {
        let mut merged = merge_over(shapes::default_shape(category).clone(), payload)?;

        // Credentials do not travel with metadata backups: restored settings
        // must never arrive with security toggles enabled.
        if category == BackupCategory::Settings {
            if let Some(obj) = merged.as_object_mut() {
                obj.insert("pin".into(), Value::Bool(false));
                obj.insert("biometrics".into(), Value::Bool(false));
                obj.insert("pinOnLaunch".into(), Value::Bool(true));
            }
        }

        self.domain.apply_restored(category, merged);
        Ok(())
    }
}

/// Deep merge `payload` over `base`: payload keys win, nested objects merge
/// recursively, everything else replaces wholesale.
fn merge_over(base: Value, payload: Value) -> Result<Value> {
    let Value::Object(incoming) = payload else {
        return Err(EngineError::ShapeMismatch(
            "payload is not an object".to_string(),
        ));
    };
    let Value::Object(mut base_obj) = base else {
        return Err(EngineError::ShapeMismatch(
            "merge base is not an object".to_string(),
        ));
    };
    for (key, value) in incoming {
        match (base_obj.get_mut(&key), value) {
            (Some(existing @ Value::Object(_)), Value::Object(nested)) => {
                let merged = merge_over(existing.take(), Value::Object(nested))?;
                *existing = merged;
            }
            (_, value) => {
                base_obj.insert(key, value);
            }
        }
    }
    Ok(Value::Object(base_obj))
}
