//! Canonical default documents, one per backup category.
//!
//! The top-level key set of each default is the structural contract a
//! restored payload must satisfy before it is trusted. The defaults are also
//! the base layer restored data is merged over, so a backup written by an
//! older app version still produces a complete document.

use super::BackupCategory;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::OnceLock;

fn shapes() -> &'static HashMap<BackupCategory, Value> {
    static SHAPES: OnceLock<HashMap<BackupCategory, Value>> = OnceLock::new();
    SHAPES.get_or_init(|| {
        HashMap::from([
            (
                BackupCategory::Wallet,
                json!({
                    "transfers": [],
                }),
            ),
            (
                BackupCategory::Settings,
                json!({
                    "currency": "USD",
                    "unit": "satoshi",
                    "transactionSpeed": "normal",
                    "hideBalance": false,
                    "pin": false,
                    "pinOnLaunch": true,
                    "biometrics": false,
                }),
            ),
            (
                BackupCategory::Widgets,
                json!({
                    "widgets": {},
                    "sortOrder": [],
                }),
            ),
            (
                BackupCategory::Metadata,
                json!({
                    "tags": {},
                    "lastUsedTags": [],
                    "pendingInvoices": [],
                    "slashTagsUrls": {},
                }),
            ),
            (
                BackupCategory::ProviderOrders,
                json!({
                    "orders": [],
                    "paidOrders": {},
                }),
            ),
            (
                BackupCategory::Contacts,
                json!({
                    "contacts": {},
                }),
            ),
            (
                BackupCategory::PaymentActivity,
                json!({
                    "items": [],
                }),
            ),
        ])
    })
}

/// Default shape for a category. Total over the closed category set.
pub fn default_shape(category: BackupCategory) -> &'static Value {
    // The map is built from BackupCategory::ALL's members; the closed enum
    // keeps this lookup infallible.
    &shapes()[&category]
}
