//! Sync-relevant application settings

use serde::{Deserialize, Serialize};

use super::PaymentMethod;

/// Settings that travel with the ledger as `settings.json` on the remote.
///
/// Purely local preferences (theme, notifications) are not part of this
/// payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncedSettings {
    /// ISO 4217 currency code used to render amounts
    pub currency: String,
    /// Ordered category list shown when adding an expense
    #[serde(default)]
    pub categories: Vec<String>,
    /// Payment method preselected for new expenses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_payment_method: Option<PaymentMethod>,
}

impl Default for SyncedSettings {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            categories: [
                "Food",
                "Transport",
                "Shopping",
                "Bills",
                "Entertainment",
                "Health",
                "Other",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            default_payment_method: None,
        }
    }
}
