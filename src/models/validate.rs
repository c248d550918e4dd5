use serde::{Deserialize, Serialize};

use super::product::{Product, ProductType};
use super::purchase::VerifiedPurchase;

/// Platform-tagged transaction descriptor sent to the validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ValidateTransaction {
    #[serde(rename = "ios-appstore", rename_all = "camelCase")]
    AppStore {
        /// Transaction identifier, or the bundle id for an application receipt.
        id: String,
        /// App Store receipt, base64 encoded.
        app_store_receipt: String,
    },
    #[serde(rename = "android-playstore", rename_all = "camelCase")]
    Play {
        /// The `orderId` from the Play receipt.
        id: String,
        purchase_token: String,
        /// Play receipt as a JSON-encoded string.
        receipt: String,
        /// Signature used to validate the local receipt.
        signature: String,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalData {
    /// Attach the purchases to the given application user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_username: Option<String>,
}

/// Body of a `POST /v1/validate` request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    /// Identifier of the product being validated; the application bundle id
    /// for an application receipt.
    pub id: String,
    #[serde(rename = "type")]
    pub product_type: ProductType,
    pub transaction: ValidateTransaction,
    /// Full catalog, so the validator can resolve every purchase in the receipt.
    pub products: Vec<Product>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<AdditionalData>,
}

impl ValidateRequest {
    pub fn transaction_id(&self) -> &str {
        match &self.transaction {
            ValidateTransaction::AppStore { id, .. } => id,
            ValidateTransaction::Play { id, .. } => id,
        }
    }
}

/// Payload of a successful validation.
///
/// Field names follow the validator wire format.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValidateData {
    /// Every purchase proven by this receipt, not just the one validated.
    #[serde(default)]
    pub collection: Option<Vec<VerifiedPurchase>>,
    /// Product ids no longer eligible for an introductory price.
    #[serde(default)]
    pub ineligible_for_intro_price: Option<Vec<String>>,
    #[serde(default)]
    pub id: Option<String>,
    /// True when the validator used the latest known receipt.
    #[serde(default)]
    pub latest_receipt: Option<bool>,
    /// Native transaction detail, passed through untouched.
    #[serde(default)]
    pub transaction: Option<serde_json::Value>,
    /// Present when the server fell back to a backup validation path.
    #[serde(default)]
    pub warning: Option<String>,
    /// Server-side validation time (more reliable than the device clock).
    #[serde(default)]
    pub date: Option<String>,
}

/// Raw envelope returned by the validator, success or failure.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidateResponse {
    pub ok: bool,
    #[serde(default)]
    pub data: Option<ValidateData>,
    /// HTTP-like status reported in the body on failure.
    #[serde(default)]
    pub status: Option<u16>,
    /// Stable numeric error code on failure.
    #[serde(default)]
    pub code: Option<u32>,
    #[serde(default)]
    pub message: Option<String>,
}
