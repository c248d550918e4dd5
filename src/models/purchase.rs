use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::product::Platform;

/// Whether the user intends to let a subscription auto-renew.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenewalIntent {
    Renew,
    Lapse,
}

/// Whether the user was notified of or agreed to a price change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceConsentStatus {
    Notified,
    Agreed,
}

/// Reason a subscription or purchase was cancelled.
///
/// The validator reports "not cancelled" as an empty string, kept here as an
/// explicit sentinel variant so the wire format round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelationReason {
    #[serde(rename = "")]
    NotCanceled,
    #[serde(rename = "Developer")]
    Developer,
    #[serde(rename = "System")]
    System,
    #[serde(rename = "System.Replaced")]
    SystemReplaced,
    #[serde(rename = "System.ProductUnavailable")]
    SystemProductUnavailable,
    #[serde(rename = "System.BillingError")]
    SystemBillingError,
    #[serde(rename = "System.Deleted")]
    SystemDeleted,
    #[serde(rename = "Customer")]
    Customer,
    #[serde(rename = "Customer.TechnicalIssues")]
    CustomerTechnicalIssues,
    #[serde(rename = "Customer.PriceIncrease")]
    CustomerPriceIncrease,
    #[serde(rename = "Customer.Cost")]
    CustomerCost,
    #[serde(rename = "Customer.FoundBetterApp")]
    CustomerFoundBetterApp,
    #[serde(rename = "Customer.NotUsefulEnough")]
    CustomerNotUsefulEnough,
    #[serde(rename = "Customer.OtherReason")]
    CustomerOtherReason,
    #[serde(rename = "Unknown")]
    Unknown,
}

/// A purchase whose authenticity was confirmed by the receipt validator.
///
/// All timestamps are epoch milliseconds, as delivered on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedPurchase {
    /// Product identifier.
    #[serde(rename = "id")]
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_id: Option<String>,
    /// Identifier of the last transaction for this product.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    /// Date of first purchase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_date: Option<i64>,
    /// Date of expiry for a subscription.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<i64>,
    /// True when a subscription is expired.
    #[serde(default)]
    pub is_expired: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renewal_intent: Option<RenewalIntent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renewal_intent_change_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelation_reason: Option<CancelationReason>,
    /// True while the store retries a failed payment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_billing_retry_period: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_trial_period: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_intro_period: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_acknowledged: Option<bool>,
    /// Offer identifier of the discount applied to this purchase, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_consent_status: Option<PriceConsentStatus>,
    /// Last time a subscription was renewed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_renewal_date: Option<i64>,
}

impl VerifiedPurchase {
    pub fn new(product_id: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            platform: None,
            purchase_id: None,
            transaction_id: None,
            purchase_date: None,
            expiry_date: None,
            is_expired: false,
            renewal_intent: None,
            renewal_intent_change_date: None,
            cancelation_reason: None,
            is_billing_retry_period: None,
            is_trial_period: None,
            is_intro_period: None,
            is_acknowledged: None,
            discount_id: None,
            price_consent_status: None,
            last_renewal_date: None,
        }
    }

    /// True when the purchase carries an actual cancelation reason.
    pub fn is_canceled(&self) -> bool {
        matches!(self.cancelation_reason, Some(r) if r != CancelationReason::NotCanceled)
    }

    /// Timestamp used to rank purchases chronologically: expiry date,
    /// falling back to last renewal, then first purchase, then epoch zero.
    pub fn sorting_date(&self) -> i64 {
        self.expiry_date
            .or(self.last_renewal_date)
            .or(self.purchase_date)
            .unwrap_or(0)
    }

    pub fn expiry(&self) -> Option<OffsetDateTime> {
        self.expiry_date
            .and_then(|ms| OffsetDateTime::from_unix_timestamp(ms / 1000).ok())
    }

    /// Whether this purchase currently grants ownership: not expired, not
    /// cancelled, and any expiry date still in the future.
    pub fn owned(&self) -> bool {
        if self.is_expired || self.is_canceled() {
            return false;
        }
        match self.expiry_date {
            Some(expiry) => expiry > now_millis(),
            None => true,
        }
    }
}

/// Current epoch time in milliseconds, the unit used on the wire.
pub(crate) fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Status of a purchase moving through the in-flight state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingPurchaseState {
    Purchasing,
    Processing,
    Validating,
    Finishing,
    Completed,
    Cancelled,
}

impl PendingPurchaseState {
    /// Terminal states trigger removal from the tracker.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Purchasing => "purchasing",
            Self::Processing => "processing",
            Self::Validating => "validating",
            Self::Finishing => "finishing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for PendingPurchaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A purchase currently in flight, tracked per product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPurchase {
    pub product_id: String,
    pub status: PendingPurchaseState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer_id: Option<String>,
}
