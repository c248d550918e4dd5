//! Contract with the native store bridge.
//!
//! The bridge is the only component that talks to the platform's billing
//! library. Raw metadata payloads are platform-tagged unions; all
//! platform-specific parsing happens in the catalog's translation layer.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::product::Platform;

/// Raw store error codes, as reported by the native billing library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeErrorCode {
    UserCancelled,
    ItemUnavailable,
    NetworkError,
    ServiceError,
    ReceiptFailed,
    NotPrepared,
    DeveloperError,
    AlreadyOwned,
    DeferredPayment,
    UserError,
    RemoteError,
    ReceiptFinishFailed,
    NotEnded,
    BillingResponseJsonParseError,
    Interrupted,
    IapNotAvailable,
    Unknown,
}

/// A purchase/error event payload from the native error stream.
#[derive(Debug, Clone)]
pub struct RawPurchaseError {
    pub code: Option<NativeErrorCode>,
    pub message: Option<String>,
    pub debug_message: Option<String>,
    pub response_code: Option<u16>,
}

impl RawPurchaseError {
    /// Identity key used to collapse duplicate deliveries of the same error.
    pub fn identity(&self) -> String {
        self.code.map(|c| format!("{c:?}")).unwrap_or_default()
    }
}

/// An unverified purchase as delivered by the native purchase-updated stream.
#[derive(Debug, Clone)]
pub struct RawPurchase {
    pub product_id: String,
    pub transaction_id: Option<String>,
    pub transaction_date: Option<i64>,
    /// Platform receipt: base64 App Store receipt, or the Play receipt JSON.
    pub transaction_receipt: Option<String>,
    /// Play purchase token, when the bridge surfaces it separately.
    pub purchase_token: Option<String>,
    /// Play receipt signature.
    pub signature: Option<String>,
}

impl RawPurchase {
    pub fn new(product_id: impl Into<String>, transaction_id: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            transaction_id: Some(transaction_id.into()),
            transaction_date: None,
            transaction_receipt: None,
            purchase_token: None,
            signature: None,
        }
    }

    /// Key under which this purchase is cached and deduplicated.
    pub fn cache_key(&self) -> String {
        self.transaction_id
            .clone()
            .unwrap_or_else(|| self.product_id.clone())
    }
}

/// Request shape for one-time products.
#[derive(Debug, Clone)]
pub struct PurchaseRequest {
    pub sku: String,
    /// iOS app account token (UUID) identifying the user pseudonymously.
    pub app_account_token: Option<Uuid>,
    /// Android obfuscated account id (max 64 characters).
    pub obfuscated_account_id: Option<String>,
}

/// One offer selection inside a subscription request (Play multi-offer shape).
#[derive(Debug, Clone)]
pub struct SubscriptionOfferSelection {
    pub sku: String,
    pub offer_token: String,
}

/// Request shape for subscriptions.
#[derive(Debug, Clone)]
pub struct SubscriptionRequest {
    pub sku: String,
    pub app_account_token: Option<Uuid>,
    pub obfuscated_account_id: Option<String>,
    /// Present only on Play when an explicit offer token was selected.
    pub subscription_offers: Vec<SubscriptionOfferSelection>,
}

/// Error returned by bridge operations.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The store rejected the request with a native error payload.
    #[error("store request rejected ({0:?})")]
    Rejected(RawPurchaseError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BridgeError {
    pub fn native_code(&self) -> Option<NativeErrorCode> {
        match self {
            Self::Rejected(e) => e.code,
            Self::Other(_) => None,
        }
    }
}

/// Raw Play pricing phase, straight from `subscriptionOfferDetails`.
#[derive(Debug, Clone)]
pub struct PlayPricingPhase {
    pub formatted_price: String,
    pub price_amount_micros: i64,
    pub price_currency_code: String,
    /// ISO-8601 period, e.g. "P1M".
    pub billing_period: String,
    pub billing_cycle_count: u32,
    /// 1 = infinite recurring, 2 = finite recurring, 3 = non-recurring.
    pub recurrence_mode: i32,
}

/// One Play subscription offer (base plan or promotional offer).
#[derive(Debug, Clone)]
pub struct PlayOfferDetails {
    pub base_plan_id: Option<String>,
    pub offer_id: Option<String>,
    pub offer_token: String,
    pub pricing_phases: Vec<PlayPricingPhase>,
}

/// Raw Play subscription metadata.
#[derive(Debug, Clone)]
pub struct PlaySubscription {
    pub product_id: String,
    pub title: String,
    pub description: Option<String>,
    pub offer_details: Vec<PlayOfferDetails>,
}

/// App Store subscription period units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodUnit {
    Day,
    Week,
    Month,
    Year,
}

impl PeriodUnit {
    /// Single-letter ISO-8601 designator.
    pub fn iso_code(self) -> char {
        match self {
            Self::Day => 'D',
            Self::Week => 'W',
            Self::Month => 'M',
            Self::Year => 'Y',
        }
    }
}

/// App Store payment modes for introductory prices and discounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppStorePaymentMode {
    FreeTrial,
    PayAsYouGo,
    PayUpFront,
}

/// Introductory price attached to an App Store subscription.
#[derive(Debug, Clone)]
pub struct AppStoreIntroductoryPrice {
    pub display_price: String,
    pub price_micros: i64,
    pub period_count: u32,
    pub period_unit: Option<PeriodUnit>,
    pub payment_mode: Option<AppStorePaymentMode>,
}

/// Promotional discount attached to an App Store subscription.
#[derive(Debug, Clone)]
pub struct AppStoreDiscount {
    pub identifier: String,
    pub display_price: String,
    pub price_micros: i64,
    pub period_count: u32,
    pub period_unit: Option<PeriodUnit>,
    pub payment_mode: Option<AppStorePaymentMode>,
}

/// Raw App Store subscription metadata.
#[derive(Debug, Clone)]
pub struct AppStoreSubscription {
    pub product_id: String,
    pub title: String,
    pub description: Option<String>,
    pub display_price: String,
    pub price_micros: i64,
    pub currency: Option<String>,
    pub period_count: u32,
    pub period_unit: Option<PeriodUnit>,
    pub introductory_price: Option<AppStoreIntroductoryPrice>,
    pub discounts: Vec<AppStoreDiscount>,
}

/// Store subscription metadata, tagged by platform.
#[derive(Debug, Clone)]
pub enum SubscriptionMetadata {
    Play(PlaySubscription),
    AppStore(AppStoreSubscription),
}

impl SubscriptionMetadata {
    pub fn product_id(&self) -> &str {
        match self {
            Self::Play(s) => &s.product_id,
            Self::AppStore(s) => &s.product_id,
        }
    }
}

/// Store metadata for a one-time (non-subscription) product.
#[derive(Debug, Clone)]
pub struct ProductMetadata {
    pub platform: Platform,
    pub product_id: String,
    pub title: String,
    pub description: Option<String>,
    pub display_price: String,
    pub price_micros: i64,
    pub currency: Option<String>,
}

/// The native store bridge consumed by this crate.
///
/// Implementations wrap the platform billing library; the two native event
/// streams (purchase-updated, purchase-error) are wired by forwarding each
/// delivery into the reconciliation engine's `on_purchase_updated` /
/// `on_purchase_error`.
#[async_trait]
pub trait StoreBridge: Send + Sync {
    async fn init_connection(&self) -> Result<(), BridgeError>;

    /// Fetch store metadata for subscription products.
    async fn fetch_subscriptions(
        &self,
        skus: &[String],
    ) -> Result<Vec<SubscriptionMetadata>, BridgeError>;

    /// Fetch store metadata for one-time products.
    async fn fetch_products(&self, skus: &[String]) -> Result<Vec<ProductMetadata>, BridgeError>;

    async fn request_purchase(&self, request: PurchaseRequest) -> Result<(), BridgeError>;

    async fn request_subscription(&self, request: SubscriptionRequest) -> Result<(), BridgeError>;

    /// All purchases the store still considers available (unfinished or owned).
    async fn get_available_purchases(&self) -> Result<Vec<RawPurchase>, BridgeError>;

    /// Acknowledge/finish a transaction. Consumables are consumed.
    async fn finish_transaction(
        &self,
        purchase: &RawPurchase,
        is_consumable: bool,
    ) -> Result<(), BridgeError>;

    /// iOS application receipt (StoreKit 1), when the purchase payload
    /// carries none.
    async fn get_receipt(&self, force_refresh: bool) -> Result<Option<String>, BridgeError>;

    /// Android recovery: drop failed purchases cached as pending.
    async fn flush_failed_purchases(&self) -> Result<(), BridgeError>;
}
