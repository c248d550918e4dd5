use serde::{Deserialize, Serialize};

/// Purchase platform a product or transaction belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "ios-appstore")]
    AppleAppStore,
    #[serde(rename = "android-playstore")]
    GooglePlay,
    #[serde(rename = "test")]
    Test,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AppleAppStore => "ios-appstore",
            Self::GooglePlay => "android-playstore",
            Self::Test => "test",
        }
    }
}

/// Product types understood by the receipt validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductType {
    #[serde(rename = "application")]
    Application,
    #[serde(rename = "paid subscription")]
    PaidSubscription,
    #[serde(rename = "non renewing subscription")]
    NonRenewingSubscription,
    #[serde(rename = "consumable")]
    Consumable,
    #[serde(rename = "non consumable")]
    NonConsumable,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Application => "application",
            Self::PaidSubscription => "paid subscription",
            Self::NonRenewingSubscription => "non renewing subscription",
            Self::Consumable => "consumable",
            Self::NonConsumable => "non consumable",
        }
    }
}

/// Developer-declared definition of an in-app product.
///
/// Definitions are immutable once loaded into the catalog; adding a
/// definition with an already-known id is a no-op (first write wins).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDefinition {
    /// Unique product identifier (the store SKU).
    pub id: String,
    /// Declared type of the product.
    #[serde(rename = "type")]
    pub product_type: ProductType,
    /// Entitlements granted to the user while this product is owned.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entitlements: Vec<String>,
    /// Token type granted by consumable products ("coin", "gem", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Amount of tokens granted by consumable products.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_value: Option<i64>,
}

impl ProductDefinition {
    pub fn new(id: impl Into<String>, product_type: ProductType) -> Self {
        Self {
            id: id.into(),
            product_type,
            entitlements: Vec::new(),
            token_type: None,
            token_value: None,
        }
    }

    pub fn with_entitlements(mut self, entitlements: &[&str]) -> Self {
        self.entitlements = entitlements.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn with_tokens(mut self, token_type: impl Into<String>, token_value: i64) -> Self {
        self.token_type = Some(token_type.into());
        self.token_value = Some(token_value);
        self
    }
}

/// How a pricing phase repeats over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecurrenceMode {
    NonRecurring,
    FiniteRecurring,
    InfiniteRecurring,
}

/// When the user pays for a pricing phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMode {
    PayAsYouGo,
    UpFront,
    FreeTrial,
}

/// One segment of an offer's price timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingPhase {
    /// Price formatted for humans, as provided by the store.
    pub price: String,
    /// Price in micro-units (1/1,000,000 of the currency unit).
    pub price_micros: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// ISO-8601 duration of the billing period (e.g. "P1M").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_period: Option<String>,
    /// Number of cycles when `recurrence_mode` is finite.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_cycles: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_mode: Option<RecurrenceMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_mode: Option<PaymentMode>,
}

/// Kind of offer attached to a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OfferType {
    Default,
    Introductory,
    Subscription,
}

/// One purchasable configuration of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    /// Offer identifier, unique within its product.
    pub id: String,
    pub platform: Platform,
    /// Identifier of the product this offer belongs to.
    pub product_id: String,
    /// Price timeline, in order.
    pub pricing_phases: Vec<PricingPhase>,
    pub offer_type: OfferType,
    /// Platform-specific token required to purchase this offer (Play).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer_token: Option<String>,
}

/// A fully materialized catalog entry: definition merged with store metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(rename = "type")]
    pub product_type: ProductType,
    pub id: String,
    pub offers: Vec<Offer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub platform: Platform,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entitlements: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_value: Option<i64>,
}
