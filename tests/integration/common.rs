// Shared test doubles for the store bridge and the receipt validator.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use purchasekit::bridge::{
    BridgeError, ProductMetadata, PurchaseRequest, RawPurchase, RawPurchaseError, StoreBridge,
    SubscriptionMetadata, SubscriptionRequest,
};
use purchasekit::models::validate::{ValidateData, ValidateRequest, ValidateResponse};
use purchasekit::services::validator::ReceiptValidator;
use purchasekit::{Offer, OfferType, Platform, Store, StoreConfig, VerifiedPurchase};

pub fn test_config() -> StoreConfig {
    StoreConfig {
        app_name: "test-app".to_string(),
        public_key: "test-key".to_string(),
        base_url: "https://validator.invalid".to_string(),
        platform: Platform::Test,
        ios_bundle_id: None,
    }
}

pub fn test_store(bridge: Arc<MockBridge>, validator: Arc<MockValidator>) -> Store {
    init_tracing();
    Store::with_validator(test_config(), bridge, validator)
}

/// Route tracing output to the test harness, honoring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A raw native purchase with enough receipt material to validate.
pub fn raw_purchase(product_id: &str, transaction_id: &str) -> RawPurchase {
    let mut raw = RawPurchase::new(product_id, transaction_id);
    raw.purchase_token = Some(format!("token-{transaction_id}"));
    raw.transaction_receipt = Some("{}".to_string());
    raw.signature = Some("sig".to_string());
    raw
}

pub fn test_offer(product_id: &str) -> Offer {
    Offer {
        id: product_id.to_string(),
        platform: Platform::Test,
        product_id: product_id.to_string(),
        pricing_phases: Vec::new(),
        offer_type: OfferType::Default,
        offer_token: None,
    }
}

/// In-memory store bridge recording every call.
#[derive(Default)]
pub struct MockBridge {
    pub subscriptions: Mutex<Vec<SubscriptionMetadata>>,
    pub products: Mutex<Vec<ProductMetadata>>,
    pub available_purchases: Mutex<Vec<RawPurchase>>,
    pub purchase_requests: Mutex<Vec<String>>,
    pub subscription_requests: Mutex<Vec<String>>,
    /// Transactions finished, as (cache key, is_consumable) pairs.
    pub finished: Mutex<Vec<(String, bool)>>,
    /// Next purchase/subscription request fails with this error.
    pub reject_next: Mutex<Option<RawPurchaseError>>,
}

impl MockBridge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_available_purchases(&self, purchases: Vec<RawPurchase>) {
        *self.available_purchases.lock().unwrap() = purchases;
    }

    pub fn reject_next_request(&self, error: RawPurchaseError) {
        *self.reject_next.lock().unwrap() = Some(error);
    }

    fn take_rejection(&self) -> Result<(), BridgeError> {
        match self.reject_next.lock().unwrap().take() {
            Some(error) => Err(BridgeError::Rejected(error)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl StoreBridge for MockBridge {
    async fn init_connection(&self) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn fetch_subscriptions(
        &self,
        skus: &[String],
    ) -> Result<Vec<SubscriptionMetadata>, BridgeError> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| skus.contains(&s.product_id().to_string()))
            .cloned()
            .collect())
    }

    async fn fetch_products(&self, skus: &[String]) -> Result<Vec<ProductMetadata>, BridgeError> {
        Ok(self
            .products
            .lock()
            .unwrap()
            .iter()
            .filter(|p| skus.contains(&p.product_id))
            .cloned()
            .collect())
    }

    async fn request_purchase(&self, request: PurchaseRequest) -> Result<(), BridgeError> {
        self.take_rejection()?;
        self.purchase_requests.lock().unwrap().push(request.sku);
        Ok(())
    }

    async fn request_subscription(&self, request: SubscriptionRequest) -> Result<(), BridgeError> {
        self.take_rejection()?;
        self.subscription_requests.lock().unwrap().push(request.sku);
        Ok(())
    }

    async fn get_available_purchases(&self) -> Result<Vec<RawPurchase>, BridgeError> {
        Ok(self.available_purchases.lock().unwrap().clone())
    }

    async fn finish_transaction(
        &self,
        purchase: &RawPurchase,
        is_consumable: bool,
    ) -> Result<(), BridgeError> {
        self.finished
            .lock()
            .unwrap()
            .push((purchase.cache_key(), is_consumable));
        Ok(())
    }

    async fn get_receipt(&self, _force_refresh: bool) -> Result<Option<String>, BridgeError> {
        Ok(Some("app-receipt".to_string()))
    }

    async fn flush_failed_purchases(&self) -> Result<(), BridgeError> {
        Ok(())
    }
}

/// Scripted receipt validator: responses are consumed in order, one per
/// call; once the script runs out it answers with an empty collection.
#[derive(Default)]
pub struct MockValidator {
    responses: Mutex<VecDeque<ValidateResponse>>,
    delay: Mutex<Option<Duration>>,
    pub calls: AtomicUsize,
}

impl MockValidator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_response(&self, collection: Vec<VerifiedPurchase>) {
        self.responses.lock().unwrap().push_back(ValidateResponse {
            ok: true,
            data: Some(ValidateData {
                collection: Some(collection),
                ..ValidateData::default()
            }),
            status: None,
            code: None,
            message: None,
        });
    }

    /// Script a business rejection (`ok: false`) with the given error code.
    pub fn push_rejection(&self, code: u32, message: &str) {
        self.responses.lock().unwrap().push_back(ValidateResponse {
            ok: false,
            data: None,
            status: Some(400),
            code: Some(code),
            message: Some(message.to_string()),
        });
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReceiptValidator for MockValidator {
    async fn validate(
        &self,
        _request: &ValidateRequest,
    ) -> purchasekit::Result<ValidateResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let response = self.responses.lock().unwrap().pop_front();
        Ok(response.unwrap_or_else(|| ValidateResponse {
            ok: true,
            data: Some(ValidateData {
                collection: Some(Vec::new()),
                ..ValidateData::default()
            }),
            status: None,
            code: None,
            message: None,
        }))
    }
}
