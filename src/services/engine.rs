use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::bridge::{
    BridgeError, NativeErrorCode, PurchaseRequest, RawPurchase, RawPurchaseError, StoreBridge,
    SubscriptionOfferSelection, SubscriptionRequest,
};
use crate::error::{ErrorCode, Result, Severity, StoreError};
use crate::events::{EventBus, StoreEvent};
use crate::models::product::{Offer, Platform, ProductType};
use crate::models::purchase::{PendingPurchaseState, VerifiedPurchase};
use crate::models::validate::{
    AdditionalData, ValidateData, ValidateRequest, ValidateTransaction,
};
use crate::services::catalog::ProductCatalog;
use crate::services::debounce::DebouncedProcessor;
use crate::services::ledger::PurchaseLedger;
use crate::services::pending::PendingPurchases;
use crate::services::validator::ReceiptValidator;

/// How long raw native purchases stay cached after delivery.
///
/// Finishing a transaction later (a consumable consumed asynchronously)
/// needs the original native handle, which the verified record does not
/// carry.
const RAW_PURCHASE_TTL: Duration = Duration::from_secs(60);

struct CachedPurchase {
    purchase: RawPurchase,
    /// Reprocessing the same key bumps the generation so the stale eviction
    /// task leaves the fresh entry alone.
    generation: u64,
}

/// The purchase/error event processor.
///
/// Consumes raw native events through two debounced queues, drives receipt
/// validation, updates the pending tracker, upserts the ledger and decides
/// when to finish the native transaction.
pub struct ReconciliationEngine {
    platform: Platform,
    ios_bundle_id: Option<String>,
    bridge: Arc<dyn StoreBridge>,
    validator: Arc<dyn ReceiptValidator>,
    catalog: Arc<ProductCatalog>,
    ledger: Arc<PurchaseLedger>,
    pending: Arc<PendingPurchases>,
    events: Arc<EventBus>,
    application_username: RwLock<Option<String>>,
    /// Cleared on shutdown; a detached engine ignores every event so a
    /// replacement instance never races it.
    active: AtomicBool,
    purchase_queue: DebouncedProcessor<RawPurchase>,
    error_queue: DebouncedProcessor<RawPurchaseError>,
    raw_cache: Mutex<HashMap<String, CachedPurchase>>,
    cache_generation: AtomicU64,
    weak_self: Weak<Self>,
}

impl ReconciliationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        platform: Platform,
        ios_bundle_id: Option<String>,
        bridge: Arc<dyn StoreBridge>,
        validator: Arc<dyn ReceiptValidator>,
        catalog: Arc<ProductCatalog>,
        ledger: Arc<PurchaseLedger>,
        pending: Arc<PendingPurchases>,
        events: Arc<EventBus>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let purchase_weak = weak.clone();
            let purchase_queue = DebouncedProcessor::new(
                |raw: &RawPurchase| raw.cache_key(),
                move |raw| {
                    let weak = purchase_weak.clone();
                    async move {
                        if let Some(engine) = weak.upgrade() {
                            // Background delivery: failures become error
                            // events, never panics or lost queues.
                            let _ = engine.process_purchase(raw, true).await;
                        }
                    }
                    .boxed()
                },
            );
            let error_weak = weak.clone();
            let error_queue = DebouncedProcessor::new(
                |error: &RawPurchaseError| error.identity(),
                move |error| {
                    let weak = error_weak.clone();
                    async move {
                        if let Some(engine) = weak.upgrade() {
                            engine.process_error(error);
                        }
                    }
                    .boxed()
                },
            );
            Self {
                platform,
                ios_bundle_id,
                bridge,
                validator,
                catalog,
                ledger,
                pending,
                events,
                application_username: RwLock::new(None),
                active: AtomicBool::new(true),
                purchase_queue,
                error_queue,
                raw_cache: Mutex::new(HashMap::new()),
                cache_generation: AtomicU64::new(0),
                weak_self: weak.clone(),
            }
        })
    }

    /// Open the native store connection; on Play also drop failed purchases
    /// cached as pending (best effort recovery).
    pub async fn initialize(&self) -> Result<()> {
        self.bridge.init_connection().await.map_err(|e| {
            StoreError::new(
                Severity::Error,
                ErrorCode::Setup,
                format!("Failed to initialize the store connection: {e}"),
            )
        })?;
        if self.platform == Platform::GooglePlay {
            if let Err(e) = self.bridge.flush_failed_purchases().await {
                warn!("failed to flush pending failed purchases: {e}");
            }
        }
        info!("store connection initialized");
        Ok(())
    }

    /// Detach from the native event streams; queued events are dropped.
    pub fn shutdown(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.purchase_queue.cleanup();
        self.error_queue.cleanup();
    }

    pub fn set_application_username(&self, username: Option<String>) {
        *self
            .application_username
            .write()
            .expect("username lock poisoned") = username;
    }

    fn application_username(&self) -> Option<String> {
        self.application_username
            .read()
            .expect("username lock poisoned")
            .clone()
    }

    /// Entry point for the native purchase-updated stream.
    pub fn on_purchase_updated(&self, purchase: RawPurchase) {
        self.purchase_queue.add(purchase);
    }

    /// Entry point for the native purchase-error stream.
    pub fn on_purchase_error(&self, error: RawPurchaseError) {
        self.error_queue.add(error);
    }

    /// Initiate a purchase for one offer.
    ///
    /// The pending record is registered before the native call so progress
    /// shows even when the store dialog is slow to appear.
    #[instrument(skip(self, offer), fields(product_id = %offer.product_id, offer_id = %offer.id))]
    pub async fn order(&self, offer: &Offer) -> Result<()> {
        self.pending.add(offer);

        let username = self.application_username();
        // Usernames that are already UUIDs pass through; anything else is
        // hashed into a stable pseudonymous token.
        let app_account_token = username.as_deref().map(|u| {
            Uuid::parse_str(u).unwrap_or_else(|_| Uuid::new_v5(&Uuid::NAMESPACE_OID, u.as_bytes()))
        });
        // Play caps the obfuscated account id at 64 characters.
        let obfuscated_account_id = username.as_deref().map(|u| {
            let end = u.char_indices().nth(64).map(|(i, _)| i).unwrap_or(u.len());
            u[..end].to_string()
        });
        let result = if self.catalog.get_type(&offer.product_id) == ProductType::PaidSubscription {
            let subscription_offers = match (&offer.offer_token, self.platform) {
                // Play with an explicit offer token uses the multi-offer shape.
                (Some(token), Platform::GooglePlay) => vec![SubscriptionOfferSelection {
                    sku: offer.product_id.clone(),
                    offer_token: token.clone(),
                }],
                _ => Vec::new(),
            };
            self.bridge
                .request_subscription(SubscriptionRequest {
                    sku: offer.product_id.clone(),
                    app_account_token,
                    obfuscated_account_id: obfuscated_account_id.clone(),
                    subscription_offers,
                })
                .await
        } else {
            self.bridge
                .request_purchase(PurchaseRequest {
                    sku: offer.product_id.clone(),
                    app_account_token,
                    obfuscated_account_id,
                })
                .await
        };

        match result {
            Ok(()) => {
                self.pending.update(
                    &offer.product_id,
                    PendingPurchaseState::Processing,
                    Some(&offer.id),
                );
                Ok(())
            }
            Err(e) => {
                self.pending
                    .remove(&offer.product_id, PendingPurchaseState::Cancelled);
                Err(store_error_from_bridge(&e))
            }
        }
    }

    /// Process one deduplicated purchase event.
    ///
    /// `in_background` distinguishes restore/event-stream processing (errors
    /// become `error` events) from an active foreground purchase (errors
    /// propagate to the caller).
    #[instrument(skip(self, raw), fields(product_id = %raw.product_id))]
    pub async fn process_purchase(&self, raw: RawPurchase, in_background: bool) -> Result<()> {
        if !self.active.load(Ordering::SeqCst) {
            debug!("engine detached, ignoring purchase event");
            return Ok(());
        }
        self.cache_raw_purchase(&raw);

        let product_id = raw.product_id.clone();
        if self.pending.status(&product_id) == Some(PendingPurchaseState::Validating) {
            // Another flow already owns validation for this product; park
            // until it settles instead of re-entering.
            debug!("{product_id} already validating, waiting for the winner");
            self.pending.wait_while_validating(&product_id).await;
            return Ok(());
        }
        self.pending
            .update(&product_id, PendingPurchaseState::Validating, None);

        let request = match self.build_validate_request(&raw).await {
            Ok(request) => request,
            Err(e) => return self.validation_failed(&product_id, e, in_background),
        };
        let envelope = match self.validator.validate(&request).await {
            Ok(envelope) => envelope,
            Err(e) => return self.validation_failed(&product_id, e, in_background),
        };

        let data = if envelope.ok {
            envelope.data.unwrap_or_default()
        } else if envelope.code == Some(ErrorCode::ValidatorSubscriptionExpired.value()) {
            // Legacy "subscription expired" is a normal outcome, not an
            // error: treat it as a success proving no current ownership.
            debug!("{product_id}: subscription expired per validator");
            ValidateData::default()
        } else {
            let code = envelope
                .code
                .map(ErrorCode::from_value)
                .unwrap_or(ErrorCode::VerificationFailed);
            let mut error = StoreError::new(
                Severity::Error,
                code,
                envelope
                    .message
                    .clone()
                    .unwrap_or_else(|| "receipt validation rejected".to_string()),
            );
            if let Some(status) = envelope.status {
                error = error.with_status(status);
            }
            if let Some(message) = envelope.message {
                error = error.with_message(message);
            }
            return self.validation_failed(&product_id, error, in_background);
        };

        let collection = data.collection.unwrap_or_default();
        let proven = collection.iter().any(|p| p.product_id == product_id);
        for purchase in collection {
            self.ledger.add_purchase(purchase);
        }

        if !proven {
            // Stale or duplicate transaction: the receipt no longer proves
            // ownership, so just clean it up.
            info!("{product_id}: receipt proves no current ownership, finishing");
            self.finish(&raw, false).await;
            return Ok(());
        }

        match self.catalog.get_type(&product_id) {
            // Consumables close their pending record now so redelivered
            // events are not parked behind it; only the native finish is
            // deferred until the application consumes them explicitly.
            ProductType::Consumable => {
                self.pending
                    .update(&product_id, PendingPurchaseState::Completed, None);
                Ok(())
            }
            _ => {
                self.finish(&raw, false).await;
                Ok(())
            }
        }
    }

    /// Consume a validated consumable: finish the cached native transaction.
    ///
    /// A cache miss is not an error; the store redelivers unfinished
    /// transactions and finishing happens on the next delivery.
    #[instrument(skip(self, purchase), fields(product_id = %purchase.product_id))]
    pub async fn consume(&self, purchase: &VerifiedPurchase) -> Result<()> {
        let key = purchase
            .transaction_id
            .clone()
            .unwrap_or_else(|| purchase.product_id.clone());
        let raw = self
            .raw_cache
            .lock()
            .expect("raw cache lock poisoned")
            .get(&key)
            .map(|c| c.purchase.clone());
        let Some(raw) = raw else {
            debug!("no native transaction cached for {key}, skipping finish");
            return Ok(());
        };
        let is_consumable =
            self.catalog.get_type(&raw.product_id) == ProductType::Consumable;
        self.finish(&raw, is_consumable).await;
        Ok(())
    }

    /// Restore previously made purchases, reporting progress after each.
    ///
    /// Purchases are processed sequentially; both ordering and progress
    /// reporting depend on it. Any failure aborts the loop, resets progress
    /// and is rethrown.
    #[instrument(skip(self, progress))]
    pub async fn restore_purchases<F>(&self, mut progress: F) -> Result<u32>
    where
        F: FnMut(i32, i32),
    {
        let purchases = self.bridge.get_available_purchases().await.map_err(|e| {
            StoreError::new(
                Severity::Error,
                ErrorCode::LoadReceipts,
                format!("Failed to fetch available purchases: {e}"),
            )
        })?;

        if purchases.is_empty() {
            info!("no purchases to restore");
            progress(-1, 0);
            progress(0, 0);
            return Ok(0);
        }

        let total = purchases.len() as i32;
        info!("restoring {total} purchases");
        progress(0, total);
        for (index, raw) in purchases.into_iter().enumerate() {
            if let Err(e) = self.process_purchase(raw, false).await {
                progress(0, 0);
                return Err(e);
            }
            progress(index as i32 + 1, total);
        }
        Ok(total as u32)
    }

    /// Refresh the ledger from every purchase the store still reports,
    /// processing in the background so one bad receipt does not abort the
    /// load.
    pub async fn load_purchases(&self) -> Result<Vec<VerifiedPurchase>> {
        let purchases = self.bridge.get_available_purchases().await.map_err(|e| {
            StoreError::new(
                Severity::Error,
                ErrorCode::LoadReceipts,
                format!("Failed to fetch available purchases: {e}"),
            )
        })?;
        for raw in purchases {
            let _ = self.process_purchase(raw, true).await;
        }
        Ok(self.ledger.sorted())
    }

    fn cache_raw_purchase(&self, raw: &RawPurchase) {
        let key = raw.cache_key();
        let generation = self.cache_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.raw_cache
            .lock()
            .expect("raw cache lock poisoned")
            .insert(
                key.clone(),
                CachedPurchase {
                    purchase: raw.clone(),
                    generation,
                },
            );
        let weak = self.weak_self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(RAW_PURCHASE_TTL).await;
            if let Some(engine) = weak.upgrade() {
                let mut cache = engine.raw_cache.lock().expect("raw cache lock poisoned");
                // Only evict if the entry was not refreshed meanwhile.
                if cache.get(&key).map(|c| c.generation) == Some(generation) {
                    cache.remove(&key);
                }
            }
        });
    }

    async fn build_validate_request(&self, raw: &RawPurchase) -> Result<ValidateRequest> {
        let transaction_id = raw
            .transaction_id
            .clone()
            .unwrap_or_else(|| raw.product_id.clone());
        let transaction = match self.platform {
            Platform::AppleAppStore => {
                let receipt = match &raw.transaction_receipt {
                    Some(receipt) => receipt.clone(),
                    // StoreKit payloads sometimes arrive without the
                    // application receipt attached; fetch it from the bridge.
                    None => self
                        .bridge
                        .get_receipt(false)
                        .await
                        .map_err(|e| {
                            StoreError::new(
                                Severity::Error,
                                ErrorCode::MissingToken,
                                format!("Failed to load the application receipt: {e}"),
                            )
                        })?
                        .ok_or_else(|| {
                            StoreError::new(
                                Severity::Error,
                                ErrorCode::MissingToken,
                                "No application receipt available",
                            )
                        })?,
                };
                ValidateTransaction::AppStore {
                    id: raw
                        .transaction_id
                        .clone()
                        .or_else(|| self.ios_bundle_id.clone())
                        .unwrap_or_else(|| raw.product_id.clone()),
                    app_store_receipt: receipt,
                }
            }
            _ => ValidateTransaction::Play {
                id: transaction_id,
                purchase_token: raw.purchase_token.clone().ok_or_else(|| {
                    StoreError::new(
                        Severity::Error,
                        ErrorCode::MissingToken,
                        format!("No purchase token for {}", raw.product_id),
                    )
                })?,
                receipt: raw.transaction_receipt.clone().unwrap_or_default(),
                signature: raw.signature.clone().unwrap_or_default(),
            },
        };
        Ok(ValidateRequest {
            id: raw.product_id.clone(),
            product_type: self.catalog.get_type(&raw.product_id),
            transaction,
            products: self.catalog.all(),
            additional_data: self.application_username().map(|u| AdditionalData {
                application_username: Some(u),
            }),
        })
    }

    /// Validation failed: leave the purchase retryable and route the error
    /// by context.
    fn validation_failed(
        &self,
        product_id: &str,
        error: StoreError,
        in_background: bool,
    ) -> Result<()> {
        warn!("validation failed for {product_id}: {error}");
        // Revert to a retryable state so a redelivery can re-enter the flow.
        self.pending
            .update(product_id, PendingPurchaseState::Processing, None);
        if in_background {
            self.events.emit(StoreEvent::Error(error));
            Ok(())
        } else {
            Err(error)
        }
    }

    /// Best-effort finish: failures are logged, never propagated. An
    /// unfinished transaction is simply redelivered later.
    async fn finish(&self, raw: &RawPurchase, is_consumable: bool) {
        self.pending
            .update(&raw.product_id, PendingPurchaseState::Finishing, None);
        if let Err(e) = self.bridge.finish_transaction(raw, is_consumable).await {
            warn!("failed to finish transaction {}: {e}", raw.cache_key());
        }
        self.pending
            .update(&raw.product_id, PendingPurchaseState::Completed, None);
    }

    fn process_error(&self, error: RawPurchaseError) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        let store_error = store_error_from_native(&error);
        if store_error.is_informational() {
            // The user backed out of the store dialog; cancel whatever order
            // was waiting on it.
            for pending in self.pending.list() {
                if matches!(
                    pending.status,
                    PendingPurchaseState::Purchasing | PendingPurchaseState::Processing
                ) {
                    self.pending
                        .remove(&pending.product_id, PendingPurchaseState::Cancelled);
                }
            }
        }
        self.events.emit(StoreEvent::Error(store_error));
    }
}

impl Drop for ReconciliationEngine {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

fn store_error_from_bridge(error: &BridgeError) -> StoreError {
    match error {
        BridgeError::Rejected(raw) => store_error_from_native(raw),
        BridgeError::Other(e) => {
            StoreError::new(Severity::Error, ErrorCode::Purchase, format!("{e}"))
        }
    }
}

/// Map a native billing error onto the stable error taxonomy.
///
/// Cancellation is informational so callers can silently ignore it.
fn store_error_from_native(error: &RawPurchaseError) -> StoreError {
    let (severity, code) = match error.code.unwrap_or(NativeErrorCode::Unknown) {
        NativeErrorCode::UserCancelled => (Severity::Info, ErrorCode::PaymentCancelled),
        NativeErrorCode::DeferredPayment => (Severity::Info, ErrorCode::Purchase),
        NativeErrorCode::ItemUnavailable => (Severity::Error, ErrorCode::ProductNotAvailable),
        NativeErrorCode::NetworkError | NativeErrorCode::RemoteError | NativeErrorCode::ServiceError => {
            (Severity::Error, ErrorCode::Communication)
        }
        NativeErrorCode::NotPrepared | NativeErrorCode::IapNotAvailable => {
            (Severity::Error, ErrorCode::Setup)
        }
        NativeErrorCode::DeveloperError | NativeErrorCode::UserError => {
            (Severity::Error, ErrorCode::PaymentInvalid)
        }
        NativeErrorCode::AlreadyOwned => (Severity::Warning, ErrorCode::Purchase),
        NativeErrorCode::ReceiptFailed => (Severity::Error, ErrorCode::VerificationFailed),
        NativeErrorCode::ReceiptFinishFailed | NativeErrorCode::NotEnded => {
            (Severity::Error, ErrorCode::Finish)
        }
        NativeErrorCode::BillingResponseJsonParseError => {
            (Severity::Error, ErrorCode::BadResponse)
        }
        NativeErrorCode::Interrupted => (Severity::Warning, ErrorCode::Purchase),
        NativeErrorCode::Unknown => (Severity::Error, ErrorCode::Unknown),
    };
    let mut store_error = StoreError::new(
        severity,
        code,
        error
            .debug_message
            .clone()
            .or_else(|| error.message.clone())
            .unwrap_or_else(|| format!("{:?}", error.code)),
    );
    if let Some(status) = error.response_code {
        store_error = store_error.with_status(status);
    }
    if let Some(message) = &error.message {
        store_error = store_error.with_message(message.clone());
    }
    store_error
}
