use std::sync::Arc;

use tracing::info;

use crate::bridge::{RawPurchase, RawPurchaseError, StoreBridge};
use crate::config::StoreConfig;
use crate::error::{ErrorCode, Result, Severity, StoreError};
use crate::events::{EventBus, EventKind, ListenerId, StoreEvent};
use crate::models::product::{Offer, Product, ProductDefinition};
use crate::models::purchase::{PendingPurchase, PendingPurchaseState, VerifiedPurchase};
use crate::services::catalog::ProductCatalog;
use crate::services::consumables::ConsumableProjection;
use crate::services::engine::ReconciliationEngine;
use crate::services::ledger::PurchaseLedger;
use crate::services::non_consumables::NonConsumableProjection;
use crate::services::pending::PendingPurchases;
use crate::services::subscriptions::SubscriptionProjection;
use crate::services::tokens::TokenLedger;
use crate::services::validator::{HttpValidator, ReceiptValidator};

/// Application-facing surface wiring the whole pipeline together.
///
/// Mostly pass-through: native events go in through
/// [`Store::on_purchase_updated`] / [`Store::on_purchase_error`], ownership
/// queries come out of the projections.
pub struct Store {
    bridge: Arc<dyn StoreBridge>,
    events: Arc<EventBus>,
    catalog: Arc<ProductCatalog>,
    ledger: Arc<PurchaseLedger>,
    pending: Arc<PendingPurchases>,
    subscriptions: Arc<SubscriptionProjection>,
    non_consumables: Arc<NonConsumableProjection>,
    #[allow(dead_code)]
    consumables: Arc<ConsumableProjection>,
    tokens: Arc<TokenLedger>,
    engine: Arc<ReconciliationEngine>,
}

impl Store {
    pub fn new(config: StoreConfig, bridge: Arc<dyn StoreBridge>) -> Self {
        let validator = Arc::new(HttpValidator::new(&config));
        Self::with_validator(config, bridge, validator)
    }

    /// Build a store with an explicit validator; tests substitute their own.
    pub fn with_validator(
        config: StoreConfig,
        bridge: Arc<dyn StoreBridge>,
        validator: Arc<dyn ReceiptValidator>,
    ) -> Self {
        let events = Arc::new(EventBus::new());
        let catalog = Arc::new(ProductCatalog::new(config.platform, events.clone()));
        let ledger = Arc::new(PurchaseLedger::new(events.clone()));
        let pending = Arc::new(PendingPurchases::new(events.clone()));
        let subscriptions =
            SubscriptionProjection::new(catalog.clone(), ledger.clone(), events.clone());
        let non_consumables =
            NonConsumableProjection::new(catalog.clone(), ledger.clone(), events.clone());
        let consumables = ConsumableProjection::new(catalog.clone(), events.clone());
        let tokens = TokenLedger::new(catalog.clone(), events.clone());
        let engine = ReconciliationEngine::new(
            config.platform,
            config.ios_bundle_id.clone(),
            bridge.clone(),
            validator,
            catalog.clone(),
            ledger.clone(),
            pending.clone(),
            events.clone(),
        );
        Self {
            bridge,
            events,
            catalog,
            ledger,
            pending,
            subscriptions,
            non_consumables,
            consumables,
            tokens,
            engine,
        }
    }

    /// Open the store connection. Call once at startup, after wiring the
    /// native event streams.
    pub async fn initialize(&self) -> Result<()> {
        self.engine.initialize().await
    }

    /// Detach from the native streams and drop queued events.
    pub fn shutdown(&self) {
        self.engine.shutdown();
        self.events.remove_all(None);
    }

    /// Attach the purchases made through the store to this user.
    pub fn set_application_username(&self, username: Option<String>) {
        self.engine.set_application_username(username);
    }

    /// Declare products without fetching their store metadata yet.
    pub fn set_product_definitions(&self, definitions: Vec<ProductDefinition>) {
        self.catalog.add(definitions, Vec::new(), Vec::new());
    }

    /// Fetch store metadata and return the materialized products.
    pub async fn load_products(
        &self,
        definitions: Option<Vec<ProductDefinition>>,
    ) -> Result<Vec<Product>> {
        self.catalog
            .load(self.bridge.as_ref(), definitions)
            .await
            .map_err(|e| {
                StoreError::new(
                    Severity::Error,
                    ErrorCode::Load,
                    format!("Failed to load products: {e}"),
                )
            })
    }

    /// Refresh the ledger from every purchase the store still reports.
    pub async fn load_purchases(&self) -> Result<Vec<VerifiedPurchase>> {
        self.engine.load_purchases().await
    }

    pub fn get_product(&self, product_id: &str) -> Option<Product> {
        self.catalog.get(product_id)
    }

    pub fn products(&self) -> Vec<Product> {
        self.catalog.all()
    }

    pub fn purchases(&self) -> Vec<VerifiedPurchase> {
        self.ledger.sorted()
    }

    pub fn pending_purchases(&self) -> Vec<PendingPurchase> {
        self.pending.list()
    }

    pub fn pending_status(&self, product_id: &str) -> Option<PendingPurchaseState> {
        self.pending.status(product_id)
    }

    /// Whether ordering this offer makes sense right now: the product is not
    /// already owned and no purchase for it is in flight.
    pub fn can_purchase(&self, offer: &Offer) -> bool {
        !self.is_owned(&offer.product_id) && self.pending.status(&offer.product_id).is_none()
    }

    /// Initiate a purchase for one offer.
    pub async fn order(&self, offer: &Offer) -> Result<()> {
        info!("ordering {} ({})", offer.product_id, offer.id);
        self.engine.order(offer).await
    }

    /// Restore previously made purchases, reporting `(processed, total)`
    /// progress after each.
    pub async fn restore_purchases<F>(&self, progress: F) -> Result<u32>
    where
        F: FnMut(i32, i32),
    {
        self.engine.restore_purchases(progress).await
    }

    /// Consume a validated consumable purchase.
    pub async fn consume(&self, purchase: &VerifiedPurchase) -> Result<()> {
        self.engine.consume(purchase).await
    }

    /// Ownership of the product, derived from the ledger.
    ///
    /// Only non-consumables and paid subscriptions can be owned.
    /// Consumables should be consumed or refunded; applications and
    /// non-renewing subscriptions carry no ownership state.
    pub fn is_owned(&self, product_id: &str) -> bool {
        use crate::models::product::ProductType;
        match self.catalog.get_type(product_id) {
            ProductType::NonConsumable | ProductType::PaidSubscription => self
                .ledger
                .get_purchase(product_id, None)
                .map(|p| p.owned())
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Whether any currently owned product grants the given entitlement.
    pub fn check_entitlement(&self, entitlement: &str) -> bool {
        self.owned_definitions()
            .iter()
            .any(|d| d.entitlements.iter().any(|e| e == entitlement))
    }

    /// Union of the entitlements granted by currently owned products, each
    /// listed once.
    pub fn list_entitlements(&self) -> Vec<String> {
        let mut entitlements = Vec::new();
        for definition in self.owned_definitions() {
            for entitlement in definition.entitlements {
                if !entitlements.contains(&entitlement) {
                    entitlements.push(entitlement);
                }
            }
        }
        entitlements
    }

    /// The currently active subscription, by recency.
    pub fn get_active_subscription(&self) -> Option<VerifiedPurchase> {
        self.subscriptions.active()
    }

    pub fn subscriptions(&self) -> Vec<VerifiedPurchase> {
        self.subscriptions.all()
    }

    pub fn non_consumables(&self) -> Vec<VerifiedPurchase> {
        self.non_consumables.all()
    }

    /// Token balance accumulated from consumable purchases this session.
    pub fn token_balance(&self, token_type: &str) -> i64 {
        self.tokens.balance(token_type)
    }

    /// Android recovery: drop failed purchases the store cached as pending.
    pub async fn flush_transactions(&self) -> Result<()> {
        self.bridge.flush_failed_purchases().await.map_err(|e| {
            StoreError::new(
                Severity::Error,
                ErrorCode::Finish,
                format!("Failed to flush failed purchases: {e}"),
            )
        })
    }

    /// Forward one delivery from the native purchase-updated stream.
    pub fn on_purchase_updated(&self, purchase: RawPurchase) {
        self.engine.on_purchase_updated(purchase);
    }

    /// Forward one delivery from the native purchase-error stream.
    pub fn on_purchase_error(&self, error: RawPurchaseError) {
        self.engine.on_purchase_error(error);
    }

    pub fn add_event_listener<F>(&self, kind: EventKind, callback: F) -> ListenerId
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        self.events.add_listener(kind, "application", callback)
    }

    pub fn remove_event_listener(&self, id: ListenerId) {
        self.events.remove_listener(id);
    }

    pub fn remove_all_event_listeners(&self, kind: Option<EventKind>) {
        self.events.remove_all(kind);
    }

    fn owned_definitions(&self) -> Vec<ProductDefinition> {
        let mut definitions: Vec<ProductDefinition> = Vec::new();
        for purchase in self.ledger.list() {
            if !self.is_owned(&purchase.product_id) {
                continue;
            }
            if definitions.iter().any(|d| d.id == purchase.product_id) {
                continue;
            }
            if let Some(definition) = self.catalog.get_definition(&purchase.product_id) {
                definitions.push(definition);
            }
        }
        definitions
    }
}
