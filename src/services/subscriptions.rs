use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::events::{EventBus, EventKind, StoreEvent, SubscriptionChange};
use crate::models::product::ProductType;
use crate::models::purchase::VerifiedPurchase;
use crate::services::catalog::ProductCatalog;
use crate::services::ledger::PurchaseLedger;

/// Subscription-specific view over the ledger.
///
/// Observes `purchase.updated`, keeps the previous state of each
/// subscription and classifies every change as renewed, cancelled, expired
/// or plain changed.
pub struct SubscriptionProjection {
    catalog: Arc<ProductCatalog>,
    ledger: Arc<PurchaseLedger>,
    events: Arc<EventBus>,
    last_known: Mutex<HashMap<String, VerifiedPurchase>>,
}

impl SubscriptionProjection {
    pub fn new(
        catalog: Arc<ProductCatalog>,
        ledger: Arc<PurchaseLedger>,
        events: Arc<EventBus>,
    ) -> Arc<Self> {
        let projection = Arc::new(Self {
            catalog,
            ledger,
            events: events.clone(),
            last_known: Mutex::new(HashMap::new()),
        });
        let weak = Arc::downgrade(&projection);
        events.add_listener(EventKind::PurchaseUpdated, "subscriptions", move |event| {
            if let (Some(projection), StoreEvent::PurchaseUpdated(purchase)) =
                (weak.upgrade(), event)
            {
                projection.on_purchase_updated(purchase);
            }
        });
        projection
    }

    /// The currently active subscription, by recency.
    ///
    /// Apps selling multiple concurrently active subscriptions only get one
    /// here; use [`SubscriptionProjection::all`] for the full list.
    pub fn active(&self) -> Option<VerifiedPurchase> {
        self.all().into_iter().find(|p| p.owned())
    }

    /// Every subscription currently granting ownership, most recent first.
    pub fn actives_only(&self) -> Vec<VerifiedPurchase> {
        self.all().into_iter().filter(|p| p.owned()).collect()
    }

    pub fn has_active(&self) -> bool {
        self.active().is_some()
    }

    /// Every known subscription purchase, most recent first.
    pub fn all(&self) -> Vec<VerifiedPurchase> {
        self.ledger
            .sorted()
            .into_iter()
            .filter(|p| self.catalog.get_type(&p.product_id) == ProductType::PaidSubscription)
            .collect()
    }

    fn on_purchase_updated(&self, purchase: &VerifiedPurchase) {
        if self.catalog.get_type(&purchase.product_id) != ProductType::PaidSubscription {
            return;
        }
        let previous = self
            .last_known
            .lock()
            .expect("subscription state lock poisoned")
            .insert(purchase.product_id.clone(), purchase.clone());
        let reason = classify(previous.as_ref(), purchase);
        info!(
            "subscription {} updated: {reason:?}",
            purchase.product_id
        );

        self.events.emit(StoreEvent::SubscriptionUpdated {
            reason,
            purchase: purchase.clone(),
        });
        let specific = match reason {
            SubscriptionChange::Renewed => StoreEvent::SubscriptionRenewed(purchase.clone()),
            SubscriptionChange::Cancelled => StoreEvent::SubscriptionCancelled(purchase.clone()),
            SubscriptionChange::Expired => StoreEvent::SubscriptionExpired(purchase.clone()),
            SubscriptionChange::Changed => StoreEvent::SubscriptionChanged(purchase.clone()),
        };
        self.events.emit(specific);
    }
}

/// Classify a subscription change, first match wins.
///
/// A first-seen subscription cannot be a renewal; without a previous
/// transaction to compare against it classifies as cancelled, expired or
/// changed depending on its own flags.
fn classify(previous: Option<&VerifiedPurchase>, current: &VerifiedPurchase) -> SubscriptionChange {
    let previously_canceled = previous.map(|p| p.is_canceled()).unwrap_or(false);
    let previously_expired = previous.map(|p| p.is_expired).unwrap_or(false);

    if let Some(previous) = previous {
        if previous.transaction_id != current.transaction_id && !current.is_expired {
            return SubscriptionChange::Renewed;
        }
    }
    if !previously_canceled && current.is_canceled() {
        return SubscriptionChange::Cancelled;
    }
    if !previously_expired && current.is_expired {
        return SubscriptionChange::Expired;
    }
    debug!("subscription change fell through to generic update");
    SubscriptionChange::Changed
}
