use std::sync::Arc;

use tracing::info;

use crate::events::{EventBus, EventKind, StoreEvent};
use crate::models::product::ProductType;
use crate::models::purchase::VerifiedPurchase;
use crate::services::catalog::ProductCatalog;

/// Consumable view over the ledger.
///
/// Consumables have no ownership notion; this projection only reacts to each
/// ledger event, announcing fresh unacknowledged purchases and refunds. Any
/// purchase it announces should then be consumed or refunded.
pub struct ConsumableProjection {
    catalog: Arc<ProductCatalog>,
    events: Arc<EventBus>,
}

impl ConsumableProjection {
    pub fn new(catalog: Arc<ProductCatalog>, events: Arc<EventBus>) -> Arc<Self> {
        let projection = Arc::new(Self {
            catalog,
            events: events.clone(),
        });
        let weak = Arc::downgrade(&projection);
        events.add_listener(EventKind::PurchaseUpdated, "consumables", move |event| {
            if let (Some(projection), StoreEvent::PurchaseUpdated(purchase)) =
                (weak.upgrade(), event)
            {
                projection.on_purchase_updated(purchase);
            }
        });
        projection
    }

    fn on_purchase_updated(&self, purchase: &VerifiedPurchase) {
        if self.catalog.get_type(&purchase.product_id) != ProductType::Consumable {
            return;
        }
        if purchase.is_canceled() {
            info!("consumable {} was refunded", purchase.product_id);
            self.events
                .emit(StoreEvent::ConsumableRefunded(purchase.clone()));
        } else if purchase.is_acknowledged != Some(true) {
            info!("consumable {} purchased", purchase.product_id);
            self.events
                .emit(StoreEvent::ConsumablePurchased(purchase.clone()));
        }
    }
}
