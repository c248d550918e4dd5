use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::events::{EventBus, EventKind, StoreEvent};
use crate::models::product::ProductType;
use crate::models::purchase::VerifiedPurchase;
use crate::services::catalog::ProductCatalog;
use crate::services::ledger::PurchaseLedger;

/// Non-consumable view over the ledger.
///
/// Emits `owned`/`unowned` on ownership flips, and `updated` on every change.
pub struct NonConsumableProjection {
    catalog: Arc<ProductCatalog>,
    ledger: Arc<PurchaseLedger>,
    events: Arc<EventBus>,
    owned: Mutex<HashMap<String, bool>>,
}

impl NonConsumableProjection {
    pub fn new(
        catalog: Arc<ProductCatalog>,
        ledger: Arc<PurchaseLedger>,
        events: Arc<EventBus>,
    ) -> Arc<Self> {
        let projection = Arc::new(Self {
            catalog,
            ledger,
            events: events.clone(),
            owned: Mutex::new(HashMap::new()),
        });
        let weak = Arc::downgrade(&projection);
        events.add_listener(
            EventKind::PurchaseUpdated,
            "non-consumables",
            move |event| {
                if let (Some(projection), StoreEvent::PurchaseUpdated(purchase)) =
                    (weak.upgrade(), event)
                {
                    projection.on_purchase_updated(purchase);
                }
            },
        );
        projection
    }

    pub fn is_owned(&self, product_id: &str) -> bool {
        self.ledger
            .get_purchase(product_id, None)
            .map(|p| p.owned())
            .unwrap_or(false)
    }

    pub fn all(&self) -> Vec<VerifiedPurchase> {
        self.ledger
            .sorted()
            .into_iter()
            .filter(|p| self.catalog.get_type(&p.product_id) == ProductType::NonConsumable)
            .collect()
    }

    fn on_purchase_updated(&self, purchase: &VerifiedPurchase) {
        if self.catalog.get_type(&purchase.product_id) != ProductType::NonConsumable {
            return;
        }
        let now_owned = purchase.owned();
        let was_owned = self
            .owned
            .lock()
            .expect("non-consumable state lock poisoned")
            .insert(purchase.product_id.clone(), now_owned)
            .unwrap_or(false);

        self.events
            .emit(StoreEvent::NonConsumableUpdated(purchase.clone()));
        if now_owned && !was_owned {
            info!("non-consumable {} is now owned", purchase.product_id);
            self.events
                .emit(StoreEvent::NonConsumableOwned(purchase.clone()));
        } else if !now_owned && was_owned {
            info!("non-consumable {} is no longer owned", purchase.product_id);
            self.events
                .emit(StoreEvent::NonConsumableUnowned(purchase.clone()));
        }
    }
}
