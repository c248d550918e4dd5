use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::events::{EventBus, StoreEvent};
use crate::models::purchase::VerifiedPurchase;

fn make_key(product_id: &str, transaction_id: Option<&str>) -> String {
    match transaction_id {
        Some(transaction_id) => format!("{product_id}:{transaction_id}"),
        None => product_id.to_string(),
    }
}

/// The source of truth for verified purchases.
///
/// Keyed by `(product_id, transaction_id)` when a transaction id is present,
/// by product id alone otherwise. Records are created or overwritten only by
/// successful validation and never deleted; an expired or cancelled purchase
/// remains as a terminal record.
pub struct PurchaseLedger {
    purchases: Mutex<HashMap<String, VerifiedPurchase>>,
    events: Arc<EventBus>,
}

impl PurchaseLedger {
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            purchases: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Idempotent upsert: storing a record deeply equal to the existing one
    /// for the same key emits no event.
    pub fn add_purchase(&self, purchase: VerifiedPurchase) {
        let key = make_key(&purchase.product_id, purchase.transaction_id.as_deref());
        {
            let mut purchases = self.purchases.lock().expect("ledger lock poisoned");
            if purchases.get(&key) == Some(&purchase) {
                debug!("purchase {key} unchanged, skipping");
                return;
            }
            purchases.insert(key, purchase.clone());
        }
        self.events.emit(StoreEvent::PurchaseUpdated(purchase));
    }

    /// Exact lookup when a transaction id is given; otherwise the most
    /// recent record for the product by ranking date (a product can have one
    /// record per historical renewal, and callers usually want the current
    /// one).
    pub fn get_purchase(
        &self,
        product_id: &str,
        transaction_id: Option<&str>,
    ) -> Option<VerifiedPurchase> {
        let purchases = self.purchases.lock().expect("ledger lock poisoned");
        if transaction_id.is_some() {
            return purchases.get(&make_key(product_id, transaction_id)).cloned();
        }
        purchases
            .values()
            .filter(|p| p.product_id == product_id)
            .max_by_key(|p| p.sorting_date())
            .cloned()
    }

    pub fn list(&self) -> Vec<VerifiedPurchase> {
        self.purchases
            .lock()
            .expect("ledger lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Full ledger, most recent purchases first.
    pub fn sorted(&self) -> Vec<VerifiedPurchase> {
        let mut purchases = self.list();
        purchases.sort_by_key(|p| std::cmp::Reverse(p.sorting_date()));
        purchases
    }
}
