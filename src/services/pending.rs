use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tracing::debug;

use crate::events::{EventBus, StoreEvent};
use crate::models::product::Offer;
use crate::models::purchase::{PendingPurchase, PendingPurchaseState};

/// Tracks purchases currently in flight, one live record per product.
///
/// Records exist only while a purchase is in a non-terminal state; reaching
/// `completed` or `cancelled` removes the record and emits a terminal
/// `pendingPurchase.updated` event. Every transition wakes waiters parked on
/// [`PendingPurchases::wait_while_validating`].
pub struct PendingPurchases {
    entries: Mutex<Vec<PendingPurchase>>,
    changed: Notify,
    events: Arc<EventBus>,
}

impl PendingPurchases {
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            changed: Notify::new(),
            events,
        }
    }

    pub fn list(&self) -> Vec<PendingPurchase> {
        self.entries.lock().expect("pending lock poisoned").clone()
    }

    pub fn status(&self, product_id: &str) -> Option<PendingPurchaseState> {
        self.entries
            .lock()
            .expect("pending lock poisoned")
            .iter()
            .find(|p| p.product_id == product_id)
            .map(|p| p.status)
    }

    pub fn offer_status(&self, product_id: &str, offer_id: &str) -> Option<PendingPurchaseState> {
        self.entries
            .lock()
            .expect("pending lock poisoned")
            .iter()
            .find(|p| p.product_id == product_id && p.offer_id.as_deref() == Some(offer_id))
            .map(|p| p.status)
    }

    /// Register a new in-flight purchase for an offer.
    ///
    /// If a record already exists for the product, its status is forced back
    /// to `purchasing` instead of creating a second record (re-attempt of a
    /// stuck purchase).
    pub fn add(&self, offer: &Offer) {
        {
            let mut entries = self.entries.lock().expect("pending lock poisoned");
            if entries.iter().any(|p| p.product_id == offer.product_id) {
                drop(entries);
                self.update(
                    &offer.product_id,
                    PendingPurchaseState::Purchasing,
                    Some(&offer.id),
                );
                return;
            }
            entries.push(PendingPurchase {
                product_id: offer.product_id.clone(),
                status: PendingPurchaseState::Purchasing,
                offer_id: Some(offer.id.clone()),
            });
        }
        self.notify(PendingPurchase {
            product_id: offer.product_id.clone(),
            status: PendingPurchaseState::Purchasing,
            offer_id: Some(offer.id.clone()),
        });
    }

    /// Move a tracked purchase to a new status.
    ///
    /// No-op when the product is untracked or the status is unchanged.
    /// Terminal statuses remove the record and emit a terminal event.
    pub fn update(
        &self,
        product_id: &str,
        status: PendingPurchaseState,
        offer_id: Option<&str>,
    ) {
        let updated = {
            let mut entries = self.entries.lock().expect("pending lock poisoned");
            let Some(entry) = entries.iter_mut().find(|p| p.product_id == product_id) else {
                return;
            };
            if entry.status == status {
                return;
            }
            entry.status = status;
            if let Some(offer_id) = offer_id {
                entry.offer_id = Some(offer_id.to_string());
            }
            let updated = entry.clone();
            if status.is_terminal() {
                entries.retain(|p| p.product_id != product_id);
            }
            updated
        };
        debug!("pending purchase {product_id} -> {status}");
        self.notify(updated);
    }

    /// Drop a tracked purchase, emitting the given terminal reason.
    /// Removing an untracked product is a silent no-op.
    pub fn remove(&self, product_id: &str, reason: PendingPurchaseState) {
        let removed = {
            let mut entries = self.entries.lock().expect("pending lock poisoned");
            let Some(entry) = entries.iter().find(|p| p.product_id == product_id) else {
                return;
            };
            let offer_id = entry.offer_id.clone();
            entries.retain(|p| p.product_id != product_id);
            PendingPurchase {
                product_id: product_id.to_string(),
                status: reason,
                offer_id,
            }
        };
        self.notify(removed);
    }

    /// Park until the product is no longer in the `validating` state.
    ///
    /// Used to collapse concurrent validation attempts for the same product
    /// into a single winner.
    pub async fn wait_while_validating(&self, product_id: &str) {
        loop {
            let notified = self.changed.notified();
            if self.status(product_id) != Some(PendingPurchaseState::Validating) {
                return;
            }
            notified.await;
        }
    }

    fn notify(&self, purchase: PendingPurchase) {
        self.events.emit(StoreEvent::PendingPurchaseUpdated(purchase));
        self.changed.notify_waiters();
    }
}
