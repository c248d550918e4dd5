use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::debug;

use crate::error::StoreError;
use crate::models::product::Product;
use crate::models::purchase::{PendingPurchase, VerifiedPurchase};

/// Why a subscription's state changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionChange {
    Renewed,
    Cancelled,
    Expired,
    Changed,
}

/// Every event the library emits, with its payload.
///
/// Adding an event means adding a variant here and a matching [`EventKind`],
/// so the event-name to payload contract is checked at compile time.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// Product metadata changed (title, price, offers, ...).
    ProductsUpdated(Vec<Product>),
    /// A verified purchase was added or changed in the ledger.
    PurchaseUpdated(VerifiedPurchase),
    /// A subscription changed, with the classified reason.
    SubscriptionUpdated {
        reason: SubscriptionChange,
        purchase: VerifiedPurchase,
    },
    SubscriptionRenewed(VerifiedPurchase),
    SubscriptionCancelled(VerifiedPurchase),
    SubscriptionExpired(VerifiedPurchase),
    SubscriptionChanged(VerifiedPurchase),
    /// An in-flight purchase moved to a new status.
    PendingPurchaseUpdated(PendingPurchase),
    NonConsumableUpdated(VerifiedPurchase),
    NonConsumableOwned(VerifiedPurchase),
    NonConsumableUnowned(VerifiedPurchase),
    ConsumablePurchased(VerifiedPurchase),
    ConsumableRefunded(VerifiedPurchase),
    /// An error occurred while processing in the background.
    Error(StoreError),
}

/// Discriminant used to subscribe to one event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    ProductsUpdated,
    PurchaseUpdated,
    SubscriptionUpdated,
    SubscriptionRenewed,
    SubscriptionCancelled,
    SubscriptionExpired,
    SubscriptionChanged,
    PendingPurchaseUpdated,
    NonConsumableUpdated,
    NonConsumableOwned,
    NonConsumableUnowned,
    ConsumablePurchased,
    ConsumableRefunded,
    Error,
}

impl StoreEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ProductsUpdated(_) => EventKind::ProductsUpdated,
            Self::PurchaseUpdated(_) => EventKind::PurchaseUpdated,
            Self::SubscriptionUpdated { .. } => EventKind::SubscriptionUpdated,
            Self::SubscriptionRenewed(_) => EventKind::SubscriptionRenewed,
            Self::SubscriptionCancelled(_) => EventKind::SubscriptionCancelled,
            Self::SubscriptionExpired(_) => EventKind::SubscriptionExpired,
            Self::SubscriptionChanged(_) => EventKind::SubscriptionChanged,
            Self::PendingPurchaseUpdated(_) => EventKind::PendingPurchaseUpdated,
            Self::NonConsumableUpdated(_) => EventKind::NonConsumableUpdated,
            Self::NonConsumableOwned(_) => EventKind::NonConsumableOwned,
            Self::NonConsumableUnowned(_) => EventKind::NonConsumableUnowned,
            Self::ConsumablePurchased(_) => EventKind::ConsumablePurchased,
            Self::ConsumableRefunded(_) => EventKind::ConsumableRefunded,
            Self::Error(_) => EventKind::Error,
        }
    }
}

type Callback = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

/// Handle identifying a registered listener, for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(usize);

struct Listener {
    id: ListenerId,
    kind: EventKind,
    callback: Callback,
}

/// Typed publish/subscribe registry every component communicates through.
///
/// Listeners are invoked synchronously, in registration order, without any
/// bus lock held, so a listener may itself emit events or (un)register
/// listeners.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<Listener>>,
    next_id: AtomicUsize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener<F>(&self, kind: EventKind, context: &str, callback: F) -> ListenerId
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!("adding event listener {}:{:?}", context, kind);
        self.listeners
            .write()
            .expect("event bus lock poisoned")
            .push(Listener {
                id,
                kind,
                callback: Arc::new(callback),
            });
        id
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.listeners
            .write()
            .expect("event bus lock poisoned")
            .retain(|l| l.id != id);
    }

    /// Remove all listeners for one event type, or every listener when
    /// `kind` is `None`.
    pub fn remove_all(&self, kind: Option<EventKind>) {
        let mut listeners = self.listeners.write().expect("event bus lock poisoned");
        match kind {
            Some(kind) => listeners.retain(|l| l.kind != kind),
            None => listeners.clear(),
        }
    }

    pub fn emit(&self, event: StoreEvent) {
        let kind = event.kind();
        // Snapshot the matching callbacks so none of them runs under the lock.
        let callbacks: Vec<Callback> = self
            .listeners
            .read()
            .expect("event bus lock poisoned")
            .iter()
            .filter(|l| l.kind == kind)
            .map(|l| l.callback.clone())
            .collect();
        debug!("emitting {:?} to {} listeners", kind, callbacks.len());
        for callback in callbacks {
            callback(&event);
        }
    }
}
