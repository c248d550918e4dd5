//! Client-side purchase lifecycle manager for in-app purchases.
//!
//! Sits between a native store billing bridge and a receipt-validation
//! backend: native purchase and error events are deduplicated, receipts are
//! validated, and a ledger of verified purchases feeds ownership and
//! entitlement projections exposed through [`Store`].

pub mod bridge;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod services;
pub mod store;

pub use bridge::{RawPurchase, RawPurchaseError, StoreBridge};
pub use config::StoreConfig;
pub use error::{ErrorCode, Result, Severity, StoreError};
pub use events::{EventBus, EventKind, ListenerId, StoreEvent, SubscriptionChange};
pub use models::product::{
    Offer, OfferType, PaymentMode, Platform, PricingPhase, Product, ProductDefinition,
    ProductType, RecurrenceMode,
};
pub use models::purchase::{
    CancelationReason, PendingPurchase, PendingPurchaseState, RenewalIntent, VerifiedPurchase,
};
pub use store::Store;
