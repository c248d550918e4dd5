use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::events::{EventBus, EventKind, StoreEvent};
use crate::services::catalog::ProductCatalog;

/// One credit of an abstract in-game currency, tied to a transaction so a
/// redelivered purchase event never counts twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTransaction {
    pub transaction_id: String,
    pub token_type: String,
    pub amount: i64,
}

/// Additive counter store for consumables redeemable into tokens.
///
/// Observes `consumable.purchased` and `consumable.refunded`; session-scoped,
/// no persistence.
pub struct TokenLedger {
    catalog: Arc<ProductCatalog>,
    transactions: Mutex<HashMap<String, TokenTransaction>>,
}

impl TokenLedger {
    pub fn new(catalog: Arc<ProductCatalog>, events: Arc<EventBus>) -> Arc<Self> {
        let ledger = Arc::new(Self {
            catalog,
            transactions: Mutex::new(HashMap::new()),
        });
        let weak = Arc::downgrade(&ledger);
        events.add_listener(EventKind::ConsumablePurchased, "tokens", move |event| {
            if let (Some(ledger), StoreEvent::ConsumablePurchased(purchase)) =
                (weak.upgrade(), event)
            {
                ledger.on_purchased(
                    &purchase.product_id,
                    purchase.transaction_id.as_deref(),
                );
            }
        });
        let weak = Arc::downgrade(&ledger);
        events.add_listener(EventKind::ConsumableRefunded, "tokens", move |event| {
            if let (Some(ledger), StoreEvent::ConsumableRefunded(purchase)) =
                (weak.upgrade(), event)
            {
                ledger.on_refunded(purchase.transaction_id.as_deref());
            }
        });
        ledger
    }

    /// Current balance for one token type.
    pub fn balance(&self, token_type: &str) -> i64 {
        self.transactions
            .lock()
            .expect("token ledger lock poisoned")
            .values()
            .filter(|t| t.token_type == token_type)
            .map(|t| t.amount)
            .sum()
    }

    /// Every token type with a non-zero balance.
    pub fn all_balances(&self) -> HashMap<String, i64> {
        let mut balances: HashMap<String, i64> = HashMap::new();
        for transaction in self
            .transactions
            .lock()
            .expect("token ledger lock poisoned")
            .values()
        {
            *balances.entry(transaction.token_type.clone()).or_default() +=
                transaction.amount;
        }
        balances
    }

    pub fn transactions(&self) -> Vec<TokenTransaction> {
        self.transactions
            .lock()
            .expect("token ledger lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    fn on_purchased(&self, product_id: &str, transaction_id: Option<&str>) {
        let Some(transaction_id) = transaction_id else {
            return;
        };
        let Some(definition) = self.catalog.get_definition(product_id) else {
            return;
        };
        let (Some(token_type), Some(amount)) = (definition.token_type, definition.token_value)
        else {
            debug!("consumable {product_id} declares no token reward");
            return;
        };
        let mut transactions = self
            .transactions
            .lock()
            .expect("token ledger lock poisoned");
        if transactions.contains_key(transaction_id) {
            return;
        }
        info!("crediting {amount} {token_type} for transaction {transaction_id}");
        transactions.insert(
            transaction_id.to_string(),
            TokenTransaction {
                transaction_id: transaction_id.to_string(),
                token_type,
                amount,
            },
        );
    }

    fn on_refunded(&self, transaction_id: Option<&str>) {
        let Some(transaction_id) = transaction_id else {
            return;
        };
        let removed = self
            .transactions
            .lock()
            .expect("token ledger lock poisoned")
            .remove(transaction_id);
        if let Some(removed) = removed {
            info!(
                "revoking {} {} for refunded transaction {transaction_id}",
                removed.amount, removed.token_type
            );
        }
    }
}
