use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use purchasekit::services::ledger::PurchaseLedger;
use purchasekit::{EventBus, EventKind, VerifiedPurchase};

fn purchase(product_id: &str, transaction_id: &str, expiry: i64) -> VerifiedPurchase {
    let mut purchase = VerifiedPurchase::new(product_id);
    purchase.transaction_id = Some(transaction_id.to_string());
    purchase.expiry_date = Some(expiry);
    purchase
}

#[test]
fn identical_add_emits_exactly_one_event() {
    let events = Arc::new(EventBus::new());
    let ledger = PurchaseLedger::new(events.clone());

    let emissions = Arc::new(AtomicUsize::new(0));
    let counter = emissions.clone();
    events.add_listener(EventKind::PurchaseUpdated, "test", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    ledger.add_purchase(purchase("premium", "t1", 1_000));
    ledger.add_purchase(purchase("premium", "t1", 1_000));

    assert_eq!(emissions.load(Ordering::SeqCst), 1);
    assert_eq!(ledger.list().len(), 1);
}

#[test]
fn changed_record_emits_again() {
    let events = Arc::new(EventBus::new());
    let ledger = PurchaseLedger::new(events.clone());

    let emissions = Arc::new(AtomicUsize::new(0));
    let counter = emissions.clone();
    events.add_listener(EventKind::PurchaseUpdated, "test", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    ledger.add_purchase(purchase("premium", "t1", 1_000));
    ledger.add_purchase(purchase("premium", "t1", 2_000));

    assert_eq!(emissions.load(Ordering::SeqCst), 2);
}

#[test]
fn lookup_without_transaction_returns_most_recent() {
    let events = Arc::new(EventBus::new());
    let ledger = PurchaseLedger::new(events);

    ledger.add_purchase(purchase("premium", "t1", 1_000));
    ledger.add_purchase(purchase("premium", "t2", 2_000));

    let found = ledger.get_purchase("premium", None).unwrap();
    assert_eq!(found.transaction_id.as_deref(), Some("t2"));
}

#[test]
fn lookup_with_transaction_is_exact() {
    let events = Arc::new(EventBus::new());
    let ledger = PurchaseLedger::new(events);

    ledger.add_purchase(purchase("premium", "t1", 1_000));
    ledger.add_purchase(purchase("premium", "t2", 2_000));

    let found = ledger.get_purchase("premium", Some("t1")).unwrap();
    assert_eq!(found.expiry_date, Some(1_000));
    assert!(ledger.get_purchase("premium", Some("t9")).is_none());
}

#[test]
fn ranking_falls_back_through_renewal_and_purchase_dates() {
    let events = Arc::new(EventBus::new());
    let ledger = PurchaseLedger::new(events);

    let mut by_renewal = VerifiedPurchase::new("premium");
    by_renewal.transaction_id = Some("t1".to_string());
    by_renewal.last_renewal_date = Some(5_000);

    let mut by_purchase = VerifiedPurchase::new("premium");
    by_purchase.transaction_id = Some("t2".to_string());
    by_purchase.purchase_date = Some(1_000);

    ledger.add_purchase(by_renewal);
    ledger.add_purchase(by_purchase);

    let found = ledger.get_purchase("premium", None).unwrap();
    assert_eq!(found.transaction_id.as_deref(), Some("t1"));
}

#[test]
fn sorted_returns_most_recent_first() {
    let events = Arc::new(EventBus::new());
    let ledger = PurchaseLedger::new(events);

    ledger.add_purchase(purchase("a", "t1", 1_000));
    ledger.add_purchase(purchase("b", "t2", 3_000));
    ledger.add_purchase(purchase("c", "t3", 2_000));

    let ids: Vec<String> = ledger
        .sorted()
        .into_iter()
        .map(|p| p.product_id)
        .collect();
    assert_eq!(ids, vec!["b", "c", "a"]);
}
