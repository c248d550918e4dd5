use std::time::Duration;

use purchasekit::models::purchase::CancelationReason;
use purchasekit::{ProductDefinition, ProductType, VerifiedPurchase};

use crate::common::{raw_purchase, test_store, MockBridge, MockValidator};

fn millis_from_now(offset_secs: i64) -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp() + offset_secs) * 1000
}

fn owned_purchase(product_id: &str) -> VerifiedPurchase {
    let mut purchase = VerifiedPurchase::new(product_id);
    purchase.transaction_id = Some(format!("{product_id}-t1"));
    purchase.expiry_date = Some(millis_from_now(3600));
    purchase
}

#[test]
fn ownership_requires_all_three_conditions() {
    let purchase = owned_purchase("pro");
    assert!(purchase.owned());

    let mut expired_flag = purchase.clone();
    expired_flag.is_expired = true;
    assert!(!expired_flag.owned());

    let mut cancelled = purchase.clone();
    cancelled.cancelation_reason = Some(CancelationReason::Customer);
    assert!(!cancelled.owned());

    let mut past_expiry = purchase.clone();
    past_expiry.expiry_date = Some(millis_from_now(-3600));
    assert!(!past_expiry.owned());
}

#[test]
fn the_not_canceled_sentinel_does_not_revoke_ownership() {
    let mut purchase = owned_purchase("pro");
    purchase.cancelation_reason = Some(CancelationReason::NotCanceled);
    assert!(purchase.owned());
}

#[tokio::test(start_paused = true)]
async fn entitlements_union_over_owned_products() {
    let bridge = MockBridge::new();
    let validator = MockValidator::new();
    let store = test_store(bridge, validator.clone());

    store.set_product_definitions(vec![
        ProductDefinition::new("pro_a", ProductType::NonConsumable)
            .with_entitlements(&["premium", "cloud"]),
        ProductDefinition::new("pro_b", ProductType::NonConsumable)
            .with_entitlements(&["premium"]),
    ]);

    validator.push_response(vec![owned_purchase("pro_a")]);
    store.on_purchase_updated(raw_purchase("pro_a", "pro_a-t1"));
    tokio::time::sleep(Duration::from_millis(400)).await;

    validator.push_response(vec![owned_purchase("pro_b")]);
    store.on_purchase_updated(raw_purchase("pro_b", "pro_b-t1"));
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(store.is_owned("pro_a"));
    assert!(store.is_owned("pro_b"));
    assert!(store.check_entitlement("premium"));
    assert!(store.check_entitlement("cloud"));
    assert!(!store.check_entitlement("nonexistent"));

    // Shared entitlement strings are listed once.
    let mut entitlements = store.list_entitlements();
    entitlements.sort();
    assert_eq!(entitlements, vec!["cloud", "premium"]);
}

#[tokio::test(start_paused = true)]
async fn consumables_are_never_owned() {
    let bridge = MockBridge::new();
    let validator = MockValidator::new();
    let store = test_store(bridge, validator.clone());

    store.set_product_definitions(vec![ProductDefinition::new(
        "coins_100",
        ProductType::Consumable,
    )]);

    validator.push_response(vec![owned_purchase("coins_100")]);
    store.on_purchase_updated(raw_purchase("coins_100", "coins_100-t1"));
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(store.purchases().len(), 1);
    assert!(!store.is_owned("coins_100"));
}

#[tokio::test(start_paused = true)]
async fn only_non_consumables_and_paid_subscriptions_carry_ownership() {
    let bridge = MockBridge::new();
    let validator = MockValidator::new();
    let store = test_store(bridge, validator.clone());

    store.set_product_definitions(vec![
        ProductDefinition::new("the_app", ProductType::Application),
        ProductDefinition::new("season_pass", ProductType::NonRenewingSubscription),
    ]);

    validator.push_response(vec![owned_purchase("the_app")]);
    store.on_purchase_updated(raw_purchase("the_app", "the_app-t1"));
    tokio::time::sleep(Duration::from_millis(400)).await;

    validator.push_response(vec![owned_purchase("season_pass")]);
    store.on_purchase_updated(raw_purchase("season_pass", "season_pass-t1"));
    tokio::time::sleep(Duration::from_millis(400)).await;

    // Both records land in the ledger, but neither type is ownable.
    assert_eq!(store.purchases().len(), 2);
    assert!(!store.is_owned("the_app"));
    assert!(!store.is_owned("season_pass"));
}
