use std::sync::Arc;

use purchasekit::bridge::{
    PlayOfferDetails, PlayPricingPhase, PlaySubscription, ProductMetadata, SubscriptionMetadata,
};
use purchasekit::services::catalog::ProductCatalog;
use purchasekit::{
    EventBus, PaymentMode, Platform, ProductDefinition, ProductType, RecurrenceMode,
};

fn paid_phase(price_micros: i64, recurrence_mode: i32) -> PlayPricingPhase {
    PlayPricingPhase {
        formatted_price: format!("${}.99", price_micros / 1_000_000),
        price_amount_micros: price_micros,
        price_currency_code: "USD".to_string(),
        billing_period: "P1M".to_string(),
        billing_cycle_count: if recurrence_mode == 2 { 3 } else { 0 },
        recurrence_mode,
    }
}

fn play_subscription() -> SubscriptionMetadata {
    SubscriptionMetadata::Play(PlaySubscription {
        product_id: "premium_monthly".to_string(),
        title: "Premium (My App)".to_string(),
        description: Some("All the features".to_string()),
        offer_details: vec![
            // Base plan.
            PlayOfferDetails {
                base_plan_id: Some("monthly".to_string()),
                offer_id: None,
                offer_token: "token-base".to_string(),
                pricing_phases: vec![paid_phase(9_990_000, 1)],
            },
            // Intro offer, final phase finite-recurring.
            PlayOfferDetails {
                base_plan_id: Some("monthly".to_string()),
                offer_id: Some("intro".to_string()),
                offer_token: "token-intro".to_string(),
                pricing_phases: vec![paid_phase(4_990_000, 2)],
            },
        ],
    })
}

fn play_catalog() -> ProductCatalog {
    let catalog = ProductCatalog::new(Platform::GooglePlay, Arc::new(EventBus::new()));
    catalog.add(
        vec![ProductDefinition::new(
            "premium_monthly",
            ProductType::PaidSubscription,
        )],
        vec![play_subscription()],
        Vec::new(),
    );
    catalog
}

#[test]
fn play_titles_lose_the_app_name_suffix() {
    let catalog = play_catalog();
    let product = catalog.get("premium_monthly").unwrap();
    assert_eq!(product.title.as_deref(), Some("Premium"));
}

#[test]
fn play_offer_ids_encode_base_plan_and_offer() {
    let catalog = play_catalog();
    let product = catalog.get("premium_monthly").unwrap();

    let ids: Vec<&str> = product.offers.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(
        ids,
        vec!["premium_monthly@monthly", "premium_monthly@monthly@intro"]
    );
}

#[test]
fn intro_offers_append_the_base_plan_price_ladder() {
    let catalog = play_catalog();
    let product = catalog.get("premium_monthly").unwrap();

    let intro = product
        .offers
        .iter()
        .find(|o| o.id.ends_with("@intro"))
        .unwrap();
    // Intro phase followed by the base plan's recurring phase.
    assert_eq!(intro.pricing_phases.len(), 2);
    assert_eq!(
        intro.pricing_phases[0].recurrence_mode,
        Some(RecurrenceMode::FiniteRecurring)
    );
    assert_eq!(
        intro.pricing_phases[1].recurrence_mode,
        Some(RecurrenceMode::InfiniteRecurring)
    );

    let base = product
        .offers
        .iter()
        .find(|o| o.id == "premium_monthly@monthly")
        .unwrap();
    assert_eq!(base.pricing_phases.len(), 1);
}

#[test]
fn one_time_products_get_a_single_up_front_offer() {
    let catalog = ProductCatalog::new(Platform::GooglePlay, Arc::new(EventBus::new()));
    catalog.add(
        vec![ProductDefinition::new("coins_100", ProductType::Consumable)],
        Vec::new(),
        vec![ProductMetadata {
            platform: Platform::GooglePlay,
            product_id: "coins_100".to_string(),
            title: "100 Coins".to_string(),
            description: None,
            display_price: "$0.99".to_string(),
            price_micros: 990_000,
            currency: Some("USD".to_string()),
        }],
    );

    let product = catalog.get("coins_100").unwrap();
    assert_eq!(product.offers.len(), 1);
    let phase = &product.offers[0].pricing_phases[0];
    assert_eq!(phase.payment_mode, Some(PaymentMode::UpFront));
    assert_eq!(phase.recurrence_mode, Some(RecurrenceMode::NonRecurring));
}

#[test]
fn definitions_without_metadata_do_not_materialize() {
    let catalog = ProductCatalog::new(Platform::GooglePlay, Arc::new(EventBus::new()));
    catalog.add(
        vec![ProductDefinition::new(
            "ghost",
            ProductType::NonConsumable,
        )],
        Vec::new(),
        Vec::new(),
    );

    assert!(catalog.get("ghost").is_none());
    assert!(catalog.get_definition("ghost").is_some());
    assert!(catalog.all().is_empty());
}

#[test]
fn unknown_product_ids_default_to_paid_subscription() {
    let catalog = ProductCatalog::new(Platform::GooglePlay, Arc::new(EventBus::new()));
    assert_eq!(
        catalog.get_type("never-declared"),
        ProductType::PaidSubscription
    );
}

#[test]
fn repeated_definitions_keep_the_first_write() {
    let catalog = ProductCatalog::new(Platform::GooglePlay, Arc::new(EventBus::new()));
    catalog.add(
        vec![ProductDefinition::new("coins_100", ProductType::Consumable)],
        Vec::new(),
        Vec::new(),
    );
    catalog.add(
        vec![ProductDefinition::new(
            "coins_100",
            ProductType::NonConsumable,
        )],
        Vec::new(),
        Vec::new(),
    );

    assert_eq!(catalog.get_type("coins_100"), ProductType::Consumable);
}
