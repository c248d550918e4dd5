use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::bridge::{
    AppStorePaymentMode, AppStoreSubscription, BridgeError, PeriodUnit, PlayOfferDetails,
    PlayPricingPhase, PlaySubscription, ProductMetadata, StoreBridge, SubscriptionMetadata,
};
use crate::events::{EventBus, StoreEvent};
use crate::models::product::{
    Offer, OfferType, PaymentMode, Platform, PricingPhase, Product, ProductDefinition,
    ProductType, RecurrenceMode,
};

struct CatalogState {
    definitions: Vec<ProductDefinition>,
    subscriptions: Vec<SubscriptionMetadata>,
    products: Vec<ProductMetadata>,
}

/// The catalog of available in-app products.
///
/// Holds developer-declared definitions alongside raw store metadata; a
/// product materializes only when both a definition and matching metadata
/// exist. All platform-specific metadata parsing is confined to the offer
/// derivation below.
pub struct ProductCatalog {
    platform: Platform,
    state: Mutex<CatalogState>,
    events: Arc<EventBus>,
}

impl ProductCatalog {
    pub fn new(platform: Platform, events: Arc<EventBus>) -> Self {
        Self {
            platform,
            state: Mutex::new(CatalogState {
                definitions: Vec::new(),
                subscriptions: Vec::new(),
                products: Vec::new(),
            }),
            events,
        }
    }

    /// Merge definitions and store metadata into the catalog, first write
    /// wins per id, then emit `products.updated` with the materialized list.
    pub fn add(
        &self,
        definitions: Vec<ProductDefinition>,
        subscriptions: Vec<SubscriptionMetadata>,
        products: Vec<ProductMetadata>,
    ) -> Vec<Product> {
        let materialized = {
            let mut state = self.state.lock().expect("catalog lock poisoned");
            for definition in definitions {
                if !state.definitions.iter().any(|d| d.id == definition.id) {
                    state.definitions.push(definition);
                }
            }
            for subscription in subscriptions {
                if !state
                    .subscriptions
                    .iter()
                    .any(|s| s.product_id() == subscription.product_id())
                {
                    state.subscriptions.push(subscription);
                }
            }
            for product in products {
                if !state
                    .products
                    .iter()
                    .any(|p| p.product_id == product.product_id)
                {
                    state.products.push(product);
                }
            }
            self.materialize(&state)
        };
        self.events
            .emit(StoreEvent::ProductsUpdated(materialized.clone()));
        materialized
    }

    /// Load store metadata for the given definitions (or everything already
    /// declared), merge it in and return the materialized products.
    ///
    /// A definition whose store metadata never arrives simply does not
    /// materialize; that is not an error.
    pub async fn load(
        &self,
        bridge: &dyn StoreBridge,
        definitions: Option<Vec<ProductDefinition>>,
    ) -> Result<Vec<Product>, BridgeError> {
        let definitions = definitions.unwrap_or_else(|| {
            self.state
                .lock()
                .expect("catalog lock poisoned")
                .definitions
                .clone()
        });
        info!(
            "loading products: {}",
            definitions
                .iter()
                .map(|d| d.id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let subscription_ids: Vec<String> = definitions
            .iter()
            .filter(|d| d.product_type == ProductType::PaidSubscription)
            .map(|d| d.id.clone())
            .collect();
        let product_ids: Vec<String> = definitions
            .iter()
            .filter(|d| d.product_type != ProductType::PaidSubscription)
            .map(|d| d.id.clone())
            .collect();

        let subscriptions = if subscription_ids.is_empty() {
            Vec::new()
        } else {
            debug!("subscriptions to load: {subscription_ids:?}");
            bridge.fetch_subscriptions(&subscription_ids).await?
        };
        let products = if product_ids.is_empty() {
            Vec::new()
        } else {
            debug!("products to load: {product_ids:?}");
            bridge.fetch_products(&product_ids).await?
        };

        Ok(self.add(definitions, subscriptions, products))
    }

    pub fn get(&self, product_id: &str) -> Option<Product> {
        let state = self.state.lock().expect("catalog lock poisoned");
        let definition = state.definitions.iter().find(|d| d.id == product_id)?;
        self.to_product(&state, definition)
    }

    pub fn get_definition(&self, product_id: &str) -> Option<ProductDefinition> {
        self.state
            .lock()
            .expect("catalog lock poisoned")
            .definitions
            .iter()
            .find(|d| d.id == product_id)
            .cloned()
    }

    /// Declared type of a product.
    ///
    /// An entirely unknown id defaults to `paid subscription`. This is a
    /// deliberate fail-safe so "is this a subscription" checks do not blow
    /// up on a typo; callers that need to detect unknown ids should use
    /// [`ProductCatalog::get_definition`].
    pub fn get_type(&self, product_id: &str) -> ProductType {
        self.get_definition(product_id)
            .map(|d| d.product_type)
            .unwrap_or(ProductType::PaidSubscription)
    }

    /// All materialized products.
    pub fn all(&self) -> Vec<Product> {
        let state = self.state.lock().expect("catalog lock poisoned");
        self.materialize(&state)
    }

    fn materialize(&self, state: &CatalogState) -> Vec<Product> {
        state
            .definitions
            .iter()
            .filter_map(|d| self.to_product(state, d))
            .collect()
    }

    fn to_product(&self, state: &CatalogState, definition: &ProductDefinition) -> Option<Product> {
        let (title, description, offers) = match definition.product_type {
            ProductType::PaidSubscription => {
                let sub = state
                    .subscriptions
                    .iter()
                    .find(|s| s.product_id() == definition.id)?;
                let (title, description) = match sub {
                    SubscriptionMetadata::Play(s) => (s.title.clone(), s.description.clone()),
                    SubscriptionMetadata::AppStore(s) => (s.title.clone(), s.description.clone()),
                };
                (title, description, subscription_offers(sub))
            }
            _ => {
                let product = state
                    .products
                    .iter()
                    .find(|p| p.product_id == definition.id)?;
                (
                    product.title.clone(),
                    product.description.clone(),
                    product_offers(product),
                )
            }
        };
        Some(Product {
            product_type: definition.product_type,
            id: definition.id.clone(),
            offers,
            title: Some(self.cleanup_title(&title)),
            description,
            platform: self.platform,
            entitlements: definition.entitlements.clone(),
            token_type: definition.token_type.clone(),
            token_value: definition.token_value,
        })
    }

    /// On Google Play the title comes back as "product name (app name)";
    /// strip the app-name suffix.
    fn cleanup_title(&self, title: &str) -> String {
        if self.platform == Platform::GooglePlay && title.ends_with(')') {
            if let Some(idx) = title.rfind(" (") {
                return title[..idx].to_string();
            }
        }
        title.to_string()
    }
}

/// Single pay-up-front offer for a one-time product.
fn product_offers(product: &ProductMetadata) -> Vec<Offer> {
    vec![Offer {
        id: product.product_id.clone(),
        platform: product.platform,
        product_id: product.product_id.clone(),
        pricing_phases: vec![PricingPhase {
            price: product.display_price.clone(),
            price_micros: product.price_micros,
            currency: product.currency.clone(),
            billing_period: None,
            billing_cycles: None,
            recurrence_mode: Some(RecurrenceMode::NonRecurring),
            payment_mode: Some(PaymentMode::UpFront),
        }],
        offer_type: OfferType::Default,
        offer_token: None,
    }]
}

fn subscription_offers(subscription: &SubscriptionMetadata) -> Vec<Offer> {
    match subscription {
        SubscriptionMetadata::Play(play) => play_subscription_offers(play),
        SubscriptionMetadata::AppStore(app_store) => app_store_subscription_offers(app_store),
    }
}

fn play_subscription_offers(subscription: &PlaySubscription) -> Vec<Offer> {
    let find_base_plan = |base_plan_id: Option<&str>| -> Option<&PlayOfferDetails> {
        let base_plan_id = base_plan_id?;
        subscription
            .offer_details
            .iter()
            .find(|offer| offer.base_plan_id.as_deref() == Some(base_plan_id) && offer.offer_id.is_none())
    };

    subscription
        .offer_details
        .iter()
        .map(|details| {
            let mut phases = details.pricing_phases.clone();
            // A finite-recurring final phase means this is an intro offer;
            // append the base plan's phases so the full price ladder shows.
            if phases.last().map(|p| p.recurrence_mode) == Some(2) {
                if let Some(base_plan) = find_base_plan(details.base_plan_id.as_deref()) {
                    if base_plan.offer_token != details.offer_token {
                        phases.extend(base_plan.pricing_phases.iter().cloned());
                    }
                }
            }
            Offer {
                id: play_offer_id(&subscription.product_id, details),
                platform: Platform::GooglePlay,
                product_id: subscription.product_id.clone(),
                pricing_phases: phases.iter().map(play_pricing_phase).collect(),
                offer_type: OfferType::Subscription,
                offer_token: Some(details.offer_token.clone()),
            }
        })
        .collect()
}

/// Composite offer id disambiguating offer variants of one Play product.
fn play_offer_id(product_id: &str, details: &PlayOfferDetails) -> String {
    match (&details.base_plan_id, &details.offer_id) {
        (Some(base_plan), Some(offer)) => format!("{product_id}@{base_plan}@{offer}"),
        (Some(base_plan), None) => format!("{product_id}@{base_plan}"),
        (None, _) => format!("{product_id}@{}", details.offer_token),
    }
}

fn play_pricing_phase(phase: &PlayPricingPhase) -> PricingPhase {
    PricingPhase {
        price: phase.formatted_price.clone(),
        price_micros: phase.price_amount_micros,
        currency: Some(phase.price_currency_code.clone()),
        billing_period: Some(phase.billing_period.clone()),
        billing_cycles: Some(phase.billing_cycle_count),
        recurrence_mode: Some(play_recurrence_mode(phase.recurrence_mode)),
        payment_mode: Some(play_payment_mode(phase)),
    }
}

fn play_recurrence_mode(mode: i32) -> RecurrenceMode {
    match mode {
        1 => RecurrenceMode::InfiniteRecurring,
        2 => RecurrenceMode::FiniteRecurring,
        _ => RecurrenceMode::NonRecurring,
    }
}

fn play_payment_mode(phase: &PlayPricingPhase) -> PaymentMode {
    if phase.price_amount_micros == 0 {
        PaymentMode::FreeTrial
    } else if phase.recurrence_mode == 3 {
        PaymentMode::UpFront
    } else {
        PaymentMode::PayAsYouGo
    }
}

fn app_store_subscription_offers(subscription: &AppStoreSubscription) -> Vec<Offer> {
    let mut offers = Vec::new();

    let final_phase = PricingPhase {
        price: subscription.display_price.clone(),
        price_micros: subscription.price_micros,
        currency: subscription.currency.clone(),
        billing_period: iso_billing_period(subscription.period_count, subscription.period_unit),
        billing_cycles: None,
        recurrence_mode: Some(RecurrenceMode::InfiniteRecurring),
        payment_mode: Some(PaymentMode::PayAsYouGo),
    };

    if let Some(intro) = &subscription.introductory_price {
        let intro_phase = PricingPhase {
            price: intro.display_price.clone(),
            price_micros: intro.price_micros,
            currency: subscription.currency.clone(),
            billing_period: iso_billing_period(intro.period_count, intro.period_unit),
            billing_cycles: None,
            recurrence_mode: Some(RecurrenceMode::FiniteRecurring),
            payment_mode: intro.payment_mode.map(app_store_payment_mode),
        };
        offers.push(Offer {
            // Sentinel id for the introductory variant of the product.
            id: "introductory".to_string(),
            platform: Platform::AppleAppStore,
            product_id: subscription.product_id.clone(),
            pricing_phases: vec![intro_phase, final_phase.clone()],
            offer_type: OfferType::Introductory,
            offer_token: None,
        });
    }

    for discount in &subscription.discounts {
        let discount_phase = PricingPhase {
            price: discount.display_price.clone(),
            price_micros: discount.price_micros,
            currency: subscription.currency.clone(),
            billing_period: iso_billing_period(discount.period_count, discount.period_unit),
            billing_cycles: None,
            recurrence_mode: Some(RecurrenceMode::FiniteRecurring),
            payment_mode: discount.payment_mode.map(app_store_payment_mode),
        };
        offers.push(Offer {
            id: discount.identifier.clone(),
            platform: Platform::AppleAppStore,
            product_id: subscription.product_id.clone(),
            pricing_phases: vec![discount_phase, final_phase.clone()],
            offer_type: OfferType::Subscription,
            offer_token: None,
        });
    }

    offers.push(Offer {
        // "$" marks the plain full-price offer.
        id: "$".to_string(),
        platform: Platform::AppleAppStore,
        product_id: subscription.product_id.clone(),
        pricing_phases: vec![final_phase],
        offer_type: OfferType::Default,
        offer_token: None,
    });

    offers
}

fn iso_billing_period(count: u32, unit: Option<PeriodUnit>) -> Option<String> {
    let unit = unit?;
    if count == 0 {
        return None;
    }
    Some(format!("P{count}{}", unit.iso_code()))
}

fn app_store_payment_mode(mode: AppStorePaymentMode) -> PaymentMode {
    match mode {
        AppStorePaymentMode::FreeTrial => PaymentMode::FreeTrial,
        AppStorePaymentMode::PayAsYouGo => PaymentMode::PayAsYouGo,
        AppStorePaymentMode::PayUpFront => PaymentMode::UpFront,
    }
}
