pub mod catalog;
pub mod consumables;
pub mod debounce;
pub mod engine;
pub mod ledger;
pub mod non_consumables;
pub mod pending;
pub mod subscriptions;
pub mod tokens;
pub mod validator;
