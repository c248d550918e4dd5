// Integration tests

mod common;

mod catalog_test;
mod debounce_test;
mod ledger_test;
mod ownership_test;
