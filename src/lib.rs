//! wager-engine — atomic HIGH/LOW wagers against a durable ledger.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod storage;
pub mod strategy;
pub mod guard;
pub mod engine;
pub mod api;
