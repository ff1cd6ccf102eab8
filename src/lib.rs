pub mod auth;
pub mod config;
pub mod errors;
pub mod models;
pub mod handlers;
pub mod database;
pub mod ledger;
pub mod reconciler;
pub mod settlement;
pub mod escrow;
pub mod wallet;
pub mod notifier;
pub mod metrics;

pub use config::Config;
pub use errors::{Result, WalletEngineError};
