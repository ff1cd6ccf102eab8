use crate::errors::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub mod http;
pub mod mock;

pub use http::HttpLedgerClient;
pub use mock::MockLedger;

/// Authoritative `(balance, stake)` pair for an address, as reported by the
/// chain. Missing fields default to zero, matching the chain's behavior for
/// addresses it has not seen yet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LedgerBalance {
    #[serde(default)]
    pub balance: Decimal,
    #[serde(default)]
    pub stake: Decimal,
}

/// Result of a mine call. The chain may omit either field; callers decide
/// the fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MineOutcome {
    #[serde(default)]
    pub reward: Option<Decimal>,
    #[serde(default, rename = "blockHash")]
    pub block_hash: Option<String>,
}

/// Typed client for the chain ledger's REST surface. One call, one bounded
/// timeout, no retries; retry policy belongs to the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainLedger: Send + Sync {
    /// GET /balance?address=
    async fn get_balance(&self, address: &str) -> Result<LedgerBalance>;

    /// POST /stake, registering an address with the chain.
    async fn register_stake(&self, address: &str, amount: Decimal) -> Result<()>;

    /// POST /transaction, returning the chain transaction id.
    async fn submit_transaction(
        &self,
        sender: &str,
        receiver: &str,
        amount: Decimal,
    ) -> Result<String>;

    /// POST /mine
    async fn mine(&self, address: &str, stake: Decimal) -> Result<MineOutcome>;
}
