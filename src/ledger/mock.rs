use super::{ChainLedger, LedgerBalance, MineOutcome};
use crate::errors::{Result, WalletEngineError};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// In-memory stand-in for the chain ledger. Used by the test suites and for
/// local runs without a chain node. Mutations are applied to its own balance
/// table so reconciliation behaves like it would against the real chain.
pub struct MockLedger {
    state: Arc<RwLock<MockLedgerState>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedTransaction {
    pub sender: String,
    pub receiver: String,
    pub amount: Decimal,
}

struct MockLedgerState {
    balances: HashMap<String, LedgerBalance>,
    transactions: Vec<RecordedTransaction>,
    mine_calls: u64,
    reward: Option<Decimal>,
    fail_balance: bool,
    fail_stake: bool,
    fail_transaction: bool,
    fail_mine: bool,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MockLedgerState {
                balances: HashMap::new(),
                transactions: Vec::new(),
                mine_calls: 0,
                reward: Some(Decimal::from(5)),
                fail_balance: false,
                fail_stake: false,
                fail_transaction: false,
                fail_mine: false,
            })),
        }
    }

    pub async fn set_balance(&self, address: &str, balance: Decimal, stake: Decimal) {
        self.state
            .write()
            .await
            .balances
            .insert(address.to_string(), LedgerBalance { balance, stake });
    }

    /// Reward returned by mine calls; `None` omits the field entirely.
    pub async fn set_reward(&self, reward: Option<Decimal>) {
        self.state.write().await.reward = reward;
    }

    pub async fn fail_balance(&self, fail: bool) {
        self.state.write().await.fail_balance = fail;
    }

    pub async fn fail_stake(&self, fail: bool) {
        self.state.write().await.fail_stake = fail;
    }

    pub async fn fail_transaction(&self, fail: bool) {
        self.state.write().await.fail_transaction = fail;
    }

    pub async fn fail_mine(&self, fail: bool) {
        self.state.write().await.fail_mine = fail;
    }

    pub async fn recorded_transactions(&self) -> Vec<RecordedTransaction> {
        self.state.read().await.transactions.clone()
    }

    pub async fn mine_calls(&self) -> u64 {
        self.state.read().await.mine_calls
    }
}

#[async_trait]
impl ChainLedger for MockLedger {
    async fn get_balance(&self, address: &str) -> Result<LedgerBalance> {
        let state = self.state.read().await;
        if state.fail_balance {
            return Err(WalletEngineError::RemoteLedger(
                "Simulated balance failure".to_string(),
            ));
        }

        // Unknown addresses read as zero, like the chain.
        Ok(state
            .balances
            .get(address)
            .copied()
            .unwrap_or(LedgerBalance {
                balance: Decimal::ZERO,
                stake: Decimal::ZERO,
            }))
    }

    async fn register_stake(&self, address: &str, amount: Decimal) -> Result<()> {
        let mut state = self.state.write().await;
        if state.fail_stake {
            return Err(WalletEngineError::RemoteLedger(
                "Simulated stake failure".to_string(),
            ));
        }

        let entry = state
            .balances
            .entry(address.to_string())
            .or_insert(LedgerBalance {
                balance: Decimal::ZERO,
                stake: Decimal::ZERO,
            });
        entry.stake += amount;

        info!("Mock ledger: registered stake {} for {}", amount, address);
        Ok(())
    }

    async fn submit_transaction(
        &self,
        sender: &str,
        receiver: &str,
        amount: Decimal,
    ) -> Result<String> {
        let mut state = self.state.write().await;
        if state.fail_transaction {
            return Err(WalletEngineError::RemoteLedger(
                "Simulated transaction failure".to_string(),
            ));
        }

        if let Some(entry) = state.balances.get_mut(sender) {
            entry.balance -= amount;
        }
        let entry = state
            .balances
            .entry(receiver.to_string())
            .or_insert(LedgerBalance {
                balance: Decimal::ZERO,
                stake: Decimal::ZERO,
            });
        entry.balance += amount;

        state.transactions.push(RecordedTransaction {
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            amount,
        });

        Ok(format!("mock-tx-{}", state.transactions.len()))
    }

    async fn mine(&self, address: &str, stake: Decimal) -> Result<MineOutcome> {
        let mut state = self.state.write().await;
        if state.fail_mine {
            return Err(WalletEngineError::RemoteLedger(
                "Simulated mine failure".to_string(),
            ));
        }

        state.mine_calls += 1;
        let reward = state.reward;
        let applied = reward.unwrap_or_else(|| Decimal::from(5));

        let entry = state
            .balances
            .entry(address.to_string())
            .or_insert(LedgerBalance {
                balance: Decimal::ZERO,
                stake: Decimal::ZERO,
            });
        entry.stake += stake;
        entry.balance = entry.balance - stake + applied;

        Ok(MineOutcome {
            reward,
            block_hash: Some(format!("mock-block-{}", state.mine_calls)),
        })
    }
}
