use crate::database::WalletStore;
use crate::errors::Result;
use crate::ledger::{ChainLedger, LedgerBalance};
use crate::metrics;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of a single reconciliation pass over one address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ReconcileOutcome {
    /// No local row for the address; nothing to correct.
    WalletNotFound,
    InSync,
    Corrected {
        previous: LedgerBalance,
        current: LedgerBalance,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileAllReport {
    pub scanned: usize,
    pub corrected: usize,
    pub failed: usize,
}

/// Pulls the authoritative `(balance, stake)` pair from the chain and
/// overwrites the local row when it has drifted. The chain wins every
/// conflict; a remote failure leaves local state untouched.
pub struct Reconciler {
    store: Arc<dyn WalletStore>,
    ledger: Arc<dyn ChainLedger>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn WalletStore>, ledger: Arc<dyn ChainLedger>) -> Self {
        Reconciler { store, ledger }
    }

    pub async fn reconcile(&self, address: &str) -> Result<ReconcileOutcome> {
        let Some(wallet) = self.store.get_wallet_by_address(address).await? else {
            return Ok(ReconcileOutcome::WalletNotFound);
        };

        let remote = self.ledger.get_balance(address).await.map_err(|e| {
            metrics::REMOTE_LEDGER_ERRORS_TOTAL.inc();
            e
        })?;

        if wallet.balance == remote.balance && wallet.stake == remote.stake {
            return Ok(ReconcileOutcome::InSync);
        }

        self.store
            .overwrite_ledger_values(address, remote.balance, remote.stake)
            .await?;

        metrics::RECONCILIATION_CORRECTIONS_TOTAL.inc();
        info!(
            "Reconciled wallet {}: balance {} -> {}, stake {} -> {}",
            address, wallet.balance, remote.balance, wallet.stake, remote.stake
        );

        Ok(ReconcileOutcome::Corrected {
            previous: LedgerBalance {
                balance: wallet.balance,
                stake: wallet.stake,
            },
            current: remote,
        })
    }

    /// Reconcile every known address. Per-address failures are logged and
    /// counted; the sweep never aborts early.
    pub async fn reconcile_all(&self) -> Result<ReconcileAllReport> {
        let addresses = self.store.list_wallet_addresses().await?;
        let scanned = addresses.len();
        let mut corrected = 0;
        let mut failed = 0;

        for address in addresses {
            match self.reconcile(&address).await {
                Ok(ReconcileOutcome::Corrected { .. }) => corrected += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!("Failed to reconcile wallet {}: {}", address, e);
                    failed += 1;
                }
            }
        }

        info!(
            "Reconciliation sweep complete: {} wallets, {} corrected, {} failed",
            scanned, corrected, failed
        );

        Ok(ReconcileAllReport {
            scanned,
            corrected,
            failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MockWalletStore;
    use crate::errors::WalletEngineError;
    use crate::ledger::MockLedger;
    use crate::models::Wallet;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn wallet(address: &str, balance: rust_decimal::Decimal, stake: rust_decimal::Decimal) -> Wallet {
        Wallet {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "Genesis Wallet".to_string(),
            address: address.to_string(),
            balance,
            stake,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn missing_wallet_is_a_noop() {
        let mut store = MockWalletStore::new();
        store
            .expect_get_wallet_by_address()
            .returning(|_| Ok(None));
        store.expect_overwrite_ledger_values().never();

        let ledger = Arc::new(MockLedger::new());
        let reconciler = Reconciler::new(Arc::new(store), ledger);

        let outcome = reconciler.reconcile("ghost").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::WalletNotFound);
    }

    #[tokio::test]
    async fn drift_is_corrected_in_the_chains_favor() {
        let mut store = MockWalletStore::new();
        let local = wallet("addr-1", dec!(100), dec!(0));
        store
            .expect_get_wallet_by_address()
            .returning(move |_| Ok(Some(local.clone())));
        store
            .expect_overwrite_ledger_values()
            .withf(|address, balance, stake| {
                address == "addr-1" && *balance == dec!(70) && *stake == dec!(10)
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let ledger = Arc::new(MockLedger::new());
        ledger.set_balance("addr-1", dec!(70), dec!(10)).await;

        let reconciler = Reconciler::new(Arc::new(store), ledger);
        let outcome = reconciler.reconcile("addr-1").await.unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome::Corrected {
                previous: LedgerBalance {
                    balance: dec!(100),
                    stake: dec!(0),
                },
                current: LedgerBalance {
                    balance: dec!(70),
                    stake: dec!(10),
                },
            }
        );
    }

    #[tokio::test]
    async fn matching_values_leave_the_row_alone() {
        let mut store = MockWalletStore::new();
        let local = wallet("addr-2", dec!(70), dec!(10));
        store
            .expect_get_wallet_by_address()
            .returning(move |_| Ok(Some(local.clone())));
        store.expect_overwrite_ledger_values().never();

        let ledger = Arc::new(MockLedger::new());
        ledger.set_balance("addr-2", dec!(70), dec!(10)).await;

        let reconciler = Reconciler::new(Arc::new(store), ledger);
        let outcome = reconciler.reconcile("addr-2").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::InSync);
    }

    #[tokio::test]
    async fn remote_failure_keeps_local_state() {
        let mut store = MockWalletStore::new();
        let local = wallet("addr-3", dec!(100), dec!(0));
        store
            .expect_get_wallet_by_address()
            .returning(move |_| Ok(Some(local.clone())));
        store.expect_overwrite_ledger_values().never();

        let ledger = Arc::new(MockLedger::new());
        ledger.fail_balance(true).await;

        let reconciler = Reconciler::new(Arc::new(store), ledger);
        let err = reconciler.reconcile("addr-3").await.unwrap_err();
        assert!(matches!(err, WalletEngineError::RemoteLedger(_)));
    }
}
