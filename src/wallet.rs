use crate::database::WalletStore;
use crate::errors::{Result, WalletEngineError};
use crate::ledger::ChainLedger;
use crate::metrics;
use crate::models::{Wallet, PRIMARY_WALLET_NAME};
use crate::reconciler::Reconciler;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Wallet registration and balance queries. Registration pairs the local
/// insert with an on-chain stake registration and compensates the insert
/// away when the chain call fails.
pub struct WalletService {
    store: Arc<dyn WalletStore>,
    ledger: Arc<dyn ChainLedger>,
    reconciler: Arc<Reconciler>,
}

impl WalletService {
    pub fn new(
        store: Arc<dyn WalletStore>,
        ledger: Arc<dyn ChainLedger>,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        WalletService {
            store,
            ledger,
            reconciler,
        }
    }

    pub async fn create_wallet(&self, email: &str, name: Option<String>) -> Result<Wallet> {
        let user = self
            .store
            .get_user_by_email(email)
            .await?
            .ok_or_else(|| WalletEngineError::UserNotFound(email.to_string()))?;

        if !user.verified {
            return Err(WalletEngineError::Authorization(
                "User not verified".to_string(),
            ));
        }

        let name = name.unwrap_or_else(|| PRIMARY_WALLET_NAME.to_string());
        let wallet = self.store.create_wallet(user.id, &name).await?;

        match self
            .ledger
            .register_stake(&wallet.address, Decimal::ZERO)
            .await
        {
            Ok(()) => {
                info!("Wallet {} registered on chain for {}", wallet.address, email);

                if let Err(e) = self.reconciler.reconcile(&wallet.address).await {
                    warn!(
                        "Post-registration reconciliation for {} failed: {}",
                        wallet.address, e
                    );
                }

                Ok(self
                    .store
                    .get_wallet(wallet.id)
                    .await?
                    .unwrap_or(wallet))
            }
            Err(e) => {
                metrics::REMOTE_LEDGER_ERRORS_TOTAL.inc();

                // The chain never learned about this address; take the local
                // row back out rather than keep an unregistered wallet.
                if let Err(delete_err) = self.store.delete_wallet(wallet.id).await {
                    error!(
                        "Failed to remove unregistered wallet {}: {}",
                        wallet.address, delete_err
                    );
                }

                Err(e)
            }
        }
    }

    /// Balance query refreshes the cached row first; a chain failure is
    /// tolerated and the cached values are served.
    pub async fn balance(&self, address: &str) -> Result<Wallet> {
        let wallet = self
            .store
            .get_wallet_by_address(address)
            .await?
            .ok_or_else(|| WalletEngineError::WalletNotFound(address.to_string()))?;

        match self.reconciler.reconcile(address).await {
            Ok(_) => Ok(self
                .store
                .get_wallet_by_address(address)
                .await?
                .unwrap_or(wallet)),
            Err(e) => {
                warn!(
                    "Balance refresh for {} failed ({}); serving cached values",
                    address, e
                );
                Ok(wallet)
            }
        }
    }
}
