use crate::database::WalletStore;
use crate::errors::{Result, WalletEngineError};
use crate::ledger::ChainLedger;
use crate::metrics;
use crate::models::{Escrow, Wallet, PRIMARY_WALLET_NAME};
use crate::notifier::Notifier;
use rand::Rng;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Numeric one-time claim secret.
pub fn one_time_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10)))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct ClaimSettlement {
    pub escrow_id: Uuid,
    pub wallet_address: String,
    pub amount: Decimal,
    pub tx_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub expired: usize,
}

/// State machine for deferred transfers: PENDING until a matching claim
/// credits the recipient, or until expiry refunds the sender. Transitions
/// out of PENDING are atomic check-and-set operations in the store, so a
/// claim racing a sweep settles exactly once.
pub struct EscrowEngine {
    store: Arc<dyn WalletStore>,
    ledger: Arc<dyn ChainLedger>,
    notifier: Arc<dyn Notifier>,
}

impl EscrowEngine {
    pub fn new(
        store: Arc<dyn WalletStore>,
        ledger: Arc<dyn ChainLedger>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        EscrowEngine {
            store,
            ledger,
            notifier,
        }
    }

    /// One-time-code gated claim. The local claim is applied first and
    /// compensated away if the chain transfer fails, so a recipient is never
    /// credited without a matching chain transaction.
    pub async fn claim(
        &self,
        escrow_id: Uuid,
        code: &str,
        recipient_email: &str,
    ) -> Result<ClaimSettlement> {
        let escrow = self
            .store
            .get_escrow(escrow_id)
            .await?
            .ok_or(WalletEngineError::EscrowNotFound(escrow_id))?;

        if !escrow.is_pending() {
            return Err(WalletEngineError::Conflict(
                "Escrow already claimed or expired".to_string(),
            ));
        }

        if escrow.code != code || escrow.recipient_email != recipient_email {
            return Err(WalletEngineError::Validation(
                "Invalid claim code or email".to_string(),
            ));
        }

        let now = chrono::Utc::now();
        if escrow.is_expired_at(now) {
            // Lazy sweep: the claim attempt itself drives the expiry.
            if self.store.expire_escrow(escrow_id, now).await? {
                metrics::ESCROW_TRANSITIONS_TOTAL
                    .with_label_values(&["expired"])
                    .inc();
                info!("Escrow {} expired on claim attempt, sender refunded", escrow_id);
                self.notify_sender_of_refund(&escrow).await;
            }
            return Err(WalletEngineError::Conflict("Escrow expired".to_string()));
        }

        let sender_wallet = self
            .store
            .get_wallet(escrow.sender_wallet_id)
            .await?
            .ok_or_else(|| {
                WalletEngineError::Internal(format!(
                    "Sender wallet missing for escrow {}",
                    escrow_id
                ))
            })?;

        // Resolving (or creating) the recipient commits on its own; only the
        // claim settlement itself is compensated on chain failure.
        let recipient_wallet = self.resolve_recipient_wallet(recipient_email).await?;

        if !self.store.claim_escrow(escrow_id, recipient_wallet.id).await? {
            return Err(WalletEngineError::Conflict(
                "Escrow already claimed or expired".to_string(),
            ));
        }

        match self
            .ledger
            .submit_transaction(&sender_wallet.address, &recipient_wallet.address, escrow.amount)
            .await
        {
            Ok(tx_id) => {
                metrics::ESCROW_TRANSITIONS_TOTAL
                    .with_label_values(&["claimed"])
                    .inc();
                info!(
                    "Escrow {} claimed by {} (tx {})",
                    escrow_id, recipient_email, tx_id
                );

                if let Err(e) = self
                    .notifier
                    .notify(
                        recipient_email,
                        "Funds claimed",
                        &format!(
                            "You claimed {} into wallet {}.",
                            escrow.amount, recipient_wallet.address
                        ),
                    )
                    .await
                {
                    warn!("Failed to notify claimant {}: {}", recipient_email, e);
                }

                Ok(ClaimSettlement {
                    escrow_id,
                    wallet_address: recipient_wallet.address,
                    amount: escrow.amount,
                    tx_id,
                })
            }
            Err(e) => {
                metrics::REMOTE_LEDGER_ERRORS_TOTAL.inc();
                warn!(
                    "Chain transfer for escrow {} failed ({}); reverting local claim",
                    escrow_id, e
                );
                if let Err(revert_err) = self
                    .store
                    .revert_claim(escrow_id, recipient_wallet.id, escrow.amount)
                    .await
                {
                    error!(
                        "Failed to revert claim for escrow {}: {}",
                        escrow_id, revert_err
                    );
                }
                Err(e)
            }
        }
    }

    /// Proactive complement to the lazy sweep in `claim`. Safe to invoke
    /// repeatedly and concurrently with claims: the store's check-and-set
    /// guarantees each escrow refunds exactly once.
    pub async fn sweep_expired(&self) -> Result<SweepReport> {
        let now = chrono::Utc::now();
        let candidates = self.store.list_expired_pending(now).await?;
        let scanned = candidates.len();
        let mut expired = 0;

        for escrow in candidates {
            match self.store.expire_escrow(escrow.id, now).await {
                Ok(true) => {
                    expired += 1;
                    metrics::ESCROW_TRANSITIONS_TOTAL
                        .with_label_values(&["expired"])
                        .inc();
                    self.notify_sender_of_refund(&escrow).await;
                }
                // Lost the race to a concurrent claim or sweep.
                Ok(false) => {}
                Err(e) => {
                    error!("Failed to expire escrow {}: {}", escrow.id, e);
                }
            }
        }

        info!(
            "Escrow sweep complete: {} candidates, {} expired",
            scanned, expired
        );

        Ok(SweepReport { scanned, expired })
    }

    /// Periodic sweep driver.
    pub async fn start_sweep_loop(self: Arc<Self>, interval_secs: u64) {
        let mut ticker = interval(Duration::from_secs(interval_secs));

        info!(
            "Starting escrow sweep loop with {} second interval",
            interval_secs
        );

        loop {
            ticker.tick().await;

            if let Err(e) = self.sweep_expired().await {
                error!("Escrow sweep failed: {}", e);
            }
        }
    }

    async fn resolve_recipient_wallet(&self, recipient_email: &str) -> Result<Wallet> {
        match self.store.get_user_by_email(recipient_email).await? {
            Some(user) => match self.store.get_primary_wallet(user.id).await? {
                Some(wallet) => Ok(wallet),
                None => self.store.create_wallet(user.id, PRIMARY_WALLET_NAME).await,
            },
            None => {
                let (user, wallet) = self.store.create_user_with_wallet(recipient_email).await?;
                info!(
                    "Created user {} with genesis wallet {} for escrow claim",
                    user.email, wallet.address
                );
                Ok(wallet)
            }
        }
    }

    async fn notify_sender_of_refund(&self, escrow: &Escrow) {
        let sender_email = match self.store.get_user(escrow.sender_id).await {
            Ok(Some(user)) => user.email,
            Ok(None) => {
                warn!("Sender {} of escrow {} not found", escrow.sender_id, escrow.id);
                return;
            }
            Err(e) => {
                warn!("Failed to load sender of escrow {}: {}", escrow.id, e);
                return;
            }
        };

        if let Err(e) = self
            .notifier
            .notify(
                &sender_email,
                "Escrow expired",
                &format!("Your {} has been returned.", escrow.amount),
            )
            .await
        {
            warn!("Failed to notify sender {}: {}", sender_email, e);
        }
    }
}
