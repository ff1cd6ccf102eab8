use crate::database::WalletStore;
use crate::errors::{Result, WalletEngineError};
use crate::escrow::one_time_code;
use crate::ledger::ChainLedger;
use crate::metrics;
use crate::notifier::Notifier;
use crate::reconciler::Reconciler;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Block identifier reported when a mining settlement was applied locally
/// because the chain was unreachable.
pub const SIMULATED_BLOCK_ID: &str = "simulated-block-hash";

#[derive(Debug, Clone)]
pub struct SettlementOptions {
    /// Settle mining with a fixed reward when the chain call fails, instead
    /// of failing the request.
    pub simulate_on_failure: bool,
    pub simulated_reward: Decimal,
    /// Applied when the chain's mine response omits the reward field.
    pub fallback_reward: Decimal,
    pub escrow_lifetime_hours: i64,
    pub escrow_code_length: usize,
    /// Public base URL used to build escrow claim links.
    pub claim_base_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MineSettlement {
    pub wallet_address: String,
    pub reward: Decimal,
    pub block_hash: String,
    pub new_balance: Decimal,
    pub stake: Decimal,
    /// True when the reward was applied locally without the chain; callers
    /// must be able to tell the two apart.
    pub simulated: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SendOutcome {
    /// Both wallets settled against a confirmed chain transaction.
    Transferred { tx_id: String },
    /// Funds held off-ledger until the recipient claims.
    EscrowHeld {
        escrow_id: Uuid,
        expires_at: DateTime<Utc>,
    },
}

/// Applies the local effects of mining and peer transfers, pairing each with
/// its chain ledger call and handing the touched addresses to the reconciler.
pub struct SettlementEngine {
    store: Arc<dyn WalletStore>,
    ledger: Arc<dyn ChainLedger>,
    reconciler: Arc<Reconciler>,
    notifier: Arc<dyn Notifier>,
    options: SettlementOptions,
}

impl SettlementEngine {
    pub fn new(
        store: Arc<dyn WalletStore>,
        ledger: Arc<dyn ChainLedger>,
        reconciler: Arc<Reconciler>,
        notifier: Arc<dyn Notifier>,
        options: SettlementOptions,
    ) -> Self {
        SettlementEngine {
            store,
            ledger,
            reconciler,
            notifier,
            options,
        }
    }

    /// Stake-based mining settlement. Stake and balance move together or not
    /// at all.
    pub async fn mine(
        &self,
        user_id: Uuid,
        wallet_address: &str,
        stake_amount: Decimal,
    ) -> Result<MineSettlement> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| WalletEngineError::UserNotFound(user_id.to_string()))?;

        if !user.is_eligible() {
            return Err(WalletEngineError::Authorization(
                "User not verified or KYC incomplete".to_string(),
            ));
        }

        let wallet = self
            .store
            .get_wallet_owned_by(user_id, wallet_address)
            .await?
            .ok_or_else(|| {
                WalletEngineError::WalletNotFound(format!(
                    "{} (not found or not owned by caller)",
                    wallet_address
                ))
            })?;

        if stake_amount <= Decimal::ZERO {
            return Err(WalletEngineError::Validation(
                "Stake must be positive".to_string(),
            ));
        }

        if wallet.balance < stake_amount {
            return Err(WalletEngineError::InsufficientFunds {
                required: stake_amount,
                available: wallet.balance,
            });
        }

        match self.ledger.mine(wallet_address, stake_amount).await {
            Ok(outcome) => {
                let reward = outcome.reward.unwrap_or(self.options.fallback_reward);
                if reward <= Decimal::ZERO {
                    return Err(WalletEngineError::RemoteLedger(
                        "No reward issued by the chain".to_string(),
                    ));
                }

                let updated = self
                    .store
                    .apply_mine_settlement(wallet.id, stake_amount, reward)
                    .await?;

                metrics::MINE_SETTLEMENTS_TOTAL
                    .with_label_values(&["chain"])
                    .inc();
                info!(
                    "Mined {} for wallet {} (stake {})",
                    reward, wallet_address, stake_amount
                );

                // Fold in any server-side rounding or fee adjustments.
                if let Err(e) = self.reconciler.reconcile(wallet_address).await {
                    warn!("Post-mine reconciliation for {} failed: {}", wallet_address, e);
                }

                Ok(MineSettlement {
                    wallet_address: wallet.address,
                    reward,
                    block_hash: outcome
                        .block_hash
                        .unwrap_or_else(|| "unknown".to_string()),
                    new_balance: updated.balance,
                    stake: updated.stake,
                    simulated: false,
                })
            }
            Err(e) if self.options.simulate_on_failure => {
                metrics::REMOTE_LEDGER_ERRORS_TOTAL.inc();
                warn!(
                    "Chain mine call failed ({}); settling wallet {} with simulated reward",
                    e, wallet_address
                );

                let reward = self.options.simulated_reward;
                let updated = self
                    .store
                    .apply_mine_settlement(wallet.id, stake_amount, reward)
                    .await?;

                metrics::MINE_SETTLEMENTS_TOTAL
                    .with_label_values(&["simulated"])
                    .inc();

                Ok(MineSettlement {
                    wallet_address: wallet.address,
                    reward,
                    block_hash: SIMULATED_BLOCK_ID.to_string(),
                    new_balance: updated.balance,
                    stake: updated.stake,
                    simulated: true,
                })
            }
            Err(e) => {
                metrics::REMOTE_LEDGER_ERRORS_TOTAL.inc();
                Err(e)
            }
        }
    }

    /// Peer transfer. Residents settle wallet-to-wallet against the chain;
    /// everyone else gets a code-gated escrow holding the funds off-ledger.
    pub async fn send(
        &self,
        caller_id: Uuid,
        sender_email: &str,
        recipient_email: &str,
        amount: Decimal,
    ) -> Result<SendOutcome> {
        if amount <= Decimal::ZERO {
            return Err(WalletEngineError::Validation(
                "Amount must be positive".to_string(),
            ));
        }

        let sender = self
            .store
            .get_user_by_email(sender_email)
            .await?
            .ok_or_else(|| WalletEngineError::UserNotFound(sender_email.to_string()))?;

        if sender.id != caller_id {
            return Err(WalletEngineError::Authorization(
                "Sender email does not belong to the authenticated caller".to_string(),
            ));
        }

        if !sender.is_eligible() {
            return Err(WalletEngineError::Authorization(
                "Sender not verified or KYC incomplete".to_string(),
            ));
        }

        let sender_wallet = self
            .store
            .get_primary_wallet(sender.id)
            .await?
            .ok_or_else(|| {
                WalletEngineError::WalletNotFound(format!("primary wallet of {}", sender_email))
            })?;

        if sender_wallet.balance < amount {
            return Err(WalletEngineError::InsufficientFunds {
                required: amount,
                available: sender_wallet.balance,
            });
        }

        let recipient = self.store.get_user_by_email(recipient_email).await?;

        match recipient {
            Some(recipient) if recipient.is_eligible() => {
                let recipient_wallet = self
                    .store
                    .get_primary_wallet(recipient.id)
                    .await?
                    .ok_or_else(|| {
                        WalletEngineError::WalletNotFound(format!(
                            "primary wallet of {}",
                            recipient_email
                        ))
                    })?;

                self.transfer_resident(
                    &sender_wallet.address,
                    sender_wallet.id,
                    &recipient_wallet.address,
                    recipient_wallet.id,
                    sender_email,
                    recipient_email,
                    amount,
                )
                .await
            }
            _ => {
                self.hold_in_escrow(sender.id, sender_wallet.id, recipient_email, amount)
                    .await
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn transfer_resident(
        &self,
        sender_address: &str,
        sender_wallet_id: Uuid,
        recipient_address: &str,
        recipient_wallet_id: Uuid,
        sender_email: &str,
        recipient_email: &str,
        amount: Decimal,
    ) -> Result<SendOutcome> {
        // No local change before the chain confirms a transaction id.
        let tx_id = self
            .ledger
            .submit_transaction(sender_address, recipient_address, amount)
            .await
            .map_err(|e| {
                metrics::REMOTE_LEDGER_ERRORS_TOTAL.inc();
                e
            })?;

        self.store
            .transfer_between_wallets(sender_wallet_id, recipient_wallet_id, amount)
            .await?;

        metrics::TRANSFERS_TOTAL.inc();
        info!(
            "Transferred {} from {} to {} (tx {})",
            amount, sender_address, recipient_address, tx_id
        );

        for address in [sender_address, recipient_address] {
            if let Err(e) = self.reconciler.reconcile(address).await {
                warn!("Post-transfer reconciliation for {} failed: {}", address, e);
            }
        }

        if let Err(e) = self
            .notifier
            .notify(
                sender_email,
                "Transaction sent",
                &format!(
                    "You sent {} to {}. Transaction ID: {}",
                    amount, recipient_email, tx_id
                ),
            )
            .await
        {
            warn!("Failed to notify sender {}: {}", sender_email, e);
        }

        if let Err(e) = self
            .notifier
            .notify(
                recipient_email,
                "Transaction received",
                &format!(
                    "You received {} from {}. Transaction ID: {}",
                    amount, sender_email, tx_id
                ),
            )
            .await
        {
            warn!("Failed to notify recipient {}: {}", recipient_email, e);
        }

        Ok(SendOutcome::Transferred { tx_id })
    }

    // No chain interaction here: the chain cannot hold funds for an address
    // that does not exist yet, so the commitment is local-only until claim.
    async fn hold_in_escrow(
        &self,
        sender_id: Uuid,
        sender_wallet_id: Uuid,
        recipient_email: &str,
        amount: Decimal,
    ) -> Result<SendOutcome> {
        let code = one_time_code(self.options.escrow_code_length);
        let expires_at = Utc::now() + Duration::hours(self.options.escrow_lifetime_hours);

        let escrow = self
            .store
            .create_escrow(
                sender_id,
                sender_wallet_id,
                recipient_email,
                amount,
                &code,
                expires_at,
            )
            .await?;

        metrics::ESCROW_TRANSITIONS_TOTAL
            .with_label_values(&["pending"])
            .inc();
        info!(
            "Escrow {} created: {} held for {} until {}",
            escrow.id, amount, recipient_email, expires_at
        );

        let claim_link = format!(
            "{}/escrow/claim/{}?code={}",
            self.options.claim_base_url, escrow.id, escrow.code
        );
        if let Err(e) = self
            .notifier
            .notify(
                recipient_email,
                "Claim your funds",
                &format!("Click here to claim {}: {}", amount, claim_link),
            )
            .await
        {
            warn!("Failed to notify recipient {}: {}", recipient_email, e);
        }

        Ok(SendOutcome::EscrowHeld {
            escrow_id: escrow.id,
            expires_at: escrow.expires_at,
        })
    }
}
