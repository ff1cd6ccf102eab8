#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use wallet_engine::database::WalletStore;
use wallet_engine::errors::{Result, WalletEngineError};
use wallet_engine::escrow::EscrowEngine;
use wallet_engine::ledger::{ChainLedger, MockLedger};
use wallet_engine::models::{Escrow, EscrowStatus, User, Wallet, PRIMARY_WALLET_NAME};
use wallet_engine::notifier::Notifier;
use wallet_engine::reconciler::Reconciler;
use wallet_engine::settlement::{SettlementEngine, SettlementOptions};
use wallet_engine::wallet::WalletService;

/// In-memory `WalletStore` with the same check-and-set semantics as the
/// Postgres implementation, so engine flows run without a database.
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    wallets: HashMap<Uuid, Wallet>,
    escrows: HashMap<Uuid, Escrow>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            state: Mutex::new(MemoryState::default()),
        }
    }

    pub fn add_user(&self, email: &str, verified: bool, kyc_completed: bool) -> User {
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            verified,
            kyc_completed,
            created_at: Utc::now(),
        };
        self.state
            .lock()
            .unwrap()
            .users
            .insert(user.id, user.clone());
        user
    }

    pub fn add_wallet(&self, user_id: Uuid, name: &str, balance: Decimal, stake: Decimal) -> Wallet {
        let wallet = Wallet {
            id: Uuid::new_v4(),
            user_id,
            name: name.to_string(),
            address: Uuid::new_v4().to_string(),
            balance,
            stake,
            created_at: Utc::now(),
        };
        self.state
            .lock()
            .unwrap()
            .wallets
            .insert(wallet.id, wallet.clone());
        wallet
    }

    pub fn wallet_by_address(&self, address: &str) -> Option<Wallet> {
        self.state
            .lock()
            .unwrap()
            .wallets
            .values()
            .find(|w| w.address == address)
            .cloned()
    }

    pub fn escrow(&self, escrow_id: Uuid) -> Option<Escrow> {
        self.state.lock().unwrap().escrows.get(&escrow_id).cloned()
    }

    pub fn wallet_count(&self) -> usize {
        self.state.lock().unwrap().wallets.len()
    }
}

#[async_trait]
impl WalletStore for MemoryStore {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        Ok(self.state.lock().unwrap().users.get(&user_id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn create_user_with_wallet(&self, email: &str) -> Result<(User, Wallet)> {
        let mut state = self.state.lock().unwrap();
        if state.users.values().any(|u| u.email == email) {
            return Err(WalletEngineError::Conflict(format!(
                "User {} already exists",
                email
            )));
        }

        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            verified: true,
            kyc_completed: false,
            created_at: Utc::now(),
        };
        let wallet = Wallet {
            id: Uuid::new_v4(),
            user_id: user.id,
            name: PRIMARY_WALLET_NAME.to_string(),
            address: Uuid::new_v4().to_string(),
            balance: Decimal::ZERO,
            stake: Decimal::ZERO,
            created_at: Utc::now(),
        };
        state.users.insert(user.id, user.clone());
        state.wallets.insert(wallet.id, wallet.clone());

        Ok((user, wallet))
    }

    async fn create_wallet(&self, user_id: Uuid, name: &str) -> Result<Wallet> {
        let mut state = self.state.lock().unwrap();
        if state
            .wallets
            .values()
            .any(|w| w.user_id == user_id && w.name == name)
        {
            return Err(WalletEngineError::Conflict(format!(
                "Wallet named '{}' already exists for this user",
                name
            )));
        }

        let wallet = Wallet {
            id: Uuid::new_v4(),
            user_id,
            name: name.to_string(),
            address: Uuid::new_v4().to_string(),
            balance: Decimal::ZERO,
            stake: Decimal::ZERO,
            created_at: Utc::now(),
        };
        state.wallets.insert(wallet.id, wallet.clone());

        Ok(wallet)
    }

    async fn delete_wallet(&self, wallet_id: Uuid) -> Result<()> {
        self.state.lock().unwrap().wallets.remove(&wallet_id);
        Ok(())
    }

    async fn get_wallet(&self, wallet_id: Uuid) -> Result<Option<Wallet>> {
        Ok(self.state.lock().unwrap().wallets.get(&wallet_id).cloned())
    }

    async fn get_wallet_by_address(&self, address: &str) -> Result<Option<Wallet>> {
        Ok(self.wallet_by_address(address))
    }

    async fn get_wallet_owned_by(&self, user_id: Uuid, address: &str) -> Result<Option<Wallet>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .wallets
            .values()
            .find(|w| w.address == address && w.user_id == user_id)
            .cloned())
    }

    async fn get_primary_wallet(&self, user_id: Uuid) -> Result<Option<Wallet>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .wallets
            .values()
            .find(|w| w.user_id == user_id && w.name == PRIMARY_WALLET_NAME)
            .cloned())
    }

    async fn list_wallet_addresses(&self) -> Result<Vec<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .wallets
            .values()
            .map(|w| w.address.clone())
            .collect())
    }

    async fn overwrite_ledger_values(
        &self,
        address: &str,
        balance: Decimal,
        stake: Decimal,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(wallet) = state.wallets.values_mut().find(|w| w.address == address) {
            wallet.balance = balance;
            wallet.stake = stake;
        }
        Ok(())
    }

    async fn apply_mine_settlement(
        &self,
        wallet_id: Uuid,
        stake_amount: Decimal,
        reward: Decimal,
    ) -> Result<Wallet> {
        let mut state = self.state.lock().unwrap();
        let wallet = state
            .wallets
            .get_mut(&wallet_id)
            .ok_or_else(|| WalletEngineError::WalletNotFound(wallet_id.to_string()))?;

        if wallet.balance < stake_amount {
            return Err(WalletEngineError::InsufficientFunds {
                required: stake_amount,
                available: wallet.balance,
            });
        }

        wallet.stake += stake_amount;
        wallet.balance = wallet.balance - stake_amount + reward;

        Ok(wallet.clone())
    }

    async fn transfer_between_wallets(
        &self,
        sender_wallet_id: Uuid,
        recipient_wallet_id: Uuid,
        amount: Decimal,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        let sender = state
            .wallets
            .get(&sender_wallet_id)
            .ok_or_else(|| WalletEngineError::WalletNotFound(sender_wallet_id.to_string()))?;
        if sender.balance < amount {
            return Err(WalletEngineError::InsufficientFunds {
                required: amount,
                available: sender.balance,
            });
        }

        state.wallets.get_mut(&sender_wallet_id).unwrap().balance -= amount;
        state
            .wallets
            .get_mut(&recipient_wallet_id)
            .ok_or_else(|| WalletEngineError::WalletNotFound(recipient_wallet_id.to_string()))?
            .balance += amount;

        Ok(())
    }

    async fn create_escrow(
        &self,
        sender_id: Uuid,
        sender_wallet_id: Uuid,
        recipient_email: &str,
        amount: Decimal,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Escrow> {
        let mut state = self.state.lock().unwrap();

        let sender_wallet = state
            .wallets
            .get_mut(&sender_wallet_id)
            .ok_or_else(|| WalletEngineError::WalletNotFound(sender_wallet_id.to_string()))?;
        if sender_wallet.balance < amount {
            return Err(WalletEngineError::InsufficientFunds {
                required: amount,
                available: sender_wallet.balance,
            });
        }
        sender_wallet.balance -= amount;

        let escrow = Escrow {
            id: Uuid::new_v4(),
            sender_id,
            sender_wallet_id,
            recipient_email: recipient_email.to_string(),
            amount,
            code: code.to_string(),
            status: EscrowStatus::Pending.as_str().to_string(),
            created_at: Utc::now(),
            expires_at,
        };
        state.escrows.insert(escrow.id, escrow.clone());

        Ok(escrow)
    }

    async fn get_escrow(&self, escrow_id: Uuid) -> Result<Option<Escrow>> {
        Ok(self.escrow(escrow_id))
    }

    async fn list_expired_pending(&self, now: DateTime<Utc>) -> Result<Vec<Escrow>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .escrows
            .values()
            .filter(|e| e.is_pending() && e.expires_at < now)
            .cloned()
            .collect())
    }

    async fn claim_escrow(&self, escrow_id: Uuid, recipient_wallet_id: Uuid) -> Result<bool> {
        let mut state = self.state.lock().unwrap();

        let Some(escrow) = state.escrows.get_mut(&escrow_id) else {
            return Ok(false);
        };
        if !escrow.is_pending() {
            return Ok(false);
        }
        escrow.status = EscrowStatus::Claimed.as_str().to_string();
        let amount = escrow.amount;

        state
            .wallets
            .get_mut(&recipient_wallet_id)
            .ok_or_else(|| WalletEngineError::WalletNotFound(recipient_wallet_id.to_string()))?
            .balance += amount;

        Ok(true)
    }

    async fn revert_claim(
        &self,
        escrow_id: Uuid,
        recipient_wallet_id: Uuid,
        amount: Decimal,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        if let Some(escrow) = state.escrows.get_mut(&escrow_id) {
            if escrow.status == EscrowStatus::Claimed.as_str() {
                escrow.status = EscrowStatus::Pending.as_str().to_string();
            }
        }

        if let Some(wallet) = state.wallets.get_mut(&recipient_wallet_id) {
            wallet.balance -= amount;
        }

        Ok(())
    }

    async fn expire_escrow(&self, escrow_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state.lock().unwrap();

        let Some(escrow) = state.escrows.get_mut(&escrow_id) else {
            return Ok(false);
        };
        if !escrow.is_pending() || escrow.expires_at >= now {
            return Ok(false);
        }
        escrow.status = EscrowStatus::Expired.as_str().to_string();
        let (sender_wallet_id, amount) = (escrow.sender_wallet_id, escrow.amount);

        if let Some(wallet) = state.wallets.get_mut(&sender_wallet_id) {
            wallet.balance += amount;
        }

        Ok(true)
    }
}

/// Notifier that records every message; optionally fails every send.
pub struct RecordingNotifier {
    pub fail: Mutex<bool>,
    pub sent: Mutex<Vec<(String, String, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        RecordingNotifier {
            fail: Mutex::new(false),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn sent_to(&self, recipient: &str) -> Vec<(String, String, String)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _, _)| to == recipient)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> std::result::Result<(), String> {
        if *self.fail.lock().unwrap() {
            return Err("simulated notification failure".to_string());
        }
        self.sent.lock().unwrap().push((
            recipient.to_string(),
            subject.to_string(),
            body.to_string(),
        ));
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub ledger: Arc<MockLedger>,
    pub notifier: Arc<RecordingNotifier>,
    pub reconciler: Arc<Reconciler>,
    pub settlement: Arc<SettlementEngine>,
    pub escrow: Arc<EscrowEngine>,
    pub wallets: Arc<WalletService>,
}

pub fn default_options() -> SettlementOptions {
    SettlementOptions {
        simulate_on_failure: false,
        simulated_reward: Decimal::from(5),
        fallback_reward: Decimal::from(5),
        escrow_lifetime_hours: 72,
        escrow_code_length: 6,
        claim_base_url: "http://localhost:8090".to_string(),
    }
}

pub fn harness() -> Harness {
    harness_with(default_options())
}

pub fn harness_with(options: SettlementOptions) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let ledger = Arc::new(MockLedger::new());
    let notifier = Arc::new(RecordingNotifier::new());

    let store_dyn: Arc<dyn WalletStore> = store.clone();
    let ledger_dyn: Arc<dyn ChainLedger> = ledger.clone();
    let notifier_dyn: Arc<dyn Notifier> = notifier.clone();

    let reconciler = Arc::new(Reconciler::new(store_dyn.clone(), ledger_dyn.clone()));
    let settlement = Arc::new(SettlementEngine::new(
        store_dyn.clone(),
        ledger_dyn.clone(),
        reconciler.clone(),
        notifier_dyn.clone(),
        options,
    ));
    let escrow = Arc::new(EscrowEngine::new(
        store_dyn.clone(),
        ledger_dyn.clone(),
        notifier_dyn,
    ));
    let wallets = Arc::new(WalletService::new(
        store_dyn,
        ledger_dyn,
        reconciler.clone(),
    ));

    Harness {
        store,
        ledger,
        notifier,
        reconciler,
        settlement,
        escrow,
        wallets,
    }
}
