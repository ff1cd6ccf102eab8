use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Every user's first wallet carries this name; peer transfers and escrow
/// refunds always settle against it.
pub const PRIMARY_WALLET_NAME: &str = "Genesis Wallet";

/// Escrow status enumeration. PENDING is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowStatus {
    Pending,
    Claimed,
    Expired,
}

impl EscrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowStatus::Pending => "PENDING",
            EscrowStatus::Claimed => "CLAIMED",
            EscrowStatus::Expired => "EXPIRED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub verified: bool,
    pub kyc_completed: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// A user may move funds only once verified and KYC complete.
    pub fn is_eligible(&self) -> bool {
        self.verified && self.kyc_completed
    }
}

/// Local cached view of an address on the chain ledger. `balance` and
/// `stake` are overwritten by the reconciler whenever the remote values
/// diverge.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub address: String,
    pub balance: Decimal,
    pub stake: Decimal,
    pub created_at: DateTime<Utc>,
}

/// A sender-funded, time-boxed, code-gated pending transfer to a recipient
/// without a resolvable wallet at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Escrow {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub sender_wallet_id: Uuid,
    pub recipient_email: String,
    pub amount: Decimal,
    pub code: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Escrow {
    pub fn is_pending(&self) -> bool {
        self.status == EscrowStatus::Pending.as_str()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Wallet creation request
#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct CreateWalletRequest {
    #[validate(email)]
    pub email: String,
    pub name: Option<String>,
}

/// Peer transfer request
#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct SendRequest {
    #[validate(email)]
    pub sender_email: String,
    #[validate(email)]
    pub recipient_email: String,
    pub amount: Decimal,
}

/// Mining request
#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct MineRequest {
    #[validate(length(min = 1))]
    pub wallet_address: String,
    pub stake: Decimal,
}

/// Escrow claim request
#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct ClaimRequest {
    #[validate(length(min = 1))]
    pub code: String,
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WalletResponse {
    pub address: String,
    pub balance: Decimal,
    pub stake: Decimal,
}

impl From<Wallet> for WalletResponse {
    fn from(wallet: Wallet) -> Self {
        WalletResponse {
            address: wallet.address,
            balance: wallet.balance,
            stake: wallet.stake,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn escrow_with_status(status: EscrowStatus) -> Escrow {
        Escrow {
            id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            sender_wallet_id: Uuid::new_v4(),
            recipient_email: "someone@example.com".to_string(),
            amount: dec!(10),
            code: "123456".to_string(),
            status: status.as_str().to_string(),
            created_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::hours(72),
        }
    }

    #[test]
    fn pending_is_the_only_open_state() {
        assert!(escrow_with_status(EscrowStatus::Pending).is_pending());
        assert!(!escrow_with_status(EscrowStatus::Claimed).is_pending());
        assert!(!escrow_with_status(EscrowStatus::Expired).is_pending());
    }

    #[test]
    fn expiry_is_strictly_after_deadline() {
        let escrow = escrow_with_status(EscrowStatus::Pending);
        assert!(!escrow.is_expired_at(escrow.expires_at));
        assert!(escrow.is_expired_at(escrow.expires_at + chrono::Duration::seconds(1)));
    }

    #[test]
    fn eligibility_requires_both_flags() {
        let mut user = User {
            id: Uuid::new_v4(),
            email: "user@example.com".to_string(),
            verified: true,
            kyc_completed: false,
            created_at: Utc::now(),
        };
        assert!(!user.is_eligible());
        user.kyc_completed = true;
        assert!(user.is_eligible());
    }
}
