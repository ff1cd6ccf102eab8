use crate::errors::{Result, WalletEngineError};
use crate::models::{Escrow, EscrowStatus, User, Wallet, PRIMARY_WALLET_NAME};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Pool, Postgres};
use std::time::Duration;
use uuid::Uuid;

/// Persistence seam for the engines. Every compound operation is a single
/// database transaction; callers never observe a debit without its matching
/// credit or status transition.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Minimal user plus genesis wallet, created as one transaction. Used by
    /// escrow claims arriving from an unknown email.
    async fn create_user_with_wallet(&self, email: &str) -> Result<(User, Wallet)>;

    async fn create_wallet(&self, user_id: Uuid, name: &str) -> Result<Wallet>;

    /// Compensation for a wallet whose on-chain registration failed.
    async fn delete_wallet(&self, wallet_id: Uuid) -> Result<()>;

    async fn get_wallet(&self, wallet_id: Uuid) -> Result<Option<Wallet>>;
    async fn get_wallet_by_address(&self, address: &str) -> Result<Option<Wallet>>;
    async fn get_wallet_owned_by(&self, user_id: Uuid, address: &str) -> Result<Option<Wallet>>;
    async fn get_primary_wallet(&self, user_id: Uuid) -> Result<Option<Wallet>>;
    async fn list_wallet_addresses(&self) -> Result<Vec<String>>;

    /// Reconciler correction: replace cached values with the chain's.
    async fn overwrite_ledger_values(
        &self,
        address: &str,
        balance: Decimal,
        stake: Decimal,
    ) -> Result<()>;

    /// `stake += stake_amount; balance += reward - stake_amount`, atomically,
    /// guarded by `balance >= stake_amount`.
    async fn apply_mine_settlement(
        &self,
        wallet_id: Uuid,
        stake_amount: Decimal,
        reward: Decimal,
    ) -> Result<Wallet>;

    /// Guarded debit of the sender plus credit of the recipient.
    async fn transfer_between_wallets(
        &self,
        sender_wallet_id: Uuid,
        recipient_wallet_id: Uuid,
        amount: Decimal,
    ) -> Result<()>;

    /// Sender debit plus escrow insert, atomically.
    async fn create_escrow(
        &self,
        sender_id: Uuid,
        sender_wallet_id: Uuid,
        recipient_email: &str,
        amount: Decimal,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Escrow>;

    async fn get_escrow(&self, escrow_id: Uuid) -> Result<Option<Escrow>>;
    async fn list_expired_pending(&self, now: DateTime<Utc>) -> Result<Vec<Escrow>>;

    /// Check-and-set PENDING -> CLAIMED plus recipient credit. Returns
    /// whether this call won the transition.
    async fn claim_escrow(&self, escrow_id: Uuid, recipient_wallet_id: Uuid) -> Result<bool>;

    /// Compensating rollback of `claim_escrow`: CLAIMED -> PENDING and the
    /// credit removed.
    async fn revert_claim(
        &self,
        escrow_id: Uuid,
        recipient_wallet_id: Uuid,
        amount: Decimal,
    ) -> Result<()>;

    /// Check-and-set PENDING -> EXPIRED (only past the deadline) plus sender
    /// refund. Returns whether this call won the transition, so a racing
    /// claim and sweep refund exactly once.
    async fn expire_escrow(&self, escrow_id: Uuid, now: DateTime<Utc>) -> Result<bool>;
}

pub struct Database {
    pool: Pool<Postgres>,
}

impl Database {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        Ok(Database { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema. Idempotent; run at startup.
    pub async fn run_migrations(&self) -> Result<()> {
        use sqlx::Executor;

        self.pool
            .execute(include_str!("../migrations/001_init.sql"))
            .await?;

        Ok(())
    }
}

#[async_trait]
impl WalletStore for Database {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn create_user_with_wallet(&self, email: &str) -> Result<(User, Wallet)> {
        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, verified, kyc_completed, created_at)
            VALUES ($1, $2, TRUE, FALSE, $3)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            INSERT INTO wallets (id, user_id, name, address, balance, stake, created_at)
            VALUES ($1, $2, $3, $4, 0, 0, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user.id)
        .bind(PRIMARY_WALLET_NAME)
        .bind(Uuid::new_v4().to_string())
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((user, wallet))
    }

    async fn create_wallet(&self, user_id: Uuid, name: &str) -> Result<Wallet> {
        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            INSERT INTO wallets (id, user_id, name, address, balance, stake, created_at)
            VALUES ($1, $2, $3, $4, 0, 0, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(name)
        .bind(Uuid::new_v4().to_string())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.constraint() == Some("unique_user_wallet_name") {
                    return WalletEngineError::Conflict(format!(
                        "Wallet named '{}' already exists for this user",
                        name
                    ));
                }
            }
            WalletEngineError::Database(e)
        })?;

        Ok(wallet)
    }

    async fn delete_wallet(&self, wallet_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM wallets WHERE id = $1")
            .bind(wallet_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get_wallet(&self, wallet_id: Uuid) -> Result<Option<Wallet>> {
        let wallet = sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE id = $1")
            .bind(wallet_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(wallet)
    }

    async fn get_wallet_by_address(&self, address: &str) -> Result<Option<Wallet>> {
        let wallet = sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE address = $1")
            .bind(address)
            .fetch_optional(&self.pool)
            .await?;

        Ok(wallet)
    }

    async fn get_wallet_owned_by(&self, user_id: Uuid, address: &str) -> Result<Option<Wallet>> {
        let wallet = sqlx::query_as::<_, Wallet>(
            "SELECT * FROM wallets WHERE address = $1 AND user_id = $2",
        )
        .bind(address)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(wallet)
    }

    async fn get_primary_wallet(&self, user_id: Uuid) -> Result<Option<Wallet>> {
        let wallet = sqlx::query_as::<_, Wallet>(
            "SELECT * FROM wallets WHERE user_id = $1 AND name = $2",
        )
        .bind(user_id)
        .bind(PRIMARY_WALLET_NAME)
        .fetch_optional(&self.pool)
        .await?;

        Ok(wallet)
    }

    async fn list_wallet_addresses(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT address FROM wallets")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|(address,)| address).collect())
    }

    async fn overwrite_ledger_values(
        &self,
        address: &str,
        balance: Decimal,
        stake: Decimal,
    ) -> Result<()> {
        sqlx::query("UPDATE wallets SET balance = $1, stake = $2 WHERE address = $3")
            .bind(balance)
            .bind(stake)
            .bind(address)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn apply_mine_settlement(
        &self,
        wallet_id: Uuid,
        stake_amount: Decimal,
        reward: Decimal,
    ) -> Result<Wallet> {
        let mut tx = self.pool.begin().await?;

        let wallet =
            sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE id = $1 FOR UPDATE")
                .bind(wallet_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| WalletEngineError::WalletNotFound(wallet_id.to_string()))?;

        if wallet.balance < stake_amount {
            return Err(WalletEngineError::InsufficientFunds {
                required: stake_amount,
                available: wallet.balance,
            });
        }

        let updated = sqlx::query_as::<_, Wallet>(
            r#"
            UPDATE wallets
            SET stake = stake + $1,
                balance = balance - $1 + $2
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(stake_amount)
        .bind(reward)
        .bind(wallet_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(updated)
    }

    async fn transfer_between_wallets(
        &self,
        sender_wallet_id: Uuid,
        recipient_wallet_id: Uuid,
        amount: Decimal,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Lock both rows in id order so concurrent transfers cannot deadlock.
        let (first, second) = if sender_wallet_id < recipient_wallet_id {
            (sender_wallet_id, recipient_wallet_id)
        } else {
            (recipient_wallet_id, sender_wallet_id)
        };
        for id in [first, second] {
            sqlx::query("SELECT id FROM wallets WHERE id = $1 FOR UPDATE")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        let debited = sqlx::query(
            "UPDATE wallets SET balance = balance - $1 WHERE id = $2 AND balance >= $1",
        )
        .bind(amount)
        .bind(sender_wallet_id)
        .execute(&mut *tx)
        .await?;

        if debited.rows_affected() == 0 {
            let available: Option<(Decimal,)> =
                sqlx::query_as("SELECT balance FROM wallets WHERE id = $1")
                    .bind(sender_wallet_id)
                    .fetch_optional(&mut *tx)
                    .await?;

            return Err(WalletEngineError::InsufficientFunds {
                required: amount,
                available: available.map(|(b,)| b).unwrap_or(Decimal::ZERO),
            });
        }

        sqlx::query("UPDATE wallets SET balance = balance + $1 WHERE id = $2")
            .bind(amount)
            .bind(recipient_wallet_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

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
        let mut tx = self.pool.begin().await?;

        let debited = sqlx::query(
            "UPDATE wallets SET balance = balance - $1 WHERE id = $2 AND balance >= $1",
        )
        .bind(amount)
        .bind(sender_wallet_id)
        .execute(&mut *tx)
        .await?;

        if debited.rows_affected() == 0 {
            let available: Option<(Decimal,)> =
                sqlx::query_as("SELECT balance FROM wallets WHERE id = $1")
                    .bind(sender_wallet_id)
                    .fetch_optional(&mut *tx)
                    .await?;

            return Err(WalletEngineError::InsufficientFunds {
                required: amount,
                available: available.map(|(b,)| b).unwrap_or(Decimal::ZERO),
            });
        }

        let escrow = sqlx::query_as::<_, Escrow>(
            r#"
            INSERT INTO escrows
                (id, sender_id, sender_wallet_id, recipient_email, amount, code, status, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(sender_id)
        .bind(sender_wallet_id)
        .bind(recipient_email)
        .bind(amount)
        .bind(code)
        .bind(EscrowStatus::Pending.as_str())
        .bind(Utc::now())
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(escrow)
    }

    async fn get_escrow(&self, escrow_id: Uuid) -> Result<Option<Escrow>> {
        let escrow = sqlx::query_as::<_, Escrow>("SELECT * FROM escrows WHERE id = $1")
            .bind(escrow_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(escrow)
    }

    async fn list_expired_pending(&self, now: DateTime<Utc>) -> Result<Vec<Escrow>> {
        let escrows = sqlx::query_as::<_, Escrow>(
            "SELECT * FROM escrows WHERE status = $1 AND expires_at < $2",
        )
        .bind(EscrowStatus::Pending.as_str())
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(escrows)
    }

    async fn claim_escrow(&self, escrow_id: Uuid, recipient_wallet_id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let claimed: Option<(Decimal,)> = sqlx::query_as(
            r#"
            UPDATE escrows
            SET status = $1
            WHERE id = $2 AND status = $3
            RETURNING amount
            "#,
        )
        .bind(EscrowStatus::Claimed.as_str())
        .bind(escrow_id)
        .bind(EscrowStatus::Pending.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some((amount,)) = claimed else {
            return Ok(false);
        };

        sqlx::query("UPDATE wallets SET balance = balance + $1 WHERE id = $2")
            .bind(amount)
            .bind(recipient_wallet_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(true)
    }

    async fn revert_claim(
        &self,
        escrow_id: Uuid,
        recipient_wallet_id: Uuid,
        amount: Decimal,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE escrows
            SET status = $1
            WHERE id = $2 AND status = $3
            "#,
        )
        .bind(EscrowStatus::Pending.as_str())
        .bind(escrow_id)
        .bind(EscrowStatus::Claimed.as_str())
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE wallets SET balance = balance - $1 WHERE id = $2")
            .bind(amount)
            .bind(recipient_wallet_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }

    async fn expire_escrow(&self, escrow_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let expired: Option<(Uuid, Decimal)> = sqlx::query_as(
            r#"
            UPDATE escrows
            SET status = $1
            WHERE id = $2 AND status = $3 AND expires_at < $4
            RETURNING sender_wallet_id, amount
            "#,
        )
        .bind(EscrowStatus::Expired.as_str())
        .bind(escrow_id)
        .bind(EscrowStatus::Pending.as_str())
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((sender_wallet_id, amount)) = expired else {
            return Ok(false);
        };

        sqlx::query("UPDATE wallets SET balance = balance + $1 WHERE id = $2")
            .bind(amount)
            .bind(sender_wallet_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(true)
    }
}
