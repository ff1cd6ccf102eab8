use super::{ChainLedger, LedgerBalance, MineOutcome};
use crate::errors::{Result, WalletEngineError};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::error;

#[derive(Debug, Serialize)]
struct StakeRequest {
    amount: Decimal,
    address: String,
}

#[derive(Debug, Serialize)]
struct TransactionRequest {
    sender: String,
    receiver: String,
    amount: Decimal,
}

#[derive(Debug, Deserialize)]
struct TransactionResponse {
    #[serde(default)]
    tx_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct MineRequest {
    stake: Decimal,
    address: String,
}

pub struct HttpLedgerClient {
    base_url: String,
    client: Client,
}

impl HttpLedgerClient {
    pub fn new(base_url: String, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| {
                WalletEngineError::Internal(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(HttpLedgerClient { base_url, client })
    }

    async fn check_status(response: reqwest::Response, call: &str) -> Result<reqwest::Response> {
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(WalletEngineError::RemoteLedger(format!(
                "{} failed with status {}: {}",
                call, status, error_text
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl ChainLedger for HttpLedgerClient {
    async fn get_balance(&self, address: &str) -> Result<LedgerBalance> {
        let url = format!("{}/balance?address={}", self.base_url, address);

        let response = self.client.get(&url).send().await.map_err(|e| {
            error!("Balance query for {} failed: {}", address, e);
            WalletEngineError::RemoteLedger(format!("Balance request failed: {}", e))
        })?;

        let response = Self::check_status(response, "Balance query").await?;

        response.json::<LedgerBalance>().await.map_err(|e| {
            WalletEngineError::RemoteLedger(format!("Failed to parse balance response: {}", e))
        })
    }

    async fn register_stake(&self, address: &str, amount: Decimal) -> Result<()> {
        let request = StakeRequest {
            amount,
            address: address.to_string(),
        };
        let url = format!("{}/stake", self.base_url);

        let response = self.client.post(&url).json(&request).send().await.map_err(|e| {
            error!("Stake registration for {} failed: {}", address, e);
            WalletEngineError::RemoteLedger(format!("Stake request failed: {}", e))
        })?;

        Self::check_status(response, "Stake registration").await?;
        Ok(())
    }

    async fn submit_transaction(
        &self,
        sender: &str,
        receiver: &str,
        amount: Decimal,
    ) -> Result<String> {
        let request = TransactionRequest {
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            amount,
        };
        let url = format!("{}/transaction", self.base_url);

        let response = self.client.post(&url).json(&request).send().await.map_err(|e| {
            error!("Transaction {} -> {} failed: {}", sender, receiver, e);
            WalletEngineError::RemoteLedger(format!("Transaction request failed: {}", e))
        })?;

        let response = Self::check_status(response, "Transaction").await?;

        let body = response.json::<TransactionResponse>().await.map_err(|e| {
            WalletEngineError::RemoteLedger(format!("Failed to parse transaction response: {}", e))
        })?;

        // Some chain versions acknowledge without an id.
        Ok(body.tx_id.unwrap_or_else(|| "unconfirmed".to_string()))
    }

    async fn mine(&self, address: &str, stake: Decimal) -> Result<MineOutcome> {
        let request = MineRequest {
            stake,
            address: address.to_string(),
        };
        let url = format!("{}/mine", self.base_url);

        let response = self.client.post(&url).json(&request).send().await.map_err(|e| {
            error!("Mine call for {} failed: {}", address, e);
            WalletEngineError::RemoteLedger(format!("Mine request failed: {}", e))
        })?;

        let response = Self::check_status(response, "Mine").await?;

        response.json::<MineOutcome>().await.map_err(|e| {
            WalletEngineError::RemoteLedger(format!("Failed to parse mine response: {}", e))
        })
    }
}
