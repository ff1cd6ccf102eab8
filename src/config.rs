use config::{ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub chain: ChainConfig,
    pub auth: AuthConfig,
    pub escrow: EscrowConfig,
    pub mining: MiningConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    /// Public base URL used when building escrow claim links.
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChainConfig {
    /// Base URL of the authoritative chain ledger service.
    pub base_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EscrowConfig {
    pub lifetime_hours: i64,
    pub code_length: usize,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MiningConfig {
    /// When the chain is unreachable, settle with a simulated reward instead
    /// of failing the request.
    pub simulate_on_failure: bool,
    pub simulated_reward: String,
    /// Used when the chain response omits the reward field.
    pub fallback_reward: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8090)?
            .set_default("server.workers", 4)?
            .set_default("server.base_url", "http://localhost:8090")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("chain.base_url", "http://localhost:8080")?
            .set_default("chain.request_timeout_secs", 30)?
            .set_default("auth.jwt_secret", "change-me")?
            .set_default("escrow.lifetime_hours", 72)?
            .set_default("escrow.code_length", 6)?
            .set_default("escrow.sweep_interval_secs", 3600)?
            .set_default("mining.simulate_on_failure", false)?
            .set_default("mining.simulated_reward", "5")?
            .set_default("mining.fallback_reward", "5")?;

        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(File::with_name(&config_file).required(false));
        } else {
            builder = builder
                .add_source(File::with_name(&format!("config/{}", environment)).required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix("WALLET_ENGINE")
                .separator("__")
                .list_separator(","),
        );

        if let Ok(db_url) = env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", db_url)?;
        }

        if let Ok(chain_url) = env::var("CHAIN_API") {
            builder = builder.set_override("chain.base_url", chain_url)?;
        }

        if let Ok(port) = env::var("WALLET_ENGINE_PORT") {
            builder = builder.set_override("server.port", port)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }

        if self.database.url.is_empty() {
            return Err("Database URL is required".to_string());
        }

        if self.chain.base_url.is_empty() {
            return Err("Chain ledger base URL is required".to_string());
        }

        if self.escrow.lifetime_hours <= 0 {
            return Err("Escrow lifetime must be positive".to_string());
        }

        if self.escrow.code_length == 0 || self.escrow.code_length > 16 {
            return Err("Escrow code length must be between 1 and 16".to_string());
        }

        if Decimal::from_str(&self.mining.simulated_reward).is_err() {
            return Err("Simulated mining reward must be a decimal".to_string());
        }

        if Decimal::from_str(&self.mining.fallback_reward).is_err() {
            return Err("Fallback mining reward must be a decimal".to_string());
        }

        Ok(())
    }

    pub fn simulated_reward(&self) -> Decimal {
        Decimal::from_str(&self.mining.simulated_reward).unwrap_or_else(|_| Decimal::from(5))
    }

    pub fn fallback_reward(&self) -> Decimal {
        Decimal::from_str(&self.mining.fallback_reward).unwrap_or_else(|_| Decimal::from(5))
    }
}
