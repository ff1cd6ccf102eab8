use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WalletEngineError>;

#[derive(Error, Debug)]
pub enum WalletEngineError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authorization error: {0}")]
    Authorization(String),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    },

    #[error("Remote ledger error: {0}")]
    RemoteLedger(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    #[error("Escrow not found: {0}")]
    EscrowNotFound(uuid::Uuid),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for WalletEngineError {
    fn from(err: serde_json::Error) -> Self {
        WalletEngineError::Internal(format!("JSON serialization error: {}", err))
    }
}

impl ResponseError for WalletEngineError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        let error_message = self.to_string();

        HttpResponse::build(status_code).json(json!({
            "error": {
                "code": status_code.as_u16(),
                "message": error_message,
                "type": self.error_type()
            }
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            WalletEngineError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WalletEngineError::Validation(_) => StatusCode::BAD_REQUEST,
            WalletEngineError::Authorization(_) => StatusCode::FORBIDDEN,
            WalletEngineError::InsufficientFunds { .. } => StatusCode::BAD_REQUEST,
            WalletEngineError::RemoteLedger(_) => StatusCode::BAD_GATEWAY,
            WalletEngineError::Conflict(_) => StatusCode::CONFLICT,
            WalletEngineError::UserNotFound(_) => StatusCode::NOT_FOUND,
            WalletEngineError::WalletNotFound(_) => StatusCode::NOT_FOUND,
            WalletEngineError::EscrowNotFound(_) => StatusCode::NOT_FOUND,
            WalletEngineError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WalletEngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl WalletEngineError {
    fn error_type(&self) -> &str {
        match self {
            WalletEngineError::Database(_) => "database_error",
            WalletEngineError::Validation(_) => "validation_error",
            WalletEngineError::Authorization(_) => "authorization_error",
            WalletEngineError::InsufficientFunds { .. } => "insufficient_funds",
            WalletEngineError::RemoteLedger(_) => "remote_ledger_error",
            WalletEngineError::Conflict(_) => "conflict",
            WalletEngineError::UserNotFound(_) => "not_found",
            WalletEngineError::WalletNotFound(_) => "not_found",
            WalletEngineError::EscrowNotFound(_) => "not_found",
            WalletEngineError::Config(_) => "configuration_error",
            WalletEngineError::Internal(_) => "internal_error",
        }
    }
}
