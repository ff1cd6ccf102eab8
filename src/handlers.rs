use crate::auth::Claims;
use crate::errors::WalletEngineError;
use crate::escrow::EscrowEngine;
use crate::metrics;
use crate::models::{ClaimRequest, CreateWalletRequest, MineRequest, SendRequest, WalletResponse};
use crate::reconciler::Reconciler;
use crate::settlement::SettlementEngine;
use crate::wallet::WalletService;
use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Health check endpoint
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "wallet-engine",
        "version": "1.0.0"
    }))
}

/// Prometheus metrics endpoint
pub async fn metrics_endpoint() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics::render())
}

fn caller_id(req: &HttpRequest) -> Result<Uuid, WalletEngineError> {
    let claims = req.extensions().get::<Claims>().cloned().ok_or_else(|| {
        WalletEngineError::Authorization("Missing authenticated identity".to_string())
    })?;

    Uuid::parse_str(&claims.sub)
        .map_err(|_| WalletEngineError::Authorization("Invalid subject claim".to_string()))
}

fn validate<T: validator::Validate>(request: &T) -> Result<(), WalletEngineError> {
    request
        .validate()
        .map_err(|e| WalletEngineError::Validation(e.to_string()))
}

/// Create and register a wallet
pub async fn create_wallet(
    service: web::Data<Arc<WalletService>>,
    request: web::Json<CreateWalletRequest>,
) -> Result<HttpResponse, WalletEngineError> {
    validate(&*request)?;
    let request = request.into_inner();
    let wallet = service.create_wallet(&request.email, request.name).await?;

    Ok(HttpResponse::Created().json(json!({
        "message": "Wallet created",
        "wallet": WalletResponse::from(wallet)
    })))
}

/// Balance query (refreshes from the chain first)
pub async fn get_balance(
    service: web::Data<Arc<WalletService>>,
    address: web::Path<String>,
) -> Result<HttpResponse, WalletEngineError> {
    let wallet = service.balance(&address).await?;
    Ok(HttpResponse::Ok().json(WalletResponse::from(wallet)))
}

/// Peer transfer (direct settlement or escrow)
pub async fn send(
    engine: web::Data<Arc<SettlementEngine>>,
    req: HttpRequest,
    request: web::Json<SendRequest>,
) -> Result<HttpResponse, WalletEngineError> {
    validate(&*request)?;
    let caller = caller_id(&req)?;
    let request = request.into_inner();

    let outcome = engine
        .send(
            caller,
            &request.sender_email,
            &request.recipient_email,
            request.amount,
        )
        .await?;

    Ok(HttpResponse::Ok().json(outcome))
}

/// Stake-based mining settlement
pub async fn mine(
    engine: web::Data<Arc<SettlementEngine>>,
    req: HttpRequest,
    request: web::Json<MineRequest>,
) -> Result<HttpResponse, WalletEngineError> {
    validate(&*request)?;
    let caller = caller_id(&req)?;
    let request = request.into_inner();

    let settlement = engine
        .mine(caller, &request.wallet_address, request.stake)
        .await?;

    Ok(HttpResponse::Ok().json(settlement))
}

/// Escrow claim (unauthenticated; gated by the one-time code)
pub async fn claim_escrow(
    engine: web::Data<Arc<EscrowEngine>>,
    escrow_id: web::Path<Uuid>,
    request: web::Json<ClaimRequest>,
) -> Result<HttpResponse, WalletEngineError> {
    validate(&*request)?;
    let request = request.into_inner();

    let settlement = engine
        .claim(*escrow_id, &request.code, &request.email)
        .await?;

    Ok(HttpResponse::Ok().json(settlement))
}

/// Expire and refund all overdue escrows
pub async fn sweep_escrows(
    engine: web::Data<Arc<EscrowEngine>>,
    req: HttpRequest,
) -> Result<HttpResponse, WalletEngineError> {
    caller_id(&req)?;
    let report = engine.sweep_expired().await?;
    Ok(HttpResponse::Ok().json(report))
}

/// Reconcile every known wallet against the chain
pub async fn sync_all(
    reconciler: web::Data<Arc<Reconciler>>,
    req: HttpRequest,
) -> Result<HttpResponse, WalletEngineError> {
    caller_id(&req)?;
    let report = reconciler.reconcile_all().await?;
    Ok(HttpResponse::Ok().json(report))
}

/// Configure routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/wallets", web::post().to(create_wallet))
            .route("/wallets/{address}/balance", web::get().to(get_balance))
            .route("/transactions/send", web::post().to(send))
            .route("/mining/mine", web::post().to(mine))
            .route("/escrows/{id}/claim", web::post().to(claim_escrow))
            .route("/escrows/sweep", web::post().to(sweep_escrows))
            .route("/reconciliation/sync-all", web::post().to(sync_all)),
    );
    cfg.route("/health", web::get().to(health_check));
    cfg.route("/metrics", web::get().to(metrics_endpoint));
}
