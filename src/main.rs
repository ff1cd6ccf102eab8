use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use wallet_engine::{
    auth::JwtAuth,
    config::Config,
    database::{Database, WalletStore},
    escrow::EscrowEngine,
    handlers,
    ledger::{ChainLedger, HttpLedgerClient},
    notifier::{LogNotifier, Notifier},
    reconciler::Reconciler,
    settlement::{SettlementEngine, SettlementOptions},
    wallet::WalletService,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false)
        .init();

    let config = Config::from_env().expect("Failed to load configuration");
    config.validate().expect("Invalid configuration");

    info!("Starting Wallet Engine on port {}", config.server.port);

    let db = Arc::new(
        Database::new(&config.database.url, config.database.max_connections)
            .await
            .expect("Failed to connect to database"),
    );
    db.run_migrations().await.expect("Failed to apply schema");
    let store: Arc<dyn WalletStore> = db;

    info!("Database connected successfully");

    let ledger: Arc<dyn ChainLedger> = Arc::new(
        HttpLedgerClient::new(
            config.chain.base_url.clone(),
            config.chain.request_timeout_secs,
        )
        .expect("Failed to build chain ledger client"),
    );

    info!("Chain ledger client initialized for {}", config.chain.base_url);

    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let reconciler = Arc::new(Reconciler::new(store.clone(), ledger.clone()));

    let settlement = Arc::new(SettlementEngine::new(
        store.clone(),
        ledger.clone(),
        reconciler.clone(),
        notifier.clone(),
        SettlementOptions {
            simulate_on_failure: config.mining.simulate_on_failure,
            simulated_reward: config.simulated_reward(),
            fallback_reward: config.fallback_reward(),
            escrow_lifetime_hours: config.escrow.lifetime_hours,
            escrow_code_length: config.escrow.code_length,
            claim_base_url: config.server.base_url.clone(),
        },
    ));

    let escrow_engine = Arc::new(EscrowEngine::new(
        store.clone(),
        ledger.clone(),
        notifier.clone(),
    ));

    let wallet_service = Arc::new(WalletService::new(
        store.clone(),
        ledger.clone(),
        reconciler.clone(),
    ));

    // Proactive expiry sweep alongside the lazy sweep on claim.
    let sweeper = escrow_engine.clone();
    let sweep_interval = config.escrow.sweep_interval_secs;
    tokio::spawn(async move {
        sweeper.start_sweep_loop(sweep_interval).await;
    });

    info!("Escrow sweep loop scheduled every {} seconds", sweep_interval);

    let server_config = config.server.clone();
    let jwt_secret = config.auth.jwt_secret.clone();

    let settlement_data = web::Data::new(settlement);
    let escrow_data = web::Data::new(escrow_engine);
    let wallet_data = web::Data::new(wallet_service);
    let reconciler_data = web::Data::new(reconciler);

    info!(
        "Starting HTTP server on {}:{}",
        server_config.host, server_config.port
    );

    HttpServer::new(move || {
        App::new()
            .app_data(settlement_data.clone())
            .app_data(escrow_data.clone())
            .app_data(wallet_data.clone())
            .app_data(reconciler_data.clone())
            .wrap(JwtAuth::new(jwt_secret.clone()))
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .wrap(middleware::Logger::default())
            .wrap(middleware::NormalizePath::trim())
            .configure(handlers::configure_routes)
    })
    .workers(server_config.workers)
    .bind((server_config.host, server_config.port))?
    .run()
    .await
}
