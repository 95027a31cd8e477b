use redirect_settlement::api::{self, AppState};
use redirect_settlement::config::AppConfig;
use redirect_settlement::database::ledger::SharedLedgerStore;
use redirect_settlement::database::memory::InMemoryLedgerStore;
use redirect_settlement::health::HealthChecker;
use redirect_settlement::logging::init_tracing;
use redirect_settlement::middleware::logging::{request_logging_middleware, UuidRequestId};
use redirect_settlement::payments::provider::PaymentProvider;
use redirect_settlement::payments::providers::StripeProvider;
use redirect_settlement::services::confirmation::ConfirmationHandler;
use redirect_settlement::services::payment_orchestrator::{
    PaymentIntentOrchestrator, PaymentPolicy,
};
use redirect_settlement::services::refund_reconciler::RefundReconciler;
use redirect_settlement::services::webhook_processor::WebhookProcessor;
use redirect_settlement::workers::settlement_repair::{
    SettlementRepairConfig, SettlementRepairWorker,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

async fn init_store(config: &AppConfig) -> anyhow::Result<SharedLedgerStore> {
    match &config.database {
        #[cfg(feature = "database")]
        Some(database) => {
            info!("📊 Initializing database connection pool...");
            let pool = redirect_settlement::database::pool::connect(database)
                .await
                .map_err(|e| {
                    error!("Failed to initialize database pool: {}", e);
                    e
                })?;
            info!(
                max_connections = pool.options().get_max_connections(),
                "✅ Database connection pool initialized"
            );
            Ok(Arc::new(redirect_settlement::database::PgLedgerStore::new(
                pool,
            )))
        }
        #[cfg(not(feature = "database"))]
        Some(_) => Err(anyhow::anyhow!(
            "DATABASE_URL is set but the binary was built without the `database` feature"
        )),
        None => {
            warn!("DATABASE_URL not set, using the in-memory ledger store");
            Ok(Arc::new(InMemoryLedgerStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let config = AppConfig::from_env()?;
    init_tracing(&config.logging);
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        "🚀 Starting redirect settlement service"
    );

    let store = init_store(&config).await?;

    let provider: Arc<dyn PaymentProvider> = Arc::new(StripeProvider::from_env().map_err(|e| {
        error!("❌ Failed to load Stripe configuration: {}", e);
        e
    })?);
    let policy = PaymentPolicy::from_env();
    info!(
        payment_method = %policy.payment_method,
        currencies = ?policy.accepted_currencies,
        "Payment policy loaded"
    );

    let orchestrator = Arc::new(PaymentIntentOrchestrator::new(
        provider.clone(),
        store.clone(),
        policy.clone(),
    ));
    let confirmation = Arc::new(ConfirmationHandler::new(provider.clone(), store.clone()));
    let reconciler = Arc::new(RefundReconciler::new(
        provider.clone(),
        store.clone(),
        policy.payment_method,
    ));
    let webhooks = Arc::new(WebhookProcessor::new(provider.clone(), vec![reconciler]));

    let (worker_shutdown_tx, worker_shutdown_rx) = watch::channel(false);
    let repair_worker = SettlementRepairWorker::new(store.clone(), SettlementRepairConfig::from_env());
    let repair_handle = tokio::spawn(repair_worker.run(worker_shutdown_rx));

    let state = AppState {
        orchestrator,
        confirmation,
        webhooks,
        redirect: Arc::new(config.redirect.clone()),
        health: HealthChecker::new(store),
    };

    let app = api::router(state).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
            .layer(TraceLayer::new_for_http())
            .layer(axum::middleware::from_fn(request_logging_middleware))
            .layer(PropagateRequestIdLayer::x_request_id()),
    );

    let addr: SocketAddr = config.server.bind_address().parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("❌ Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "✅ Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(worker_shutdown_tx.clone()))
        .await?;

    let _ = worker_shutdown_tx.send(true);
    if tokio::time::timeout(Duration::from_secs(5), repair_handle)
        .await
        .is_err()
    {
        error!("Timed out waiting for settlement repair worker shutdown");
    }

    info!("👋 Server shutdown complete");

    Ok(())
}
