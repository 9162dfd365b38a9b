use citymate_chat_service::{
    config, db, error, logging,
    middleware::auth,
    routes,
    services::{profile_client::HttpProfileDirectory, rate_limit::RateGovernor},
    state::AppState,
    websocket::{pubsub, ConnectionRegistry},
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = Arc::new(config::Config::from_env()?);

    // Initialize DB pool and run migrations
    let db = db::init_pool(&cfg.database_url)
        .await
        .map_err(|e| error::AppError::StartServer(format!("db: {e}")))?;

    let redis = redis::Client::open(cfg.redis_url.as_str())
        .map_err(|e| error::AppError::StartServer(format!("redis: {e}")))?;

    auth::init_validation(&cfg.jwt_secret);

    let registry = ConnectionRegistry::new();
    let governor = Arc::new(RateGovernor::new(cfg.rate_limits.clone()));
    let profiles: Arc<dyn citymate_chat_service::services::profile_client::ProfileDirectory> =
        Arc::new(HttpProfileDirectory::new(&cfg.profile_service_url)?);

    let state = AppState {
        db,
        registry: registry.clone(),
        redis: redis.clone(),
        config: cfg.clone(),
        governor,
        profiles,
    };

    // Cross-instance fanout listener
    tokio::spawn(async move {
        if let Err(e) = pubsub::start_listener(redis, registry).await {
            tracing::error!(error = %e, "redis fanout listener failed");
        }
    });

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "starting citymate-chat-service");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| error::AppError::StartServer(format!("bind: {e}")))?;

    let app = routes::build_router(state);

    axum::serve(listener, app)
        .await
        .map_err(|e| error::AppError::StartServer(format!("serve: {e}")))?;

    Ok(())
}
