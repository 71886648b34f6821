// /saree-store/services/order-service/src/main.rs

mod api;
mod config;
mod core;
mod middleware;
mod models;
mod repository;
mod utils;

use std::{sync::Arc, time::Duration};

use axum::{middleware as axum_middleware, Router};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    api::routes,
    config::{AppConfig, StoreBackend},
    core::{
        secrets::SecretStore,
        services::{CheckoutService, OrderLifecycle, PaymentService},
    },
    middleware::auth::{auth_middleware, TokenVerifier},
    repository::{memory::MemoryStore, OrderStore, Repository},
    utils::error::{AppError, AppResult},
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn OrderStore>,
    pub config: Arc<AppConfig>,
    pub auth: Arc<TokenVerifier>,
    pub checkout: Arc<CheckoutService>,
    pub lifecycle: Arc<OrderLifecycle>,
    pub payments: Arc<PaymentService>,
}

impl AppState {
    /// Wire services di atas satu store
    pub fn new(store: Arc<dyn OrderStore>, config: AppConfig) -> AppResult<Self> {
        let config = Arc::new(config);
        let secrets = Arc::new(SecretStore::from_base64(&config.secrets_master_key)?);
        let payments = Arc::new(PaymentService::new(store.clone(), secrets, &config)?);

        Ok(Self {
            auth: Arc::new(TokenVerifier::new(&config.jwt)),
            checkout: Arc::new(CheckoutService::new(store.clone(), payments.clone(), config.clone())),
            lifecycle: Arc::new(OrderLifecycle::new(store.clone(), config.clone())),
            payments,
            store,
            config,
        })
    }
}

/// Router lengkap dengan middleware stack
pub fn build_router(state: AppState) -> Router {
    let cors = utils::cors::create_cors_layer(&state.config);

    Router::new()
        .merge(routes::create_routes())
        .layer(axum_middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::security::security_headers_middleware,
        ))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                // Request tracing (paling luar)
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(30)))
                .layer(cors),
        )
}

async fn connect_store(config: &AppConfig) -> AppResult<Arc<dyn OrderStore>> {
    match config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("STORE_BACKEND=memory: data hilang saat restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or_else(|| AppError::Configuration("DATABASE_URL harus di-set".to_string()))?;

            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .acquire_timeout(config.database_acquire_timeout)
                .connect(database_url)
                .await?;

            if config.run_migrations {
                sqlx::migrate!("./migrations")
                    .run(&pool)
                    .await
                    .map_err(|e| AppError::Database(format!("Migration failed: {}", e)))?;
                info!("Database migrations applied");
            }

            let repository = Repository::new(pool);
            repository.ping().await?;
            info!("Database berhasil terkoneksi");

            Ok(Arc::new(repository))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    utils::logger::init_logger();

    let config = AppConfig::from_env()?;
    let store = connect_store(&config).await?;
    let bind_address = format!("0.0.0.0:{}", config.port);
    let environment = config.environment.clone();

    let state = AppState::new(store, config)?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Order service berjalan di {} ({})", bind_address, environment);

    axum::serve(listener, app).await.map_err(|e| e.into())
}
