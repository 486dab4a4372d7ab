pub mod config;
pub mod database;
pub mod redis_client;
pub mod error;
pub mod models;
pub mod controllers;
pub mod middleware;
pub mod cache;
pub mod services;
pub mod search_client;

use anyhow::Context;
use std::sync::Arc;
use tracing::info;

use services::{auth::TokenService, orders::PgOrderRepository, BookingEngine};

// Shared state для всего приложения
#[derive(Clone)]
pub struct AppState {
    pub db: database::Database,
    pub cache: cache::CacheService,
    pub config: config::Config,
    pub search_client: search_client::SearchClient,
    pub orders: PgOrderRepository,
    pub engine: BookingEngine,
    pub tokens: TokenService,
}

impl AppState {
    pub async fn new(config: config::Config) -> anyhow::Result<Arc<Self>> {
        // Connect to the database
        let db = database::Database::connect(&config.database.url, config.database.pool_size)
            .await
            .context("failed to connect to database")?;
        info!("Database connected");

        db.run_migrations().await.context("failed to run migrations")?;

        // Connect to Redis
        let redis = redis_client::RedisClient::connect(&config.redis.url)
            .await
            .context("failed to connect to Redis")?;
        info!("Redis connected");

        let cache = cache::CacheService::new(redis, config.redis.cache_ttl_seconds);
        let search_client = search_client::SearchClient::new(db.pool.clone());
        let orders = PgOrderRepository::new(db.pool.clone());

        // Движок должен знать все залы, сеансы и билеты до первого запроса
        let engine = BookingEngine::new(Arc::new(orders.clone()));
        engine
            .warmup(&db, &orders)
            .await
            .context("failed to warm up booking engine")?;

        let tokens = TokenService::from_config(&config.jwt);

        Ok(Arc::new(Self {
            db,
            cache,
            config,
            search_client,
            orders,
            engine,
            tokens,
        }))
    }
}
