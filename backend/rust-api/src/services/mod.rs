use mongodb::{Client as MongoClient, Database};
use redis::aio::ConnectionManager;
use std::time::Duration;

use crate::config::Config;

const REDIS_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REDIS_PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared handles every request borrows: config plus the Mongo database
/// and a cloneable Redis connection manager.
pub struct AppState {
    pub config: Config,
    pub mongo: Database,
    pub redis: ConnectionManager,
}

impl AppState {
    pub async fn new(
        config: Config,
        mongo_client: MongoClient,
        redis_client: redis::Client,
    ) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.mongo_database);

        let redis = tokio::time::timeout(
            REDIS_CONNECT_TIMEOUT,
            ConnectionManager::new(redis_client),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timed out"))??;

        // Fail fast on a dead Redis instead of at the first rate-limit check.
        let mut conn = redis.clone();
        tokio::time::timeout(
            REDIS_PING_TIMEOUT,
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis PING timed out"))??;
        tracing::info!("Redis connection established");

        Ok(Self {
            config,
            mongo,
            redis,
        })
    }
}

pub mod auth_service;
pub mod catalog_service;
pub mod enrollment_service;
pub mod selection;
pub mod session_service;
pub mod stats_service;
