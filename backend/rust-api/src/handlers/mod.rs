use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose, Engine as _};
use mongodb::bson::oid::ObjectId;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::ApiError;
use crate::metrics;
use crate::middlewares::auth::JwtClaims;
use crate::services::AppState;

const MONGO_PING_TIMEOUT: Duration = Duration::from_secs(1);
const REDIS_PING_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Serialize)]
struct DependencyHealth {
    status: &'static str,
    detail: String,
}

impl DependencyHealth {
    fn healthy(detail: &str) -> Self {
        Self {
            status: "healthy",
            detail: detail.to_string(),
        }
    }

    fn unhealthy(detail: String) -> Self {
        Self {
            status: "unhealthy",
            detail,
        }
    }

    fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// GET /health - liveness plus a ping of both stores.
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mongo = check_mongodb(&state).await;
    let redis = check_redis(&state).await;

    let all_healthy = mongo.is_healthy() && redis.is_healthy();
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(json!({
            "status": if all_healthy { "healthy" } else { "degraded" },
            "service": "quizbank-api",
            "version": env!("CARGO_PKG_VERSION"),
            "dependencies": {
                "mongodb": mongo,
                "redis": redis,
            }
        })),
    )
}

async fn check_mongodb(state: &AppState) -> DependencyHealth {
    let ping = state.mongo.run_command(mongodb::bson::doc! { "ping": 1 });
    match tokio::time::timeout(MONGO_PING_TIMEOUT, ping).await {
        Ok(Ok(_)) => DependencyHealth::healthy("MongoDB connection successful"),
        Ok(Err(err)) => DependencyHealth::unhealthy(format!("MongoDB error: {}", err)),
        Err(_) => DependencyHealth::unhealthy("MongoDB ping timed out".to_string()),
    }
}

async fn check_redis(state: &AppState) -> DependencyHealth {
    let mut conn = state.redis.clone();
    let ping = redis::cmd("PING").query_async::<String>(&mut conn);
    match tokio::time::timeout(REDIS_PING_TIMEOUT, ping).await {
        Ok(Ok(_)) => DependencyHealth::healthy("Redis connection successful"),
        Ok(Err(err)) => DependencyHealth::unhealthy(format!("Redis error: {}", err)),
        Err(_) => DependencyHealth::unhealthy("Redis ping timed out".to_string()),
    }
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(text) => (StatusCode::OK, text),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", err),
        ),
    }
}

/// HTTP Basic auth in front of /metrics; credentials come from the
/// METRICS_AUTH environment variable as username:password.
pub async fn metrics_auth_middleware(
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(decode_basic_credentials)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let expected = std::env::var("METRICS_AUTH").unwrap_or_else(|_| "admin:changeme".to_string());
    if presented != expected {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}

fn decode_basic_credentials(auth_header: &str) -> Option<String> {
    let encoded = auth_header.strip_prefix("Basic ")?;
    let decoded = general_purpose::STANDARD.decode(encoded).ok()?;
    String::from_utf8(decoded).ok()
}

/// The authenticated user's ObjectId, parsed from JWT claims.
pub(crate) fn claims_user_id(claims: &JwtClaims) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(&claims.sub)
        .map_err(|_| ApiError::permission_denied("Invalid user identity"))
}

pub(crate) fn parse_path_id(value: &str, what: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(value).map_err(|_| ApiError::bad_request(format!("Invalid {} id", what)))
}

pub mod admin;
pub mod auth;
pub mod quiz;
pub mod stats;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_credentials_decode() {
        // base64("admin:changeme")
        assert_eq!(
            decode_basic_credentials("Basic YWRtaW46Y2hhbmdlbWU="),
            Some("admin:changeme".to_string())
        );
        assert_eq!(decode_basic_credentials("Bearer token"), None);
        assert_eq!(decode_basic_credentials("Basic !!!"), None);
    }

    #[test]
    fn path_ids_are_validated() {
        assert!(parse_path_id("68b3c1f2a9d04e5f6a7b8c9d", "subject").is_ok());
        assert!(parse_path_id("not-an-id", "subject").is_err());
    }
}
