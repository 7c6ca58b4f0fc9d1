use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use redis::aio::ConnectionManager;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::services::AppState;

/// A fixed rate window: at most `limit` hits per `window_seconds`,
/// counted under `key`. Limits can be raised per deployment through the
/// named environment variable.
struct Window {
    key: String,
    limit: u32,
    window_seconds: u64,
}

impl Window {
    fn per_user(user_id: &str) -> Self {
        Self {
            key: format!("ratelimit:user:{}", user_id),
            limit: env_limit("RATE_LIMIT_PER_USER", 100),
            window_seconds: 60,
        }
    }

    fn per_ip(ip: &str) -> Self {
        Self {
            key: format!("ratelimit:ip:{}", ip),
            limit: env_limit("RATE_LIMIT_PER_IP", 200),
            window_seconds: 60,
        }
    }

    /// 10 login attempts per 5 minutes per IP.
    fn login(ip: &str) -> Self {
        Self {
            key: format!("ratelimit:login:{}", ip),
            limit: env_limit("RATE_LIMIT_LOGIN_ATTEMPTS", 10),
            window_seconds: 300,
        }
    }

    /// 5 registrations per hour per IP.
    fn register(ip: &str) -> Self {
        Self {
            key: format!("ratelimit:register:{}", ip),
            limit: env_limit("RATE_LIMIT_REGISTER_ATTEMPTS", 5),
            window_seconds: 3600,
        }
    }

    async fn enforce(&self, redis: &ConnectionManager) -> Result<(), StatusCode> {
        match check_rate_limit(redis, &self.key, self.limit, self.window_seconds).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::warn!("Rate limit exceeded for {}", self.key);
                Err(StatusCode::TOO_MANY_REQUESTS)
            }
            Err(err) => {
                tracing::error!("Rate limit check failed: {}", err);
                Err(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

fn env_limit(name: &str, fallback: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(fallback)
}

fn rate_limit_disabled() -> bool {
    std::env::var("RATE_LIMIT_DISABLED").unwrap_or_default() == "1"
}

fn extract_client_ip_from(headers: &HeaderMap, extensions: &axum::http::Extensions) -> String {
    // Preferred order: X-Forwarded-For, X-Real-IP, ConnectInfo
    if let Some(value) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        // x-forwarded-for can be a comma separated list; take first
        return value.split(',').next().unwrap_or(value).trim().to_string();
    }

    if let Some(value) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        return value.trim().to_string();
    }

    if let Some(info) = extensions.get::<ConnectInfo<SocketAddr>>() {
        return info.0.ip().to_string();
    }

    "unknown".to_string()
}

/// Per-user and per-IP limiter applied to the quiz API.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if rate_limit_disabled() {
        return Ok(next.run(request).await);
    }

    if let Some(claims) = request.extensions().get::<super::auth::JwtClaims>() {
        Window::per_user(&claims.sub).enforce(&state.redis).await?;
    }

    let client_ip = extract_client_ip_from(request.headers(), request.extensions());
    Window::per_ip(&client_ip).enforce(&state.redis).await?;

    Ok(next.run(request).await)
}

pub async fn login_rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if rate_limit_disabled() {
        return Ok(next.run(request).await);
    }

    let client_ip = extract_client_ip_from(request.headers(), request.extensions());
    Window::login(&client_ip).enforce(&state.redis).await?;

    Ok(next.run(request).await)
}

pub async fn register_rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if rate_limit_disabled() {
        return Ok(next.run(request).await);
    }

    let client_ip = extract_client_ip_from(request.headers(), request.extensions());
    Window::register(&client_ip).enforce(&state.redis).await?;

    Ok(next.run(request).await)
}

/// Atomic check-and-increment so two concurrent requests cannot both
/// sneak under the limit.
async fn check_rate_limit(
    redis: &ConnectionManager,
    key: &str,
    limit: u32,
    window_seconds: u64,
) -> anyhow::Result<bool> {
    let mut conn = redis.clone();

    let lua_script = r#"
        local key = KEYS[1]
        local limit = tonumber(ARGV[1])
        local window = tonumber(ARGV[2])

        local current = redis.call('GET', key)

        if current == false then
            redis.call('SET', key, 1, 'EX', window)
            return 1
        end

        current = tonumber(current)

        if current >= limit then
            return 0
        end

        redis.call('INCR', key)
        return 1
    "#;

    let allowed: u32 = redis::Script::new(lua_script)
        .key(key)
        .arg(limit)
        .arg(window_seconds)
        .invoke_async(&mut conn)
        .await?;

    Ok(allowed == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ConnectInfo;
    use axum::http::HeaderMap;
    use std::net::SocketAddr;

    #[test]
    fn forwarded_for_takes_the_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "1.2.3.4, 10.0.0.1".parse().unwrap());
        let exts = axum::http::Extensions::new();
        assert_eq!(extract_client_ip_from(&headers, &exts), "1.2.3.4");
    }

    #[test]
    fn real_ip_is_second_choice() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "9.9.9.9".parse().unwrap());
        let exts = axum::http::Extensions::new();
        assert_eq!(extract_client_ip_from(&headers, &exts), "9.9.9.9");
    }

    #[test]
    fn connect_info_is_the_fallback() {
        let headers = HeaderMap::new();
        let mut exts = axum::http::Extensions::new();
        exts.insert(ConnectInfo::<SocketAddr>("7.7.7.7:1234".parse().unwrap()));
        assert_eq!(extract_client_ip_from(&headers, &exts), "7.7.7.7");
    }

    #[test]
    fn env_limit_falls_back_when_unset() {
        assert_eq!(env_limit("RATE_LIMIT_TEST_UNSET_KEY", 42), 42);
    }
}
