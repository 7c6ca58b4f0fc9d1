use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::{
    errors::ApiError,
    extractors::AppJson,
    handlers::claims_user_id,
    middlewares::auth::{JwtClaims, JwtService},
    middlewares::csrf,
    models::user::{LoginRequest, RegisterRequest, UpdateProfileRequest, UserProfile},
    services::{auth_service::AuthService, AppState},
};

const REFRESH_COOKIE: &str = "refresh_token";

fn auth_service(state: &AppState) -> AuthService {
    let jwt_service = JwtService::new(&state.config.jwt_secret);
    AuthService::new(state.mongo.clone(), state.redis.clone(), jwt_service)
}

fn refresh_cookie(token: String) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE, token))
        .path("/api/v1/auth")
        .http_only(true)
        .same_site(SameSite::Strict)
        .max_age(time::Duration::days(30))
        .build()
}

/// GET /api/v1/auth/csrf-token - issue a double-submit CSRF token
pub async fn get_csrf_token() -> impl IntoResponse {
    let token = csrf::generate_csrf_token();
    let response = Json(json!({ "csrf_token": token })).into_response();
    csrf::set_csrf_cookie(response, &token)
}

/// POST /api/v1/auth/register - Register a new user
pub async fn register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    AppJson(req): AppJson<RegisterRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if let Err(e) = req.validate() {
        return Err((StatusCode::BAD_REQUEST, format!("Validation error: {}", e)));
    }

    tracing::info!("Registering new user: {}", req.email);

    match auth_service(&state).register(req).await {
        Ok(response) => {
            tracing::info!("User registered successfully");
            let jar = jar.add(refresh_cookie(response.refresh_token.clone()));
            Ok((StatusCode::CREATED, jar, Json(response)))
        }
        Err(e) => {
            tracing::warn!("Failed to register user: {}", e);
            Err((StatusCode::BAD_REQUEST, e.to_string()))
        }
    }
}

/// POST /api/v1/auth/login - Login with email and password
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if let Err(e) = req.validate() {
        return Err((StatusCode::BAD_REQUEST, format!("Validation error: {}", e)));
    }

    tracing::info!("Login attempt for user: {}", req.email);

    match auth_service(&state).login(req).await {
        Ok(response) => {
            let jar = jar.add(refresh_cookie(response.refresh_token.clone()));
            Ok((StatusCode::OK, jar, Json(response)))
        }
        Err(e) => {
            let msg = e.to_string();
            let status = if msg.contains("temporarily locked") {
                StatusCode::TOO_MANY_REQUESTS
            } else {
                StatusCode::UNAUTHORIZED
            };
            Err((status, msg))
        }
    }
}

/// POST /api/v1/auth/refresh - Exchange the refresh cookie for a new access token
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let token = jar
        .get(REFRESH_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .ok_or((
            StatusCode::UNAUTHORIZED,
            "Missing refresh token".to_string(),
        ))?;

    match auth_service(&state).refresh_token(&token).await {
        Ok(access_token) => Ok(Json(json!({ "access_token": access_token }))),
        Err(e) => {
            tracing::warn!("Refresh token rejected: {}", e);
            Err((StatusCode::UNAUTHORIZED, e.to_string()))
        }
    }
}

/// POST /api/v1/auth/logout - Revoke the refresh token
pub async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if let Some(cookie) = jar.get(REFRESH_COOKIE) {
        let token = cookie.value().to_string();
        if let Err(e) = auth_service(&state).logout(&token).await {
            tracing::warn!("Logout failed: {}", e);
        }
    }

    let jar = jar.remove(Cookie::build((REFRESH_COOKIE, "")).path("/api/v1/auth").build());
    Ok((StatusCode::OK, jar, Json(json!({ "ok": true }))))
}

/// GET /api/v1/auth/me - Current user profile
pub async fn get_current_user(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<Json<UserProfile>, (StatusCode, String)> {
    match auth_service(&state).get_user_by_id(&claims.sub).await {
        Ok(user) => Ok(Json(UserProfile::from(user))),
        Err(e) => Err((StatusCode::NOT_FOUND, e.to_string())),
    }
}

/// PATCH /api/v1/auth/profile - Update the display name
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()
        .map_err(|e| ApiError::bad_request(format!("Validation error: {}", e)))?;

    let user_id = claims_user_id(&claims)?;
    auth_service(&state)
        .update_profile_name(&user_id, req.full_name.trim())
        .await?;

    Ok(Json(json!({ "ok": true })))
}
