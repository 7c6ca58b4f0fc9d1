#![allow(dead_code)]

use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod errors;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::AppState;

/// CSP middleware adds Content-Security-Policy header to all responses
async fn csp_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(
            "default-src 'self'; \
             script-src 'self' 'unsafe-inline'; \
             style-src 'self' 'unsafe-inline'; \
             img-src 'self' data: https:; \
             connect-src 'self'",
        ),
    );
    response
}

pub fn create_router(app_state: std::sync::Arc<services::AppState>) -> Router {
    // CORS configuration for the stats endpoints consumed by dashboards
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any); // TODO: restrict to specific origins in production

    Router::new()
        // Public endpoints (no auth required)
        .route("/health", get(handlers::health_check))
        // Metrics endpoint with Basic Auth protection
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        // Auth endpoints (mixed: some public, some protected)
        .nest("/api/v1/auth", auth_routes(app_state.clone()))
        // Quiz engine (require JWT)
        .nest(
            "/api/v1/quiz",
            quiz_routes()
                .layer(middleware::from_fn(middlewares::csrf::csrf_middleware))
                .layer(middleware::from_fn_with_state(
                    app_state.clone(),
                    middlewares::rate_limit::rate_limit_middleware,
                ))
                .layer(middleware::from_fn_with_state(
                    app_state.clone(),
                    middlewares::auth::auth_middleware,
                )),
        )
        .nest(
            "/api/v1/stats",
            stats_routes()
                .layer(cors)
                .layer(middleware::from_fn_with_state(
                    app_state.clone(),
                    middlewares::auth::auth_middleware,
                )),
        )
        .nest(
            "/admin",
            admin_routes()
                .layer(middleware::from_fn(middlewares::csrf::csrf_middleware))
                .layer(middleware::from_fn_with_state(
                    app_state.clone(),
                    middlewares::auth::auth_middleware,
                )),
        )
        .with_state(app_state)
        .layer(middleware::from_fn(csp_middleware)) // Apply CSP to all responses
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn quiz_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        // Catalog listings (enrollment-filtered)
        .route("/subjects", get(handlers::quiz::list_subjects))
        .route("/subjects/{id}/sources", get(handlers::quiz::list_sources))
        .route("/sources/{id}/modules", get(handlers::quiz::list_modules))
        .route(
            "/modules/{id}/overview",
            get(handlers::quiz::module_overview),
        )
        // Session lifecycle
        .route("/sessions", post(handlers::quiz::create_session))
        .route("/sessions/{id}", get(handlers::quiz::get_session))
        .route("/sessions/{id}/answers", post(handlers::quiz::save_answer))
        .route(
            "/sessions/{id}/submit",
            post(handlers::quiz::submit_session),
        )
        .route(
            "/sessions/{id}/result",
            get(handlers::quiz::session_result),
        )
}

fn stats_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        .route("/dashboard", get(handlers::stats::dashboard))
        .route("/me", get(handlers::stats::user_stats))
        .route("/analytics", get(handlers::stats::analytics))
        .route("/history", get(handlers::stats::history))
        .route("/profile", get(handlers::stats::profile))
        .route("/leaderboard", get(handlers::stats::leaderboard))
}

fn admin_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        // Content management
        .route(
            "/subjects",
            get(handlers::admin::list_subjects),
        )
        .route("/subjects/{id}", patch(handlers::admin::update_subject))
        .route(
            "/catalog/{kind}/{id}",
            delete(handlers::admin::delete_entity),
        )
        .route("/modules", get(handlers::admin::list_modules))
        .route(
            "/modules/{id}/questions",
            get(handlers::admin::questions_by_module),
        )
        .route(
            "/questions/{id}",
            patch(handlers::admin::update_question).delete(handlers::admin::delete_question),
        )
        .route("/import", post(handlers::admin::import_questions))
        // Enrollment management
        .route("/students", get(handlers::admin::list_students))
        .route(
            "/students/{id}/enrollments",
            get(handlers::admin::student_enrollments),
        )
        .route("/enrollments", post(handlers::admin::toggle_enrollment))
        .route_layer(middleware::from_fn(
            middlewares::auth::admin_guard_middleware,
        ))
}

fn auth_routes(
    app_state: std::sync::Arc<services::AppState>,
) -> Router<std::sync::Arc<services::AppState>> {
    // Public routes with rate limiting
    let register_route = Router::new()
        .route("/register", post(handlers::auth::register))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::rate_limit::register_rate_limit_middleware,
        ));

    let login_route = Router::new()
        .route("/login", post(handlers::auth::login))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::rate_limit::login_rate_limit_middleware,
        ));

    let refresh_route = Router::new().route("/refresh", post(handlers::auth::refresh_token));

    // CSRF token endpoint (public, no auth required)
    let csrf_route = Router::new().route("/csrf-token", get(handlers::auth::get_csrf_token));

    let public_routes = register_route
        .merge(login_route)
        .merge(refresh_route)
        .merge(csrf_route);

    // Protected routes (require JWT auth + CSRF protection)
    let protected_routes = Router::new()
        .route("/me", get(handlers::auth::get_current_user))
        .route("/logout", post(handlers::auth::logout))
        .route("/profile", patch(handlers::auth::update_profile))
        .route_layer(middleware::from_fn(middlewares::csrf::csrf_middleware))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::auth::auth_middleware,
        ));

    public_routes.merge(protected_routes)
}
