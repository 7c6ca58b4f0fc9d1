use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    errors::ApiError,
    extractors::AppJson,
    handlers::{claims_user_id, parse_path_id},
    middlewares::auth::JwtClaims,
    models::{
        CreateSessionRequest, ModuleOverview, ModuleSummary, SaveAnswerRequest, SessionResultView,
        SessionView, SourceSummary, SubjectSummary, SubmitSessionRequest,
    },
    services::{catalog_service::CatalogService, session_service::SessionService, AppState},
};

/// GET /api/v1/quiz/subjects - subjects the student is enrolled in
pub async fn list_subjects(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<Json<Vec<SubjectSummary>>, ApiError> {
    let user_id = claims_user_id(&claims)?;
    let subjects = CatalogService::new(&state)
        .list_subjects_for_student(&user_id)
        .await?;
    Ok(Json(subjects))
}

/// GET /api/v1/quiz/subjects/{id}/sources
pub async fn list_sources(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(subject_id): Path<String>,
) -> Result<Json<Vec<SourceSummary>>, ApiError> {
    let user_id = claims_user_id(&claims)?;
    let subject_id = parse_path_id(&subject_id, "subject")?;

    // Sources are only listed inside subjects the student can see.
    let enrollment =
        crate::services::enrollment_service::EnrollmentService::new(state.mongo.clone());
    if !enrollment.is_enrolled(&user_id, &subject_id).await? {
        return Err(ApiError::permission_denied(
            "You are not enrolled in this subject",
        ));
    }

    let sources = CatalogService::new(&state).list_sources(&subject_id).await?;
    Ok(Json(sources))
}

/// GET /api/v1/quiz/sources/{id}/modules
pub async fn list_modules(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(source_id): Path<String>,
) -> Result<Json<Vec<ModuleSummary>>, ApiError> {
    let user_id = claims_user_id(&claims)?;
    let source_id = parse_path_id(&source_id, "source")?;

    let catalog = CatalogService::new(&state);
    let subject_id = catalog
        .subject_id_of_source(&source_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Source not found"))?;

    let enrollment =
        crate::services::enrollment_service::EnrollmentService::new(state.mongo.clone());
    if !enrollment.is_enrolled(&user_id, &subject_id).await? {
        return Err(ApiError::permission_denied(
            "You are not enrolled in this subject",
        ));
    }

    let modules = catalog.list_modules(&source_id).await?;
    Ok(Json(modules))
}

/// GET /api/v1/quiz/modules/{id}/overview - landing card before starting
pub async fn module_overview(
    State(state): State<Arc<AppState>>,
    Path(module_id): Path<String>,
) -> Result<Json<ModuleOverview>, ApiError> {
    let module_id = parse_path_id(&module_id, "module")?;
    let overview = CatalogService::new(&state).module_overview(&module_id).await?;
    Ok(Json(overview))
}

/// POST /api/v1/quiz/sessions - build a new quiz session
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims_user_id(&claims)?;

    tracing::info!(
        "Creating session for user {}: subject={:?}, modules={:?}, count={}, mode={}",
        claims.sub,
        req.subject_id,
        req.module_ids.as_ref().map(|m| m.len()).unwrap_or(0),
        req.count,
        req.mode.as_str()
    );

    let response = SessionService::new(&state)
        .create_session(&user_id, &req)
        .await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/v1/quiz/sessions/{id} - resume an in-progress session
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let user_id = claims_user_id(&claims)?;
    let session_id = parse_path_id(&session_id, "session")?;

    let view = SessionService::new(&state)
        .get_session(&user_id, &session_id)
        .await?;
    Ok(Json(view))
}

/// POST /api/v1/quiz/sessions/{id}/answers - autosave one pick
pub async fn save_answer(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(session_id): Path<String>,
    AppJson(req): AppJson<SaveAnswerRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = claims_user_id(&claims)?;
    let session_id = parse_path_id(&session_id, "session")?;

    SessionService::new(&state)
        .save_answer(&user_id, &session_id, &req)
        .await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// POST /api/v1/quiz/sessions/{id}/submit - grade the session
pub async fn submit_session(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(session_id): Path<String>,
    AppJson(req): AppJson<SubmitSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims_user_id(&claims)?;
    let session_id = parse_path_id(&session_id, "session")?;

    tracing::info!(
        "Submitting session {} for user {} ({} answers)",
        session_id.to_hex(),
        claims.sub,
        req.answers.len()
    );

    let response = SessionService::new(&state)
        .submit_session(&user_id, &session_id, &req)
        .await?;
    Ok(Json(response))
}

/// GET /api/v1/quiz/sessions/{id}/result - review a completed session
pub async fn session_result(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionResultView>, ApiError> {
    let user_id = claims_user_id(&claims)?;
    let session_id = parse_path_id(&session_id, "session")?;

    let result = SessionService::new(&state)
        .session_result(&user_id, &session_id)
        .await?;
    Ok(Json(result))
}
