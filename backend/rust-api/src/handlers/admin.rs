use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use futures::TryStreamExt;
use mongodb::bson::doc;
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::{
    errors::ApiError,
    extractors::AppJson,
    handlers::parse_path_id,
    models::{
        catalog::ImportSubject, user::User, CatalogEntity, EnrollmentToggleRequest,
        ModuleAdminView, QuestionAdminView, QuestionUpdateRequest, StudentSummary,
        SubjectSummary, SubjectUpdateRequest,
    },
    services::{
        catalog_service::CatalogService, enrollment_service::EnrollmentService, AppState,
    },
};

// ---------------------------------------------------------------------------
// Subjects
// ---------------------------------------------------------------------------

/// GET /admin/subjects - full subject list with thresholds
pub async fn list_subjects(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SubjectSummary>>, ApiError> {
    let subjects = CatalogService::new(&state).list_subjects_admin().await?;
    Ok(Json(subjects))
}

/// PATCH /admin/subjects/{id} - rename or retune the mastery threshold
pub async fn update_subject(
    State(state): State<Arc<AppState>>,
    Path(subject_id): Path<String>,
    AppJson(req): AppJson<SubjectUpdateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    req.validate()
        .map_err(|e| ApiError::bad_request(format!("Validation error: {}", e)))?;

    let subject_id = parse_path_id(&subject_id, "subject")?;
    CatalogService::new(&state)
        .update_subject(&subject_id, &req)
        .await?;
    Ok(Json(json!({ "ok": true })))
}

/// DELETE /admin/catalog/{kind}/{id} - cascading delete of a catalog node
pub async fn delete_entity(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let kind = match kind.as_str() {
        "subject" => CatalogEntity::Subject,
        "source" => CatalogEntity::Source,
        "module" => CatalogEntity::Module,
        other => {
            return Err(ApiError::bad_request(format!(
                "Unknown catalog entity: {}",
                other
            )))
        }
    };
    let id = parse_path_id(&id, kind.as_str())?;

    CatalogService::new(&state).delete_entity(kind, &id).await?;
    Ok(Json(json!({ "ok": true })))
}

// ---------------------------------------------------------------------------
// Modules & questions
// ---------------------------------------------------------------------------

/// GET /admin/modules - all modules with their subject chain
pub async fn list_modules(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ModuleAdminView>>, ApiError> {
    let modules = CatalogService::new(&state).list_modules_admin().await?;
    Ok(Json(modules))
}

/// GET /admin/modules/{id}/questions - questions with bank numbers
pub async fn questions_by_module(
    State(state): State<Arc<AppState>>,
    Path(module_id): Path<String>,
) -> Result<Json<Vec<QuestionAdminView>>, ApiError> {
    let module_id = parse_path_id(&module_id, "module")?;
    let questions = CatalogService::new(&state)
        .questions_by_module(&module_id)
        .await?;
    Ok(Json(questions))
}

/// PATCH /admin/questions/{id}
pub async fn update_question(
    State(state): State<Arc<AppState>>,
    Path(question_id): Path<String>,
    AppJson(req): AppJson<QuestionUpdateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    req.validate()
        .map_err(|e| ApiError::bad_request(format!("Validation error: {}", e)))?;

    let question_id = parse_path_id(&question_id, "question")?;
    CatalogService::new(&state)
        .update_question(&question_id, &req)
        .await?;
    Ok(Json(json!({ "ok": true })))
}

/// DELETE /admin/questions/{id}
pub async fn delete_question(
    State(state): State<Arc<AppState>>,
    Path(question_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let question_id = parse_path_id(&question_id, "question")?;
    CatalogService::new(&state)
        .delete_question(&question_id)
        .await?;
    Ok(Json(json!({ "ok": true })))
}

/// POST /admin/import - bulk JSON import of a subject tree
pub async fn import_questions(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<Vec<ImportSubject>>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.is_empty() {
        return Err(ApiError::bad_request("Import payload is empty"));
    }

    let report = CatalogService::new(&state).import(&payload).await?;
    tracing::info!(
        "Admin import processed {} questions across {} subjects",
        report.questions,
        payload.len()
    );
    Ok((StatusCode::CREATED, Json(report)))
}

// ---------------------------------------------------------------------------
// Students & enrollment
// ---------------------------------------------------------------------------

/// GET /admin/students - every non-admin user
pub async fn list_students(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<StudentSummary>>, ApiError> {
    let users: Vec<User> = state
        .mongo
        .collection::<User>("users")
        .find(doc! { "role": { "$ne": "admin" } })
        .sort(doc! { "name": 1 })
        .await?
        .try_collect()
        .await?;

    let students = users
        .iter()
        .filter_map(|user| {
            Some(StudentSummary {
                id: user.id?.to_hex(),
                name: user.name.clone(),
                email: user.email.clone(),
            })
        })
        .collect();

    Ok(Json(students))
}

/// GET /admin/students/{id}/enrollments - subject ids the student can access
pub async fn student_enrollments(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    let user_id = parse_path_id(&user_id, "user")?;
    let subjects = EnrollmentService::new(state.mongo.clone())
        .enrollments_for(&user_id)
        .await?;
    Ok(Json(subjects))
}

/// POST /admin/enrollments - enroll or unenroll a student.
/// Enrolling twice is a no-op, not an error.
pub async fn toggle_enrollment(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<EnrollmentToggleRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = parse_path_id(&req.user_id, "user")?;
    let subject_id = parse_path_id(&req.subject_id, "subject")?;

    EnrollmentService::new(state.mongo.clone())
        .set_enrollment(&user_id, &subject_id, req.enroll)
        .await?;
    Ok(Json(json!({ "ok": true })))
}
