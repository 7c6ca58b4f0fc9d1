use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime, Document};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod catalog;
pub mod enrollment;
pub mod mastery;
pub mod stats;
pub mod user;

pub use catalog::{
    CatalogEntity, ImportReport, ImportSubject, ModuleAdminView, ModuleOverview, ModuleRecord,
    ModuleSummary, OptionRecord, QuestionAdminView, QuestionRecord, QuestionUpdateRequest,
    SourceRecord, SourceSummary, SubjectRecord, SubjectSummary, SubjectUpdateRequest,
};
pub use enrollment::{EnrollmentRecord, EnrollmentToggleRequest, StudentSummary};
pub use mastery::MasteryRecord;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Exam,
    #[default]
    Study,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Exam => "exam",
            SessionMode::Study => "study",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
        }
    }
}

/// Quiz session stored in the "sessions" collection. The question set is
/// frozen at creation time; `score` and `completed_at` are written exactly
/// once, on submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub user_id: ObjectId,
    pub mode: SessionMode,
    pub status: SessionStatus,
    pub quiz_title: String,
    /// Scope snapshot: requested count, distribution strategy, resolved
    /// subject/module ids. Free-form on purpose, it is display metadata.
    #[serde(default)]
    pub settings: Document,
    #[serde(default)]
    pub score: Option<i32>,
    #[serde(rename = "startedAt", alias = "started_at")]
    pub started_at: BsonDateTime,
    #[serde(
        rename = "completedAt",
        alias = "completed_at",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub completed_at: Option<BsonDateTime>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    Unanswered,
    Answered,
}

impl AnswerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerStatus::Unanswered => "unanswered",
            AnswerStatus::Answered => "answered",
        }
    }
}

/// One row per question in a session, created together with the session.
/// `selected_option_id` may be overwritten freely before submission;
/// `is_correct` is only ever set by grading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub session_id: ObjectId,
    pub question_id: ObjectId,
    pub order_number: i32,
    #[serde(default)]
    pub selected_option_id: Option<ObjectId>,
    pub status: AnswerStatus,
    #[serde(default)]
    pub is_correct: Option<bool>,
}

// ---------------------------------------------------------------------------
// Quiz API payloads
// ---------------------------------------------------------------------------

fn default_question_count() -> u32 {
    10
}

/// Selection scope for a new session: a whole subject, an explicit module
/// list, or modules validated against a subject.
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub subject_id: Option<String>,
    #[serde(default)]
    pub module_ids: Option<Vec<String>>,
    #[serde(default = "default_question_count")]
    pub count: u32,
    #[serde(default)]
    pub mode: SessionMode,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub quiz_title: String,
    pub question_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct SaveAnswerRequest {
    pub question_id: String,
    pub option_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitSessionRequest {
    /// question id -> selected option id
    #[serde(default)]
    pub answers: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitSessionResponse {
    pub session_id: String,
    pub score: i32,
    pub correct_count: usize,
    pub answered_count: usize,
}

#[derive(Debug, Serialize)]
pub struct OptionView {
    pub id: String,
    pub text: String,
    /// Only revealed in study mode and in result reviews.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct SessionQuestionView {
    pub id: String,
    /// Stable 1-based position of the question inside its module,
    /// shown to students as a reference label.
    pub bank_number: usize,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub options: Vec<OptionView>,
}

/// Resume payload for an in-progress session: ordered questions, any
/// previously saved picks and an advisory remaining-time hint. The hint is
/// client-side cosmetics only, the server enforces no deadline.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: String,
    pub mode: SessionMode,
    pub status: SessionStatus,
    pub quiz_title: String,
    pub questions: Vec<SessionQuestionView>,
    pub saved_answers: HashMap<String, String>,
    pub remaining_seconds: i64,
}

#[derive(Debug, Serialize)]
pub struct AnswerReview {
    pub question_id: String,
    pub bank_number: usize,
    pub content: String,
    pub explanation: Option<String>,
    pub selected_option_id: Option<String>,
    pub is_correct: Option<bool>,
    pub options: Vec<OptionView>,
}

#[derive(Debug, Serialize)]
pub struct SessionResultView {
    pub id: String,
    pub quiz_title: String,
    pub mode: SessionMode,
    pub score: i32,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub reviews: Vec<AnswerReview>,
}

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub id: String,
    pub quiz_title: String,
    pub score: i32,
    pub completed_at: Option<String>,
    pub subject_id: String,
    pub subject_name: String,
    pub module_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn session_mode_defaults_to_study() {
        let req: CreateSessionRequest = serde_json::from_str(r#"{"subject_id":"abc"}"#).unwrap();
        assert_eq!(req.mode, SessionMode::Study);
        assert_eq!(req.count, 10);
    }

    #[test]
    fn session_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(SessionStatus::Completed.as_str(), "completed");
    }

    #[test]
    fn answer_record_round_trips() {
        let record = AnswerRecord {
            id: ObjectId::new(),
            session_id: ObjectId::new(),
            question_id: ObjectId::new(),
            order_number: 3,
            selected_option_id: None,
            status: AnswerStatus::Unanswered,
            is_correct: None,
        };

        let doc = mongodb::bson::to_document(&record).unwrap();
        let parsed: AnswerRecord = mongodb::bson::from_document(doc).unwrap();
        assert_eq!(parsed.order_number, 3);
        assert_eq!(parsed.status, AnswerStatus::Unanswered);
        assert!(parsed.is_correct.is_none());
    }

    #[test]
    fn session_record_accepts_snake_case_timestamps() {
        let doc = doc! {
            "_id": ObjectId::new(),
            "user_id": ObjectId::new(),
            "mode": "exam",
            "status": "in_progress",
            "quiz_title": "Practice: Anatomy",
            "started_at": BsonDateTime::now(),
        };

        let parsed: SessionRecord = mongodb::bson::from_document(doc).unwrap();
        assert_eq!(parsed.mode, SessionMode::Exam);
        assert!(parsed.score.is_none());
        assert!(parsed.completed_at.is_none());
    }
}
