use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::ApiError;

/// Root of the content hierarchy: Subject -> Source -> Module -> Question -> Option.
///
/// `mastery_threshold` is how many cumulative correct answers mark a
/// question as mastered for this subject. Older records may not carry the
/// field, so readers go through [`SubjectRecord::threshold_or`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub mastery_threshold: Option<i32>,
    #[serde(rename = "createdAt", alias = "created_at")]
    pub created_at: BsonDateTime,
    #[serde(rename = "updatedAt", alias = "updated_at")]
    pub updated_at: BsonDateTime,
}

impl SubjectRecord {
    pub fn threshold_or(&self, fallback: i32) -> i32 {
        self.mastery_threshold.filter(|t| *t > 0).unwrap_or(fallback)
    }
}

/// Grouping layer under a subject, e.g. an exam year or a textbook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub subject_id: ObjectId,
    pub name: String,
    #[serde(rename = "type", default = "default_source_type")]
    pub kind: String,
    #[serde(rename = "createdAt", alias = "created_at")]
    pub created_at: BsonDateTime,
}

fn default_source_type() -> String {
    "exam".to_string()
}

/// Smallest addressable unit students can select for a quiz.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub source_id: ObjectId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "createdAt", alias = "created_at")]
    pub created_at: BsonDateTime,
}

/// A question has immutable identity; `created_at` defines the stable
/// ordering used to derive its bank number within the module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub module_id: ObjectId,
    pub content: String,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(rename = "createdAt", alias = "created_at")]
    pub created_at: BsonDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub question_id: ObjectId,
    pub text: String,
    pub is_correct: bool,
}

// ---------------------------------------------------------------------------
// Client-facing views
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct SubjectSummary {
    pub id: String,
    pub name: String,
    pub code: String,
    pub mastery_threshold: i32,
}

impl SubjectSummary {
    pub fn from_record(subject: &SubjectRecord, default_threshold: i32) -> Self {
        Self {
            id: subject.id.to_hex(),
            name: subject.name.clone(),
            code: subject.code.clone(),
            mastery_threshold: subject.threshold_or(default_threshold),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SourceSummary {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl SourceSummary {
    pub fn from_record(source: &SourceRecord) -> Self {
        Self {
            id: source.id.to_hex(),
            name: source.name.clone(),
            kind: source.kind.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ModuleSummary {
    pub id: String,
    pub name: String,
}

impl ModuleSummary {
    pub fn from_record(module: &ModuleRecord) -> Self {
        Self {
            id: module.id.to_hex(),
            name: module.name.clone(),
        }
    }
}

/// Landing view shown before starting a module quiz: the subject chain
/// plus the question count.
#[derive(Debug, Serialize)]
pub struct ModuleOverview {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub source_name: String,
    pub subject_name: String,
    pub subject_code: String,
    pub total_questions: u64,
}

/// Admin view of a question, carrying its stable bank number.
#[derive(Debug, Serialize)]
pub struct QuestionAdminView {
    pub id: String,
    pub bank_number: usize,
    pub content: String,
    pub explanation: Option<String>,
}

/// Admin module listing with the subject chain resolved.
#[derive(Debug, Serialize)]
pub struct ModuleAdminView {
    pub id: String,
    pub name: String,
    pub source_id: String,
    pub source_name: String,
    pub subject_id: String,
    pub subject_name: String,
}

// ---------------------------------------------------------------------------
// Admin CRUD requests
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct SubjectUpdateRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 32))]
    pub code: String,
    #[validate(range(min = 1, max = 20, message = "Mastery threshold must be between 1 and 20"))]
    pub mastery_threshold: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct QuestionUpdateRequest {
    #[validate(length(min = 1))]
    pub content: String,
    #[serde(default)]
    pub explanation: Option<String>,
}

/// Cascading delete targets. Each level removes everything beneath it.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CatalogEntity {
    Subject,
    Source,
    Module,
}

impl CatalogEntity {
    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogEntity::Subject => "subject",
            CatalogEntity::Source => "source",
            CatalogEntity::Module => "module",
        }
    }
}

// ---------------------------------------------------------------------------
// Bulk JSON import payload (subject -> sources -> modules -> questions)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ImportSubject {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub sources: Vec<ImportSource>,
}

#[derive(Debug, Deserialize)]
pub struct ImportSource {
    pub name: String,
    #[serde(rename = "type", default = "default_source_type")]
    pub kind: String,
    #[serde(default)]
    pub modules: Vec<ImportModule>,
}

#[derive(Debug, Deserialize)]
pub struct ImportModule {
    pub name: String,
    #[serde(default)]
    pub questions: Vec<ImportQuestion>,
}

#[derive(Debug, Deserialize)]
pub struct ImportQuestion {
    pub content: String,
    #[serde(default)]
    pub explanation: Option<String>,
    pub options: Vec<ImportOption>,
}

#[derive(Debug, Deserialize)]
pub struct ImportOption {
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

impl ImportQuestion {
    /// Exactly one option must be flagged correct; scoring assumes it.
    pub fn validate_options(&self) -> Result<(), ApiError> {
        if self.options.len() < 2 {
            return Err(ApiError::bad_request(format!(
                "Question \"{}\" needs at least two options",
                truncate(&self.content, 40)
            )));
        }
        let correct = self.options.iter().filter(|o| o.is_correct).count();
        if correct != 1 {
            return Err(ApiError::bad_request(format!(
                "Question \"{}\" must have exactly one correct option, found {}",
                truncate(&self.content, 40),
                correct
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct ImportReport {
    pub subjects: usize,
    pub sources: usize,
    pub modules: usize,
    pub questions: usize,
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn subject_threshold_falls_back_to_default() {
        let now = BsonDateTime::now();
        let doc = doc! {
            "_id": ObjectId::new(),
            "name": "Pharmacology",
            "code": "PHA101",
            "created_at": now,
            "updated_at": now,
        };

        let parsed: SubjectRecord =
            mongodb::bson::from_document(doc).expect("subject should deserialize");
        assert_eq!(parsed.threshold_or(3), 3);
    }

    #[test]
    fn subject_threshold_ignores_non_positive_values() {
        let now = BsonDateTime::now();
        let doc = doc! {
            "_id": ObjectId::new(),
            "name": "Pharmacology",
            "code": "PHA101",
            "mastery_threshold": 0,
            "createdAt": now,
            "updatedAt": now,
        };

        let parsed: SubjectRecord = mongodb::bson::from_document(doc).unwrap();
        assert_eq!(parsed.threshold_or(3), 3);
    }

    #[test]
    fn source_type_defaults_to_exam() {
        let now = BsonDateTime::now();
        let doc = doc! {
            "_id": ObjectId::new(),
            "subject_id": ObjectId::new(),
            "name": "Finals 2024",
            "created_at": now,
        };

        let parsed: SourceRecord = mongodb::bson::from_document(doc).unwrap();
        assert_eq!(parsed.kind, "exam");
    }

    #[test]
    fn import_question_requires_exactly_one_correct_option() {
        let mut question = ImportQuestion {
            content: "What is the capital of France?".into(),
            explanation: None,
            options: vec![
                ImportOption {
                    text: "Paris".into(),
                    is_correct: true,
                },
                ImportOption {
                    text: "Lyon".into(),
                    is_correct: false,
                },
            ],
        };
        assert!(question.validate_options().is_ok());

        question.options[1].is_correct = true;
        assert!(question.validate_options().is_err());

        question.options[0].is_correct = false;
        question.options[1].is_correct = false;
        assert!(question.validate_options().is_err());
    }

    #[test]
    fn import_question_rejects_single_option() {
        let question = ImportQuestion {
            content: "Lonely?".into(),
            explanation: None,
            options: vec![ImportOption {
                text: "Yes".into(),
                is_correct: true,
            }],
        };
        assert!(question.validate_options().is_err());
    }
}
