use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::{Collection, Database};
use std::collections::{HashMap, HashSet};

use crate::errors::ApiError;
use crate::models::{
    catalog::{ImportReport, ImportSubject},
    CatalogEntity, ModuleAdminView, ModuleOverview, ModuleRecord, ModuleSummary, OptionRecord,
    QuestionAdminView, QuestionRecord, QuestionUpdateRequest, SourceRecord, SourceSummary,
    SubjectRecord, SubjectSummary, SubjectUpdateRequest,
};
use crate::services::{enrollment_service::EnrollmentService, AppState};
use crate::utils::time::chrono_to_bson;

/// Read/write surface over the content hierarchy
/// Subject -> Source -> Module -> Question -> Option.
///
/// Student-facing listings are intersected with the enrollment gate;
/// admin operations bypass it.
pub struct CatalogService {
    mongo: Database,
    default_threshold: i32,
}

impl CatalogService {
    pub fn new(state: &AppState) -> Self {
        Self {
            mongo: state.mongo.clone(),
            default_threshold: state.config.default_mastery_threshold,
        }
    }

    pub fn with_database(mongo: Database, default_threshold: i32) -> Self {
        Self {
            mongo,
            default_threshold,
        }
    }

    fn subjects(&self) -> Collection<SubjectRecord> {
        self.mongo.collection("subjects")
    }

    fn sources(&self) -> Collection<SourceRecord> {
        self.mongo.collection("sources")
    }

    fn modules(&self) -> Collection<ModuleRecord> {
        self.mongo.collection("modules")
    }

    fn questions(&self) -> Collection<QuestionRecord> {
        self.mongo.collection("questions")
    }

    fn options(&self) -> Collection<OptionRecord> {
        self.mongo.collection("options")
    }

    // -----------------------------------------------------------------
    // Student listings (enrollment-filtered)
    // -----------------------------------------------------------------

    pub async fn list_subjects_for_student(
        &self,
        user_id: &ObjectId,
    ) -> Result<Vec<SubjectSummary>, ApiError> {
        let enrollment = EnrollmentService::new(self.mongo.clone());
        let allowed = enrollment.allowed_subject_ids(user_id).await?;
        if allowed.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<ObjectId> = allowed.into_iter().collect();
        let subjects: Vec<SubjectRecord> = self
            .subjects()
            .find(doc! { "_id": { "$in": ids } })
            .sort(doc! { "name": 1 })
            .await?
            .try_collect()
            .await?;

        Ok(subjects
            .iter()
            .map(|s| SubjectSummary::from_record(s, self.default_threshold))
            .collect())
    }

    pub async fn list_sources(&self, subject_id: &ObjectId) -> Result<Vec<SourceSummary>, ApiError> {
        let sources: Vec<SourceRecord> = self
            .sources()
            .find(doc! { "subject_id": subject_id })
            .sort(doc! { "name": 1 })
            .await?
            .try_collect()
            .await?;

        Ok(sources.iter().map(SourceSummary::from_record).collect())
    }

    pub async fn list_modules(&self, source_id: &ObjectId) -> Result<Vec<ModuleSummary>, ApiError> {
        let modules: Vec<ModuleRecord> = self
            .modules()
            .find(doc! { "source_id": source_id })
            .sort(doc! { "name": 1 })
            .await?
            .try_collect()
            .await?;

        Ok(modules.iter().map(ModuleSummary::from_record).collect())
    }

    /// Landing card shown before starting a module quiz.
    pub async fn module_overview(&self, module_id: &ObjectId) -> Result<ModuleOverview, ApiError> {
        let module = self
            .modules()
            .find_one(doc! { "_id": module_id })
            .await?
            .ok_or_else(|| ApiError::not_found("Module not found"))?;

        let source = self
            .sources()
            .find_one(doc! { "_id": module.source_id })
            .await?
            .ok_or_else(|| ApiError::not_found("Source not found for module"))?;

        let subject = self
            .subjects()
            .find_one(doc! { "_id": source.subject_id })
            .await?
            .ok_or_else(|| ApiError::not_found("Subject not found for module"))?;

        let total_questions = self
            .questions()
            .count_documents(doc! { "module_id": module_id })
            .await?;

        Ok(ModuleOverview {
            id: module.id.to_hex(),
            name: module.name,
            description: module.description,
            source_name: source.name,
            subject_name: subject.name,
            subject_code: subject.code,
            total_questions,
        })
    }

    // -----------------------------------------------------------------
    // Scope resolution helpers for the session builder
    // -----------------------------------------------------------------

    pub async fn subject_by_id(&self, id: &ObjectId) -> Result<Option<SubjectRecord>, ApiError> {
        Ok(self.subjects().find_one(doc! { "_id": id }).await?)
    }

    pub async fn subject_id_of_source(
        &self,
        source_id: &ObjectId,
    ) -> Result<Option<ObjectId>, ApiError> {
        Ok(self
            .sources()
            .find_one(doc! { "_id": source_id })
            .await?
            .map(|source| source.subject_id))
    }

    /// All module ids under a subject, via its sources.
    pub async fn module_ids_for_subject(
        &self,
        subject_id: &ObjectId,
    ) -> Result<Vec<ObjectId>, ApiError> {
        let sources: Vec<SourceRecord> = self
            .sources()
            .find(doc! { "subject_id": subject_id })
            .await?
            .try_collect()
            .await?;

        let source_ids: Vec<ObjectId> = sources.iter().map(|s| s.id).collect();
        if source_ids.is_empty() {
            return Ok(Vec::new());
        }

        let modules: Vec<ModuleRecord> = self
            .modules()
            .find(doc! { "source_id": { "$in": source_ids } })
            .await?
            .try_collect()
            .await?;

        Ok(modules.into_iter().map(|m| m.id).collect())
    }

    pub async fn modules_by_ids(&self, ids: &[ObjectId]) -> Result<Vec<ModuleRecord>, ApiError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .modules()
            .find(doc! { "_id": { "$in": ids.to_vec() } })
            .await?
            .try_collect()
            .await?)
    }

    /// Resolve the subject a module belongs to by walking up the chain.
    pub async fn subject_of_module(
        &self,
        module_id: &ObjectId,
    ) -> Result<Option<SubjectRecord>, ApiError> {
        let Some(module) = self.modules().find_one(doc! { "_id": module_id }).await? else {
            return Ok(None);
        };
        let Some(source) = self
            .sources()
            .find_one(doc! { "_id": module.source_id })
            .await?
        else {
            return Ok(None);
        };
        self.subject_by_id(&source.subject_id).await
    }

    pub async fn questions_for_modules(
        &self,
        module_ids: &[ObjectId],
    ) -> Result<Vec<QuestionRecord>, ApiError> {
        if module_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .questions()
            .find(doc! { "module_id": { "$in": module_ids.to_vec() } })
            .await?
            .try_collect()
            .await?)
    }

    pub async fn questions_by_ids(
        &self,
        ids: &[ObjectId],
    ) -> Result<Vec<QuestionRecord>, ApiError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .questions()
            .find(doc! { "_id": { "$in": ids.to_vec() } })
            .await?
            .try_collect()
            .await?)
    }

    /// Options grouped by question, preserving insertion order.
    pub async fn options_for_questions(
        &self,
        question_ids: &[ObjectId],
    ) -> Result<HashMap<ObjectId, Vec<OptionRecord>>, ApiError> {
        if question_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let options: Vec<OptionRecord> = self
            .options()
            .find(doc! { "question_id": { "$in": question_ids.to_vec() } })
            .sort(doc! { "_id": 1 })
            .await?
            .try_collect()
            .await?;

        let mut grouped: HashMap<ObjectId, Vec<OptionRecord>> = HashMap::new();
        for option in options {
            grouped.entry(option.question_id).or_default().push(option);
        }
        Ok(grouped)
    }

    /// Stable 1-based bank numbers for the given questions: the position
    /// of each question within its module when ordered by creation time.
    /// The ordering never changes once a question exists, so the label
    /// students see stays stable across reads.
    pub async fn bank_numbers(
        &self,
        questions: &[QuestionRecord],
    ) -> Result<HashMap<ObjectId, usize>, ApiError> {
        let module_ids: Vec<ObjectId> = questions
            .iter()
            .map(|q| q.module_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        if module_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let all: Vec<QuestionRecord> = self
            .questions()
            .find(doc! { "module_id": { "$in": module_ids } })
            .sort(doc! { "createdAt": 1, "_id": 1 })
            .await?
            .try_collect()
            .await?;

        let mut positions: HashMap<ObjectId, usize> = HashMap::new();
        let mut per_module: HashMap<ObjectId, usize> = HashMap::new();
        for question in &all {
            let counter = per_module.entry(question.module_id).or_insert(0);
            *counter += 1;
            positions.insert(question.id, *counter);
        }

        Ok(positions)
    }

    // -----------------------------------------------------------------
    // Admin operations (bypass the enrollment gate)
    // -----------------------------------------------------------------

    pub async fn list_subjects_admin(&self) -> Result<Vec<SubjectSummary>, ApiError> {
        let subjects: Vec<SubjectRecord> = self
            .subjects()
            .find(doc! {})
            .sort(doc! { "name": 1 })
            .await?
            .try_collect()
            .await?;

        Ok(subjects
            .iter()
            .map(|s| SubjectSummary::from_record(s, self.default_threshold))
            .collect())
    }

    pub async fn update_subject(
        &self,
        id: &ObjectId,
        req: &SubjectUpdateRequest,
    ) -> Result<(), ApiError> {
        let result = self
            .subjects()
            .update_one(
                doc! { "_id": id },
                doc! { "$set": {
                    "name": &req.name,
                    "code": &req.code,
                    "mastery_threshold": req.mastery_threshold,
                    "updatedAt": chrono_to_bson(chrono::Utc::now()),
                } },
            )
            .await?;

        if result.matched_count == 0 {
            return Err(ApiError::not_found("Subject not found"));
        }
        tracing::info!(
            "Subject {} updated (threshold={})",
            id.to_hex(),
            req.mastery_threshold
        );
        Ok(())
    }

    /// Module listing with the subject chain resolved, for the admin
    /// question browser.
    pub async fn list_modules_admin(&self) -> Result<Vec<ModuleAdminView>, ApiError> {
        let modules: Vec<ModuleRecord> = self
            .modules()
            .find(doc! {})
            .sort(doc! { "name": 1 })
            .await?
            .try_collect()
            .await?;

        let source_ids: Vec<ObjectId> = modules
            .iter()
            .map(|m| m.source_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let sources: Vec<SourceRecord> = if source_ids.is_empty() {
            Vec::new()
        } else {
            self.sources()
                .find(doc! { "_id": { "$in": source_ids } })
                .await?
                .try_collect()
                .await?
        };
        let source_map: HashMap<ObjectId, &SourceRecord> =
            sources.iter().map(|s| (s.id, s)).collect();

        let subject_ids: Vec<ObjectId> = sources
            .iter()
            .map(|s| s.subject_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let subjects: Vec<SubjectRecord> = if subject_ids.is_empty() {
            Vec::new()
        } else {
            self.subjects()
                .find(doc! { "_id": { "$in": subject_ids } })
                .await?
                .try_collect()
                .await?
        };
        let subject_map: HashMap<ObjectId, &SubjectRecord> =
            subjects.iter().map(|s| (s.id, s)).collect();

        let views = modules
            .iter()
            .filter_map(|module| {
                let source = source_map.get(&module.source_id)?;
                let subject = subject_map.get(&source.subject_id)?;
                Some(ModuleAdminView {
                    id: module.id.to_hex(),
                    name: module.name.clone(),
                    source_id: source.id.to_hex(),
                    source_name: source.name.clone(),
                    subject_id: subject.id.to_hex(),
                    subject_name: subject.name.clone(),
                })
            })
            .collect();

        Ok(views)
    }

    /// Questions of a module in creation order, carrying bank numbers.
    pub async fn questions_by_module(
        &self,
        module_id: &ObjectId,
    ) -> Result<Vec<QuestionAdminView>, ApiError> {
        let questions: Vec<QuestionRecord> = self
            .questions()
            .find(doc! { "module_id": module_id })
            .sort(doc! { "createdAt": 1, "_id": 1 })
            .await?
            .try_collect()
            .await?;

        Ok(questions
            .iter()
            .enumerate()
            .map(|(index, q)| QuestionAdminView {
                id: q.id.to_hex(),
                bank_number: index + 1,
                content: q.content.clone(),
                explanation: q.explanation.clone(),
            })
            .collect())
    }

    pub async fn update_question(
        &self,
        id: &ObjectId,
        req: &QuestionUpdateRequest,
    ) -> Result<(), ApiError> {
        let result = self
            .questions()
            .update_one(
                doc! { "_id": id },
                doc! { "$set": {
                    "content": &req.content,
                    "explanation": req.explanation.as_deref().unwrap_or(""),
                } },
            )
            .await?;

        if result.matched_count == 0 {
            return Err(ApiError::not_found("Question not found"));
        }
        Ok(())
    }

    pub async fn delete_question(&self, id: &ObjectId) -> Result<(), ApiError> {
        let result = self.questions().delete_one(doc! { "_id": id }).await?;
        if result.deleted_count == 0 {
            return Err(ApiError::not_found("Question not found"));
        }
        self.purge_question_children(&[*id]).await?;
        Ok(())
    }

    /// Cascading delete: each catalog level removes everything beneath it,
    /// including mastery counters for the removed questions.
    pub async fn delete_entity(&self, kind: CatalogEntity, id: &ObjectId) -> Result<(), ApiError> {
        match kind {
            CatalogEntity::Module => {
                let deleted = self.modules().delete_one(doc! { "_id": id }).await?;
                if deleted.deleted_count == 0 {
                    return Err(ApiError::not_found("Module not found"));
                }
                self.purge_modules(&[*id]).await?;
            }
            CatalogEntity::Source => {
                let deleted = self.sources().delete_one(doc! { "_id": id }).await?;
                if deleted.deleted_count == 0 {
                    return Err(ApiError::not_found("Source not found"));
                }
                let modules: Vec<ModuleRecord> = self
                    .modules()
                    .find(doc! { "source_id": id })
                    .await?
                    .try_collect()
                    .await?;
                let module_ids: Vec<ObjectId> = modules.iter().map(|m| m.id).collect();
                self.modules()
                    .delete_many(doc! { "source_id": id })
                    .await?;
                self.purge_modules(&module_ids).await?;
            }
            CatalogEntity::Subject => {
                let deleted = self.subjects().delete_one(doc! { "_id": id }).await?;
                if deleted.deleted_count == 0 {
                    return Err(ApiError::not_found("Subject not found"));
                }
                let sources: Vec<SourceRecord> = self
                    .sources()
                    .find(doc! { "subject_id": id })
                    .await?
                    .try_collect()
                    .await?;
                let source_ids: Vec<ObjectId> = sources.iter().map(|s| s.id).collect();
                self.sources()
                    .delete_many(doc! { "subject_id": id })
                    .await?;

                if !source_ids.is_empty() {
                    let modules: Vec<ModuleRecord> = self
                        .modules()
                        .find(doc! { "source_id": { "$in": source_ids.clone() } })
                        .await?
                        .try_collect()
                        .await?;
                    let module_ids: Vec<ObjectId> = modules.iter().map(|m| m.id).collect();
                    self.modules()
                        .delete_many(doc! { "source_id": { "$in": source_ids } })
                        .await?;
                    self.purge_modules(&module_ids).await?;
                }

                // Enrollment rows pointing at a deleted subject are dead.
                self.mongo
                    .collection::<mongodb::bson::Document>("enrollments")
                    .delete_many(doc! { "subject_id": id })
                    .await?;
            }
        }

        tracing::info!("Deleted {} {} with cascade", kind.as_str(), id.to_hex());
        Ok(())
    }

    async fn purge_modules(&self, module_ids: &[ObjectId]) -> Result<(), ApiError> {
        if module_ids.is_empty() {
            return Ok(());
        }
        let questions: Vec<QuestionRecord> = self
            .questions()
            .find(doc! { "module_id": { "$in": module_ids.to_vec() } })
            .await?
            .try_collect()
            .await?;
        let question_ids: Vec<ObjectId> = questions.iter().map(|q| q.id).collect();
        self.questions()
            .delete_many(doc! { "module_id": { "$in": module_ids.to_vec() } })
            .await?;
        self.purge_question_children(&question_ids).await
    }

    async fn purge_question_children(&self, question_ids: &[ObjectId]) -> Result<(), ApiError> {
        if question_ids.is_empty() {
            return Ok(());
        }
        self.options()
            .delete_many(doc! { "question_id": { "$in": question_ids.to_vec() } })
            .await?;
        self.mongo
            .collection::<mongodb::bson::Document>("mastery")
            .delete_many(doc! { "question_id": { "$in": question_ids.to_vec() } })
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Bulk JSON import
    // -----------------------------------------------------------------

    /// Import a subject tree with get-or-create semantics: subjects match
    /// on code, sources on (name, subject), modules on (name, source).
    /// All questions are validated before anything is written so a bad
    /// payload cannot leave a half-imported tree.
    pub async fn import(&self, payload: &[ImportSubject]) -> Result<ImportReport, ApiError> {
        for subject in payload {
            for source in &subject.sources {
                for module in &source.modules {
                    for question in &module.questions {
                        question.validate_options()?;
                    }
                }
            }
        }

        let mut report = ImportReport {
            subjects: 0,
            sources: 0,
            modules: 0,
            questions: 0,
        };
        let now = chrono_to_bson(chrono::Utc::now());

        for subject in payload {
            let subject_id = match self
                .subjects()
                .find_one(doc! { "code": &subject.code })
                .await?
            {
                Some(existing) => existing.id,
                None => {
                    let id = ObjectId::new();
                    self.subjects()
                        .insert_one(&SubjectRecord {
                            id,
                            name: subject.name.clone(),
                            code: subject.code.clone(),
                            mastery_threshold: None,
                            created_at: now,
                            updated_at: now,
                        })
                        .await?;
                    report.subjects += 1;
                    id
                }
            };

            for source in &subject.sources {
                let source_id = match self
                    .sources()
                    .find_one(doc! { "name": &source.name, "subject_id": subject_id })
                    .await?
                {
                    Some(existing) => existing.id,
                    None => {
                        let id = ObjectId::new();
                        self.sources()
                            .insert_one(&SourceRecord {
                                id,
                                subject_id,
                                name: source.name.clone(),
                                kind: source.kind.clone(),
                                created_at: now,
                            })
                            .await?;
                        report.sources += 1;
                        id
                    }
                };

                for module in &source.modules {
                    let module_id = match self
                        .modules()
                        .find_one(doc! { "name": &module.name, "source_id": source_id })
                        .await?
                    {
                        Some(existing) => existing.id,
                        None => {
                            let id = ObjectId::new();
                            self.modules()
                                .insert_one(&ModuleRecord {
                                    id,
                                    source_id,
                                    name: module.name.clone(),
                                    description: None,
                                    created_at: now,
                                })
                                .await?;
                            report.modules += 1;
                            id
                        }
                    };

                    for question in &module.questions {
                        let question_id = ObjectId::new();
                        self.questions()
                            .insert_one(&QuestionRecord {
                                id: question_id,
                                module_id,
                                content: question.content.clone(),
                                explanation: question.explanation.clone(),
                                created_at: chrono_to_bson(chrono::Utc::now()),
                            })
                            .await?;

                        let options: Vec<OptionRecord> = question
                            .options
                            .iter()
                            .map(|opt| OptionRecord {
                                id: ObjectId::new(),
                                question_id,
                                text: opt.text.clone(),
                                is_correct: opt.is_correct,
                            })
                            .collect();
                        self.options().insert_many(&options).await?;

                        report.questions += 1;
                    }
                }
            }
        }

        tracing::info!(
            "Import finished: {} subjects, {} sources, {} modules, {} questions",
            report.subjects,
            report.sources,
            report.modules,
            report.questions
        );
        Ok(report)
    }
}
