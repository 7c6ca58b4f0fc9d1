use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Bson};
use mongodb::{Collection, Database};
use std::collections::{HashMap, HashSet};

use crate::errors::ApiError;
use crate::metrics::{
    ANSWERS_GRADED_TOTAL, MASTERY_UPSERTS_TOTAL, SELECTION_OUTCOMES_TOTAL, SESSIONS_TOTAL,
};
use crate::models::{
    AnswerRecord, AnswerReview, AnswerStatus, CreateSessionRequest, CreateSessionResponse,
    MasteryRecord, OptionRecord, QuestionRecord, SaveAnswerRequest, SessionMode,
    SessionQuestionView, SessionRecord, SessionResultView, SessionStatus, SessionView,
    SubmitSessionRequest, SubmitSessionResponse,
};
use crate::services::{
    catalog_service::CatalogService, enrollment_service::EnrollmentService, selection, AppState,
};
use crate::utils::retry::{retry_async_with_config, RetryConfig};
use crate::utils::time::{bson_to_chrono, bson_to_iso, chrono_to_bson};

/// Seconds of advisory answering time granted per question. The hint is
/// rendered by the client; the server never enforces a deadline.
const SECONDS_PER_QUESTION: i64 = 60;

const MAX_SESSION_QUESTIONS: u32 = 100;

/// Builds quiz sessions from a selection scope, autosaves picks and
/// grades submissions. The selection always draws from unmastered
/// questions only, stratified across the resolved modules.
pub struct SessionService {
    mongo: Database,
    default_threshold: i32,
}

impl SessionService {
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

    fn sessions(&self) -> Collection<SessionRecord> {
        self.mongo.collection("sessions")
    }

    fn answers(&self) -> Collection<AnswerRecord> {
        self.mongo.collection("answers")
    }

    fn mastery(&self) -> Collection<MasteryRecord> {
        self.mongo.collection("mastery")
    }

    // -----------------------------------------------------------------
    // Session builder
    // -----------------------------------------------------------------

    pub async fn create_session(
        &self,
        user_id: &ObjectId,
        req: &CreateSessionRequest,
    ) -> Result<CreateSessionResponse, ApiError> {
        let count = req.count.clamp(1, MAX_SESSION_QUESTIONS) as usize;
        let catalog = CatalogService::with_database(self.mongo.clone(), self.default_threshold);
        let enrollment = EnrollmentService::new(self.mongo.clone());

        let requested_modules = parse_object_id_list(req.module_ids.as_deref().unwrap_or(&[]))?;

        let mut quiz_title = String::from("Practice quiz");
        let mut threshold = self.default_threshold;
        let mut scope_subject_id: Option<ObjectId> = None;
        let target_module_ids: Vec<ObjectId>;

        if let Some(subject_hex) = req.subject_id.as_deref() {
            let subject_id = ObjectId::parse_str(subject_hex)
                .map_err(|_| ApiError::bad_request("Invalid subject_id"))?;

            if !enrollment.is_enrolled(user_id, &subject_id).await? {
                SELECTION_OUTCOMES_TOTAL
                    .with_label_values(&["permission_denied"])
                    .inc();
                return Err(ApiError::permission_denied(
                    "You are not enrolled in this subject",
                ));
            }

            let subject = catalog
                .subject_by_id(&subject_id)
                .await?
                .ok_or_else(|| ApiError::not_found("Subject not found"))?;
            threshold = subject.threshold_or(self.default_threshold);
            quiz_title = format!("Practice: {}", subject.name);
            scope_subject_id = Some(subject_id);

            if requested_modules.is_empty() {
                target_module_ids = catalog.module_ids_for_subject(&subject_id).await?;
            } else {
                // Explicit modules must belong to the selected subject.
                let modules = catalog.modules_by_ids(&requested_modules).await?;
                if modules.len() != requested_modules.len() {
                    return Err(ApiError::not_found("One or more modules were not found"));
                }
                for module in &modules {
                    let owner = catalog.subject_of_module(&module.id).await?;
                    match owner {
                        Some(s) if s.id == subject_id => {}
                        _ => {
                            return Err(ApiError::bad_request(format!(
                                "Module \"{}\" does not belong to the selected subject",
                                module.name
                            )))
                        }
                    }
                }
                quiz_title = if modules.len() == 1 {
                    modules[0].name.clone()
                } else {
                    format!("{} (selected modules)", quiz_title)
                };
                target_module_ids = requested_modules.clone();
            }
        } else if !requested_modules.is_empty() {
            let modules = catalog.modules_by_ids(&requested_modules).await?;
            quiz_title = if modules.len() == 1 {
                modules[0].name.clone()
            } else {
                "Custom module quiz".to_string()
            };
            // Threshold follows the first module's subject, matching how
            // custom multi-module quizzes have always behaved.
            if let Some(first) = modules.first() {
                if let Some(subject) = catalog.subject_of_module(&first.id).await? {
                    threshold = subject.threshold_or(self.default_threshold);
                }
            }
            target_module_ids = modules.into_iter().map(|m| m.id).collect();
        } else {
            target_module_ids = Vec::new();
        }

        if target_module_ids.is_empty() {
            SELECTION_OUTCOMES_TOTAL
                .with_label_values(&["empty_scope"])
                .inc();
            return Err(ApiError::EmptyScope);
        }

        let questions = catalog.questions_for_modules(&target_module_ids).await?;
        if questions.is_empty() {
            SELECTION_OUTCOMES_TOTAL
                .with_label_values(&["no_questions"])
                .inc();
            return Err(ApiError::NoQuestions);
        }

        let question_ids: Vec<ObjectId> = questions.iter().map(|q| q.id).collect();
        let mastered = self.mastered_question_ids(user_id, &question_ids, threshold).await?;

        let available: Vec<&QuestionRecord> =
            questions.iter().filter(|q| !mastered.contains(&q.id)).collect();
        if available.is_empty() {
            SELECTION_OUTCOMES_TOTAL
                .with_label_values(&["all_mastered"])
                .inc();
            return Err(ApiError::AllMastered);
        }

        // One candidate pool per resolved module; modules that end up
        // empty are dropped inside the draw.
        let mut pools: Vec<Vec<ObjectId>> = target_module_ids
            .iter()
            .map(|module_id| {
                available
                    .iter()
                    .filter(|q| q.module_id == *module_id)
                    .map(|q| q.id)
                    .collect()
            })
            .collect();

        // ThreadRng must not live across an await point.
        let selected = {
            let mut rng = rand::rng();
            let mut selected = selection::stratified_draw(&mut pools, count, &mut rng);
            selection::shuffle_presentation(&mut selected, &mut rng);
            selected
        };

        let session_id = ObjectId::new();
        let now = chrono_to_bson(Utc::now());
        let settings = doc! {
            "total_request": count as i32,
            "distribution": "stratified",
            "mastery_threshold": threshold,
            "subject_id": scope_subject_id
                .map(|id| Bson::ObjectId(id))
                .unwrap_or(Bson::Null),
            "module_ids": target_module_ids
                .iter()
                .map(|id| Bson::ObjectId(*id))
                .collect::<Vec<Bson>>(),
        };

        let session = SessionRecord {
            id: session_id,
            user_id: *user_id,
            mode: req.mode,
            status: SessionStatus::InProgress,
            quiz_title: quiz_title.clone(),
            settings,
            score: None,
            started_at: now,
            completed_at: None,
        };

        let sessions = self.sessions();
        retry_async_with_config(RetryConfig::default(), || async {
            sessions.insert_one(&session).await.map(|_| ())
        })
        .await?;

        let placeholders: Vec<AnswerRecord> = selected
            .iter()
            .enumerate()
            .map(|(index, question_id)| AnswerRecord {
                id: ObjectId::new(),
                session_id,
                question_id: *question_id,
                order_number: (index + 1) as i32,
                selected_option_id: None,
                status: AnswerStatus::Unanswered,
                is_correct: None,
            })
            .collect();

        let answers = self.answers();
        retry_async_with_config(RetryConfig::aggressive(), || async {
            answers.insert_many(&placeholders).await.map(|_| ())
        })
        .await?;

        SESSIONS_TOTAL.with_label_values(&["created"]).inc();
        SELECTION_OUTCOMES_TOTAL
            .with_label_values(&["selected"])
            .inc();
        tracing::info!(
            "Session {} created for user {}: {} of {} requested questions ({} modules, threshold {})",
            session_id.to_hex(),
            user_id.to_hex(),
            selected.len(),
            count,
            target_module_ids.len(),
            threshold
        );

        Ok(CreateSessionResponse {
            session_id: session_id.to_hex(),
            quiz_title,
            question_count: selected.len(),
        })
    }

    /// Question ids the user has already mastered at the given threshold.
    /// This is a point-in-time snapshot; a concurrent mastery update from
    /// another in-flight session may not be reflected.
    async fn mastered_question_ids(
        &self,
        user_id: &ObjectId,
        question_ids: &[ObjectId],
        threshold: i32,
    ) -> Result<HashSet<ObjectId>, ApiError> {
        let rows: Vec<MasteryRecord> = self
            .mastery()
            .find(doc! {
                "user_id": user_id,
                "question_id": { "$in": question_ids.to_vec() },
                "correct_count": { "$gte": threshold },
            })
            .await?
            .try_collect()
            .await?;

        Ok(rows.into_iter().map(|row| row.question_id).collect())
    }

    // -----------------------------------------------------------------
    // Resume view
    // -----------------------------------------------------------------

    pub async fn get_session(
        &self,
        user_id: &ObjectId,
        session_id: &ObjectId,
    ) -> Result<SessionView, ApiError> {
        let session = self.owned_session(user_id, session_id).await?;
        if session.status == SessionStatus::Completed {
            return Err(ApiError::AlreadyCompleted {
                score: session.score.unwrap_or(0),
            });
        }

        let rows = self.session_answers(session_id).await?;
        if rows.is_empty() {
            return Err(ApiError::not_found("Session has no questions"));
        }

        let catalog = CatalogService::with_database(self.mongo.clone(), self.default_threshold);
        let question_ids: Vec<ObjectId> = rows.iter().map(|row| row.question_id).collect();
        let questions = catalog.questions_by_ids(&question_ids).await?;
        let question_map: HashMap<ObjectId, &QuestionRecord> =
            questions.iter().map(|q| (q.id, q)).collect();
        let options_map = catalog.options_for_questions(&question_ids).await?;
        let bank_numbers = catalog.bank_numbers(&questions).await?;

        // Study mode reveals the correct flag and explanation up front;
        // exam mode hides both until the result view.
        let reveal = session.mode == SessionMode::Study;

        let mut views = Vec::with_capacity(rows.len());
        let mut saved_answers = HashMap::new();
        for row in &rows {
            let Some(question) = question_map.get(&row.question_id).copied() else {
                continue;
            };
            if let Some(option_id) = &row.selected_option_id {
                saved_answers.insert(question.id.to_hex(), option_id.to_hex());
            }
            views.push(build_question_view(
                question,
                options_map.get(&question.id).map(Vec::as_slice).unwrap_or(&[]),
                bank_numbers.get(&question.id).copied().unwrap_or(0),
                reveal,
            ));
        }

        let remaining_seconds =
            remaining_time_hint(views.len(), bson_to_chrono(&session.started_at), Utc::now());

        Ok(SessionView {
            id: session.id.to_hex(),
            mode: session.mode,
            status: session.status,
            quiz_title: session.quiz_title,
            questions: views,
            saved_answers,
            remaining_seconds,
        })
    }

    // -----------------------------------------------------------------
    // Autosave
    // -----------------------------------------------------------------

    /// Overwrites the selected option for one question of an in-progress
    /// session. Safe to call repeatedly; has no mastery or scoring side
    /// effects.
    pub async fn save_answer(
        &self,
        user_id: &ObjectId,
        session_id: &ObjectId,
        req: &SaveAnswerRequest,
    ) -> Result<(), ApiError> {
        let session = self.owned_session(user_id, session_id).await?;
        if session.status == SessionStatus::Completed {
            return Err(ApiError::AlreadyCompleted {
                score: session.score.unwrap_or(0),
            });
        }

        let question_id = ObjectId::parse_str(&req.question_id)
            .map_err(|_| ApiError::bad_request("Invalid question_id"))?;
        let option_id = ObjectId::parse_str(&req.option_id)
            .map_err(|_| ApiError::bad_request("Invalid option_id"))?;

        let result = self
            .answers()
            .update_one(
                doc! { "session_id": session_id, "question_id": question_id },
                doc! { "$set": {
                    "selected_option_id": option_id,
                    "status": AnswerStatus::Answered.as_str(),
                } },
            )
            .await?;

        if result.matched_count == 0 {
            return Err(ApiError::not_found("Question is not part of this session"));
        }

        tracing::debug!(
            "Autosaved answer for session {} question {}",
            session_id.to_hex(),
            question_id.to_hex()
        );
        Ok(())
    }

    // -----------------------------------------------------------------
    // Grading engine
    // -----------------------------------------------------------------

    pub async fn submit_session(
        &self,
        user_id: &ObjectId,
        session_id: &ObjectId,
        req: &SubmitSessionRequest,
    ) -> Result<SubmitSessionResponse, ApiError> {
        let session = self.owned_session(user_id, session_id).await?;
        if session.status == SessionStatus::Completed {
            return Err(ApiError::AlreadyCompleted {
                score: session.score.unwrap_or(0),
            });
        }

        let rows = self.session_answers(session_id).await?;
        let member_ids: HashSet<ObjectId> = rows.iter().map(|row| row.question_id).collect();

        // Submitted answers outside the frozen question set are dropped;
        // the session's set never changes after creation.
        let mut submitted: Vec<(ObjectId, ObjectId)> = Vec::new();
        for (question_hex, option_hex) in &req.answers {
            let question_id = ObjectId::parse_str(question_hex)
                .map_err(|_| ApiError::bad_request("Invalid question id in answers"))?;
            let option_id = ObjectId::parse_str(option_hex)
                .map_err(|_| ApiError::bad_request("Invalid option id in answers"))?;
            if member_ids.contains(&question_id) {
                submitted.push((question_id, option_id));
            }
        }

        let catalog = CatalogService::with_database(self.mongo.clone(), self.default_threshold);
        let submitted_ids: Vec<ObjectId> = submitted.iter().map(|(q, _)| *q).collect();
        let options_map = catalog.options_for_questions(&submitted_ids).await?;

        let mut evaluations: Vec<(ObjectId, ObjectId, bool)> = Vec::with_capacity(submitted.len());
        let mut correct_count = 0usize;
        for (question_id, option_id) in &submitted {
            let correct_option = options_map
                .get(question_id)
                .map(Vec::as_slice)
                .and_then(first_correct_option);
            let is_correct = correct_option == Some(*option_id);
            if is_correct {
                correct_count += 1;
            }
            evaluations.push((*question_id, *option_id, is_correct));
        }

        let answered_count = submitted.len();
        let score = score_percent(correct_count, answered_count);

        // Idempotency guard: only the caller that wins this status
        // transition applies grading and mastery. A retried submit loses
        // the filter match and is answered with the stored score.
        let now = chrono_to_bson(Utc::now());
        let transition = self
            .sessions()
            .find_one_and_update(
                doc! {
                    "_id": session_id,
                    "user_id": user_id,
                    "status": SessionStatus::InProgress.as_str(),
                },
                doc! { "$set": {
                    "status": SessionStatus::Completed.as_str(),
                    "score": score,
                    "completedAt": now,
                } },
            )
            .await?;

        if transition.is_none() {
            let current = self
                .sessions()
                .find_one(doc! { "_id": session_id, "user_id": user_id })
                .await?
                .ok_or_else(|| ApiError::not_found("Session not found"))?;
            return Err(ApiError::AlreadyCompleted {
                score: current.score.unwrap_or(0),
            });
        }

        let answers = self.answers();
        for (question_id, option_id, is_correct) in &evaluations {
            retry_async_with_config(RetryConfig::aggressive(), || async {
                answers
                    .update_one(
                        doc! { "session_id": session_id, "question_id": question_id },
                        doc! { "$set": {
                            "selected_option_id": option_id,
                            "is_correct": *is_correct,
                            "status": AnswerStatus::Answered.as_str(),
                        } },
                    )
                    .await
                    .map(|_| ())
            })
            .await?;

            let label = if *is_correct { "true" } else { "false" };
            ANSWERS_GRADED_TOTAL.with_label_values(&[label]).inc();

            if *is_correct {
                self.apply_mastery_increment(user_id, question_id).await?;
            }
        }

        SESSIONS_TOTAL.with_label_values(&["completed"]).inc();
        tracing::info!(
            "Session {} graded for user {}: score {} ({}/{} correct)",
            session_id.to_hex(),
            user_id.to_hex(),
            score,
            correct_count,
            answered_count
        );

        Ok(SubmitSessionResponse {
            session_id: session_id.to_hex(),
            score,
            correct_count,
            answered_count,
        })
    }

    /// Atomic mastery upsert. `$inc` on an upsert creates the row at 1 or
    /// bumps an existing row in one store round-trip, so two concurrent
    /// correct submissions for the same (user, question) cannot lose an
    /// increment.
    async fn apply_mastery_increment(
        &self,
        user_id: &ObjectId,
        question_id: &ObjectId,
    ) -> Result<(), ApiError> {
        let collection = self.mastery();
        let now = chrono_to_bson(Utc::now());

        let result = retry_async_with_config(RetryConfig::aggressive(), || async {
            collection
                .update_one(
                    doc! { "user_id": user_id, "question_id": question_id },
                    doc! {
                        "$inc": { "correct_count": 1 },
                        "$set": { "lastAnsweredAt": now },
                    },
                )
                .upsert(true)
                .await
        })
        .await?;

        let kind = if result.upserted_id.is_some() {
            "insert"
        } else {
            "increment"
        };
        MASTERY_UPSERTS_TOTAL.with_label_values(&[kind]).inc();
        Ok(())
    }

    // -----------------------------------------------------------------
    // Result view
    // -----------------------------------------------------------------

    pub async fn session_result(
        &self,
        user_id: &ObjectId,
        session_id: &ObjectId,
    ) -> Result<SessionResultView, ApiError> {
        let session = self.owned_session(user_id, session_id).await?;
        if session.status != SessionStatus::Completed {
            return Err(ApiError::bad_request("Session has not been submitted yet"));
        }

        let rows = self.session_answers(session_id).await?;
        let catalog = CatalogService::with_database(self.mongo.clone(), self.default_threshold);
        let question_ids: Vec<ObjectId> = rows.iter().map(|row| row.question_id).collect();
        let questions = catalog.questions_by_ids(&question_ids).await?;
        let question_map: HashMap<ObjectId, &QuestionRecord> =
            questions.iter().map(|q| (q.id, q)).collect();
        let options_map = catalog.options_for_questions(&question_ids).await?;
        let bank_numbers = catalog.bank_numbers(&questions).await?;

        let reviews = rows
            .iter()
            .filter_map(|row| {
                let question = question_map.get(&row.question_id)?;
                let options = options_map
                    .get(&question.id)
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                Some(AnswerReview {
                    question_id: question.id.to_hex(),
                    bank_number: bank_numbers.get(&question.id).copied().unwrap_or(0),
                    content: question.content.clone(),
                    explanation: question.explanation.clone(),
                    selected_option_id: row.selected_option_id.map(|id| id.to_hex()),
                    is_correct: row.is_correct,
                    options: options
                        .iter()
                        .map(|option| crate::models::OptionView {
                            id: option.id.to_hex(),
                            text: option.text.clone(),
                            is_correct: Some(option.is_correct),
                        })
                        .collect(),
                })
            })
            .collect();

        Ok(SessionResultView {
            id: session.id.to_hex(),
            quiz_title: session.quiz_title,
            mode: session.mode,
            score: session.score.unwrap_or(0),
            started_at: bson_to_iso(&session.started_at),
            completed_at: session.completed_at.as_ref().map(bson_to_iso),
            reviews,
        })
    }

    // -----------------------------------------------------------------
    // Shared loads
    // -----------------------------------------------------------------

    async fn owned_session(
        &self,
        user_id: &ObjectId,
        session_id: &ObjectId,
    ) -> Result<SessionRecord, ApiError> {
        self.sessions()
            .find_one(doc! { "_id": session_id, "user_id": user_id })
            .await?
            .ok_or_else(|| ApiError::not_found("Session not found"))
    }

    async fn session_answers(&self, session_id: &ObjectId) -> Result<Vec<AnswerRecord>, ApiError> {
        Ok(self
            .answers()
            .find(doc! { "session_id": session_id })
            .sort(doc! { "order_number": 1 })
            .await?
            .try_collect()
            .await?)
    }
}

fn build_question_view(
    question: &QuestionRecord,
    options: &[OptionRecord],
    bank_number: usize,
    reveal: bool,
) -> SessionQuestionView {
    SessionQuestionView {
        id: question.id.to_hex(),
        bank_number,
        content: question.content.clone(),
        explanation: if reveal {
            question.explanation.clone()
        } else {
            None
        },
        options: options
            .iter()
            .map(|option| crate::models::OptionView {
                id: option.id.to_hex(),
                text: option.text.clone(),
                is_correct: reveal.then_some(option.is_correct),
            })
            .collect(),
    }
}

fn parse_object_id_list(values: &[String]) -> Result<Vec<ObjectId>, ApiError> {
    values
        .iter()
        .map(|value| {
            ObjectId::parse_str(value).map_err(|_| ApiError::bad_request("Invalid module id"))
        })
        .collect()
}

/// Session score as a 0-100 percentage. Zero answered questions score 0;
/// that is a valid (if sad) submission, not an error.
pub fn score_percent(correct: usize, answered: usize) -> i32 {
    if answered == 0 {
        return 0;
    }
    ((correct as f64 / answered as f64) * 100.0).round() as i32
}

/// The option a submission is graded against. Write-time validation keeps
/// questions at exactly one correct option; if legacy data disagrees, the
/// first correct-flagged option wins.
pub fn first_correct_option(options: &[OptionRecord]) -> Option<ObjectId> {
    options.iter().find(|option| option.is_correct).map(|option| option.id)
}

/// Advisory countdown shown next to the quiz, one minute per question.
pub fn remaining_time_hint(
    question_count: usize,
    started_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> i64 {
    let total = question_count as i64 * SECONDS_PER_QUESTION;
    let elapsed = (now - started_at).num_seconds();
    (total - elapsed).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn option(question_id: ObjectId, is_correct: bool) -> OptionRecord {
        OptionRecord {
            id: ObjectId::new(),
            question_id,
            text: "text".into(),
            is_correct,
        }
    }

    #[test]
    fn score_is_rounded_percentage() {
        assert_eq!(score_percent(3, 4), 75);
        assert_eq!(score_percent(2, 3), 67);
        assert_eq!(score_percent(1, 3), 33);
        assert_eq!(score_percent(10, 10), 100);
        assert_eq!(score_percent(0, 5), 0);
    }

    #[test]
    fn zero_answered_scores_zero_not_error() {
        assert_eq!(score_percent(0, 0), 0);
    }

    #[test]
    fn first_correct_option_wins_on_malformed_data() {
        let question_id = ObjectId::new();
        let options = vec![
            option(question_id, false),
            option(question_id, true),
            option(question_id, true),
        ];

        assert_eq!(first_correct_option(&options), Some(options[1].id));
    }

    #[test]
    fn no_correct_option_grades_nothing_correct() {
        let question_id = ObjectId::new();
        let options = vec![option(question_id, false), option(question_id, false)];
        assert_eq!(first_correct_option(&options), None);
    }

    #[test]
    fn remaining_time_is_floored_at_zero() {
        let started = Utc::now();
        assert_eq!(
            remaining_time_hint(10, started, started + Duration::seconds(30)),
            570
        );
        assert_eq!(
            remaining_time_hint(2, started, started + Duration::seconds(1000)),
            0
        );
    }
}
