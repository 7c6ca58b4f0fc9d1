use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Bson};
use mongodb::{Collection, Database};
use redis::aio::ConnectionManager;
use std::collections::{HashMap, HashSet};

use crate::errors::ApiError;
use crate::models::stats::{
    AnalyticsModule, AnalyticsSource, AnalyticsSubject, AnalyticsTotals, DashboardStats,
    GlobalProgress, LeaderboardEntry, ProfileStats, SubjectProgress, UserStats,
};
use crate::models::user::User;
use crate::models::{
    AnswerRecord, HistoryEntry, MasteryRecord, ModuleRecord, QuestionRecord, SessionRecord,
    SessionStatus, SourceRecord, SubjectRecord,
};
use crate::services::{enrollment_service::EnrollmentService, AppState};
use crate::utils::time::bson_to_iso;

const LEADERBOARD_CACHE_SECONDS: u64 = 60;

/// Rolls mastery counters, completed sessions and the content hierarchy
/// up into dashboard, analytics, history and leaderboard figures.
pub struct StatsService {
    mongo: Database,
    redis: ConnectionManager,
    default_threshold: i32,
}

impl StatsService {
    pub fn new(state: &AppState) -> Self {
        Self {
            mongo: state.mongo.clone(),
            redis: state.redis.clone(),
            default_threshold: state.config.default_mastery_threshold,
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

    fn users(&self) -> Collection<User> {
        self.mongo.collection("users")
    }

    // -----------------------------------------------------------------
    // Dashboard
    // -----------------------------------------------------------------

    pub async fn dashboard_stats(&self, user_id: &ObjectId) -> Result<DashboardStats, ApiError> {
        let enrollment = EnrollmentService::new(self.mongo.clone());
        let allowed = enrollment.allowed_subject_ids(user_id).await?;
        if allowed.is_empty() {
            return Ok(DashboardStats {
                global: global_progress(&[]),
                subjects: Vec::new(),
            });
        }

        let hierarchy = self.load_hierarchy(&allowed).await?;

        let mastery_rows: Vec<MasteryRecord> = self
            .mastery()
            .find(doc! { "user_id": user_id })
            .await?
            .try_collect()
            .await?;
        let mastery_by_question: HashMap<ObjectId, &MasteryRecord> = mastery_rows
            .iter()
            .map(|row| (row.question_id, row))
            .collect();

        let completed = self.completed_sessions_for(user_id).await?;
        let session_ids: Vec<ObjectId> = completed.iter().map(|s| s.id).collect();
        let attribution = self.attribute_sessions(&session_ids).await?;

        let mut subjects = Vec::with_capacity(hierarchy.subjects.len());
        let mut rollup: Vec<(usize, usize)> = Vec::with_capacity(hierarchy.subjects.len());

        for subject in &hierarchy.subjects {
            let threshold = subject.threshold_or(self.default_threshold);

            let subject_questions: Vec<&QuestionRecord> = hierarchy
                .questions
                .iter()
                .filter(|q| hierarchy.subject_of_module(&q.module_id) == Some(subject.id))
                .collect();
            let total_questions = subject_questions.len();

            let mastered_questions = subject_questions
                .iter()
                .filter(|q| {
                    mastery_by_question
                        .get(&q.id)
                        .map(|row| row.is_mastered(threshold))
                        .unwrap_or(false)
                })
                .count();

            let scores: Vec<i32> = completed
                .iter()
                .filter(|session| {
                    attribution
                        .get(&session.id)
                        .map(|attr| attr.subject_id == subject.id)
                        .unwrap_or(false)
                })
                .map(|session| session.score.unwrap_or(0))
                .collect();

            rollup.push((total_questions, mastered_questions));
            subjects.push(SubjectProgress {
                id: subject.id.to_hex(),
                name: subject.name.clone(),
                code: subject.code.clone(),
                mastery_threshold: threshold,
                total_questions,
                mastered_questions,
                progress: progress_percent(mastered_questions, total_questions),
                remaining: total_questions.saturating_sub(mastered_questions),
                quiz_count: scores.len(),
                avg_score: average_score(&scores),
            });
        }

        Ok(DashboardStats {
            global: global_progress(&rollup),
            subjects,
        })
    }

    /// Global `{total_quiz, avg_score}` counters for the navbar.
    pub async fn user_stats(&self, user_id: &ObjectId) -> Result<UserStats, ApiError> {
        let completed = self.completed_sessions_for(user_id).await?;
        let scores: Vec<i32> = completed.iter().map(|s| s.score.unwrap_or(0)).collect();

        Ok(UserStats {
            total_quiz: scores.len(),
            avg_score: average_score(&scores),
        })
    }

    pub async fn profile_stats(&self, user_id: &ObjectId) -> Result<ProfileStats, ApiError> {
        let completed = self.completed_sessions_for(user_id).await?;
        let scores: Vec<i32> = completed.iter().map(|s| s.score.unwrap_or(0)).collect();
        let total_score: i64 = scores.iter().map(|s| *s as i64).sum();

        Ok(ProfileStats {
            total_quiz: scores.len(),
            total_score,
            avg_score: average_score(&scores),
            level: achievement_level(total_score).to_string(),
        })
    }

    // -----------------------------------------------------------------
    // History
    // -----------------------------------------------------------------

    /// Completed sessions newest first, tagged with the attributed
    /// subject and module, filtered to subjects the user is enrolled in.
    pub async fn quiz_history(&self, user_id: &ObjectId) -> Result<Vec<HistoryEntry>, ApiError> {
        let enrollment = EnrollmentService::new(self.mongo.clone());
        let allowed = enrollment.allowed_subject_ids(user_id).await?;
        if allowed.is_empty() {
            return Ok(Vec::new());
        }

        let sessions: Vec<SessionRecord> = self
            .sessions()
            .find(doc! {
                "user_id": user_id,
                "status": SessionStatus::Completed.as_str(),
            })
            .sort(doc! { "startedAt": -1 })
            .await?
            .try_collect()
            .await?;

        let session_ids: Vec<ObjectId> = sessions.iter().map(|s| s.id).collect();
        let attribution = self.attribute_sessions(&session_ids).await?;

        let subject_ids: Vec<ObjectId> = attribution
            .values()
            .map(|attr| attr.subject_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let subject_names = self.subject_names(&subject_ids).await?;

        let module_ids: Vec<ObjectId> = attribution
            .values()
            .map(|attr| attr.module_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let module_names = self.module_names(&module_ids).await?;

        let entries = sessions
            .iter()
            .filter_map(|session| {
                let attr = attribution.get(&session.id)?;
                if !allowed.contains(&attr.subject_id) {
                    return None;
                }
                Some(HistoryEntry {
                    id: session.id.to_hex(),
                    quiz_title: session.quiz_title.clone(),
                    score: session.score.unwrap_or(0),
                    completed_at: session.completed_at.as_ref().map(bson_to_iso),
                    subject_id: attr.subject_id.to_hex(),
                    subject_name: subject_names
                        .get(&attr.subject_id)
                        .cloned()
                        .unwrap_or_default(),
                    module_name: module_names
                        .get(&attr.module_id)
                        .cloned()
                        .unwrap_or_else(|| "Mixed".to_string()),
                })
            })
            .collect();

        Ok(entries)
    }

    // -----------------------------------------------------------------
    // Analytics drilldown
    // -----------------------------------------------------------------

    pub async fn analytics_report(
        &self,
        user_id: &ObjectId,
    ) -> Result<Vec<AnalyticsSubject>, ApiError> {
        let enrollment = EnrollmentService::new(self.mongo.clone());
        let allowed = enrollment.allowed_subject_ids(user_id).await?;
        if allowed.is_empty() {
            return Ok(Vec::new());
        }

        let hierarchy = self.load_hierarchy(&allowed).await?;

        let mastery_rows: Vec<MasteryRecord> = self
            .mastery()
            .find(doc! { "user_id": user_id })
            .await?
            .try_collect()
            .await?;
        let mastery_by_question: HashMap<ObjectId, &MasteryRecord> = mastery_rows
            .iter()
            .map(|row| (row.question_id, row))
            .collect();

        // Accuracy comes from graded answers of completed sessions:
        // per-question attempts and how many of them were correct.
        let completed = self.completed_sessions_for(user_id).await?;
        let session_ids: Vec<ObjectId> = completed.iter().map(|s| s.id).collect();
        let graded = self.graded_answers_for(&session_ids).await?;
        let question_module: HashMap<ObjectId, ObjectId> = hierarchy
            .questions
            .iter()
            .map(|q| (q.id, q.module_id))
            .collect();

        let mut attempts_per_module: HashMap<ObjectId, (usize, usize)> = HashMap::new();
        for answer in &graded {
            if let Some(module_id) = question_module.get(&answer.question_id) {
                let entry = attempts_per_module.entry(*module_id).or_insert((0, 0));
                entry.0 += 1;
                if answer.is_correct == Some(true) {
                    entry.1 += 1;
                }
            }
        }

        let mut questions_per_module: HashMap<ObjectId, Vec<&QuestionRecord>> = HashMap::new();
        for question in &hierarchy.questions {
            questions_per_module
                .entry(question.module_id)
                .or_default()
                .push(question);
        }

        let mut report = Vec::with_capacity(hierarchy.subjects.len());
        for subject in &hierarchy.subjects {
            let threshold = subject.threshold_or(self.default_threshold);
            let mut subject_total = 0usize;
            let mut subject_mastered = 0usize;

            let mut sources: Vec<AnalyticsSource> = hierarchy
                .sources
                .iter()
                .filter(|source| source.subject_id == subject.id)
                .map(|source| {
                    let mut modules: Vec<AnalyticsModule> = hierarchy
                        .modules
                        .iter()
                        .filter(|module| module.source_id == source.id)
                        .map(|module| {
                            let module_questions = questions_per_module
                                .get(&module.id)
                                .map(Vec::as_slice)
                                .unwrap_or(&[]);
                            let total = module_questions.len();
                            let mastered = module_questions
                                .iter()
                                .filter(|q| {
                                    mastery_by_question
                                        .get(&q.id)
                                        .map(|row| row.is_mastered(threshold))
                                        .unwrap_or(false)
                                })
                                .count();
                            let (attempts, correct) = attempts_per_module
                                .get(&module.id)
                                .copied()
                                .unwrap_or((0, 0));

                            subject_total += total;
                            subject_mastered += mastered;

                            AnalyticsModule {
                                id: module.id.to_hex(),
                                name: module.name.clone(),
                                total_questions: total,
                                mastered,
                                progress: progress_percent(mastered, total),
                                accuracy: progress_percent(correct, attempts),
                            }
                        })
                        .collect();
                    modules.sort_by(|a, b| a.name.cmp(&b.name));

                    AnalyticsSource {
                        id: source.id.to_hex(),
                        name: source.name.clone(),
                        kind: source.kind.clone(),
                        modules,
                    }
                })
                .collect();
            sources.sort_by(|a, b| a.name.cmp(&b.name));

            report.push(AnalyticsSubject {
                id: subject.id.to_hex(),
                name: subject.name.clone(),
                code: subject.code.clone(),
                stats: AnalyticsTotals {
                    total_questions: subject_total,
                    mastered: subject_mastered,
                    progress: progress_percent(subject_mastered, subject_total),
                },
                sources,
            });
        }

        Ok(report)
    }

    // -----------------------------------------------------------------
    // Leaderboard
    // -----------------------------------------------------------------

    /// Top-N users by average score over completed sessions. The ranking
    /// is cached in Redis for a minute; cache failures fall back to the
    /// store instead of failing the request.
    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, ApiError> {
        let cache_key = format!("leaderboard:top:{}", limit);

        let mut conn = self.redis.clone();
        match redis::cmd("GET")
            .arg(&cache_key)
            .query_async::<Option<String>>(&mut conn)
            .await
        {
            Ok(Some(cached)) => {
                if let Ok(entries) = serde_json::from_str::<Vec<CachedLeaderboardEntry>>(&cached) {
                    tracing::debug!("Leaderboard served from cache");
                    return Ok(entries.into_iter().map(LeaderboardEntry::from).collect());
                }
            }
            Ok(None) => {}
            Err(err) => tracing::warn!("Leaderboard cache read failed: {}", err),
        }

        let sessions: Vec<SessionRecord> = self
            .sessions()
            .find(doc! { "status": SessionStatus::Completed.as_str() })
            .await?
            .try_collect()
            .await?;

        let mut per_user: HashMap<ObjectId, (i64, usize)> = HashMap::new();
        for session in &sessions {
            let entry = per_user.entry(session.user_id).or_insert((0, 0));
            entry.0 += session.score.unwrap_or(0) as i64;
            entry.1 += 1;
        }

        let mut ranking: Vec<(ObjectId, i64, usize)> = per_user
            .into_iter()
            .map(|(user_id, (total, count))| (user_id, total, count))
            .collect();
        ranking.sort_by(|a, b| {
            let avg_a = average_score_i64(a.1, a.2);
            let avg_b = average_score_i64(b.1, b.2);
            avg_b.cmp(&avg_a).then(b.2.cmp(&a.2))
        });
        ranking.truncate(limit);

        let user_ids: Vec<ObjectId> = ranking.iter().map(|(id, _, _)| *id).collect();
        let users: Vec<User> = if user_ids.is_empty() {
            Vec::new()
        } else {
            self.users()
                .find(doc! { "_id": { "$in": user_ids } })
                .await?
                .try_collect()
                .await?
        };
        let user_map: HashMap<ObjectId, &User> = users
            .iter()
            .filter_map(|user| user.id.map(|id| (id, user)))
            .collect();

        let entries: Vec<LeaderboardEntry> = ranking
            .iter()
            .map(|(user_id, total, count)| {
                let user = user_map.get(user_id);
                let name = user
                    .map(|u| u.name.clone())
                    .filter(|n| !n.is_empty())
                    .or_else(|| {
                        user.and_then(|u| u.email.split('@').next().map(|s| s.to_string()))
                    })
                    .unwrap_or_else(|| "Participant".to_string());

                LeaderboardEntry {
                    user_id: user_id.to_hex(),
                    name,
                    email: user.map(|u| u.email.clone()).unwrap_or_default(),
                    avg_score: average_score_i64(*total, *count),
                    total_quiz: *count,
                    points: *total,
                }
            })
            .collect();

        let cacheable: Vec<CachedLeaderboardEntry> =
            entries.iter().map(CachedLeaderboardEntry::from).collect();
        if let Ok(json) = serde_json::to_string(&cacheable) {
            if let Err(err) = redis::cmd("SETEX")
                .arg(&cache_key)
                .arg(LEADERBOARD_CACHE_SECONDS)
                .arg(json)
                .query_async::<()>(&mut conn)
                .await
            {
                tracing::warn!("Leaderboard cache write failed: {}", err);
            }
        }

        Ok(entries)
    }

    // -----------------------------------------------------------------
    // Shared loads
    // -----------------------------------------------------------------

    async fn completed_sessions_for(
        &self,
        user_id: &ObjectId,
    ) -> Result<Vec<SessionRecord>, ApiError> {
        Ok(self
            .sessions()
            .find(doc! {
                "user_id": user_id,
                "status": SessionStatus::Completed.as_str(),
            })
            .await?
            .try_collect()
            .await?)
    }

    async fn graded_answers_for(
        &self,
        session_ids: &[ObjectId],
    ) -> Result<Vec<AnswerRecord>, ApiError> {
        if session_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .answers()
            .find(doc! {
                "session_id": { "$in": session_ids.to_vec() },
                "is_correct": { "$ne": Bson::Null },
            })
            .await?
            .try_collect()
            .await?)
    }

    /// Attributes each session to the subject and module of its first
    /// answer (lowest order number). Lossy for sessions mixing subjects;
    /// the first question decides, which matches how titles are built.
    async fn attribute_sessions(
        &self,
        session_ids: &[ObjectId],
    ) -> Result<HashMap<ObjectId, SessionAttribution>, ApiError> {
        if session_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let answers: Vec<AnswerRecord> = self
            .answers()
            .find(doc! { "session_id": { "$in": session_ids.to_vec() } })
            .sort(doc! { "session_id": 1, "order_number": 1 })
            .await?
            .try_collect()
            .await?;

        let mut first_question: HashMap<ObjectId, ObjectId> = HashMap::new();
        for answer in &answers {
            first_question
                .entry(answer.session_id)
                .or_insert(answer.question_id);
        }

        let question_ids: Vec<ObjectId> = first_question
            .values()
            .copied()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        if question_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let questions: Vec<QuestionRecord> = self
            .mongo
            .collection::<QuestionRecord>("questions")
            .find(doc! { "_id": { "$in": question_ids } })
            .await?
            .try_collect()
            .await?;
        let question_module: HashMap<ObjectId, ObjectId> =
            questions.iter().map(|q| (q.id, q.module_id)).collect();

        let module_ids: Vec<ObjectId> = question_module
            .values()
            .copied()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let modules: Vec<ModuleRecord> = self
            .mongo
            .collection::<ModuleRecord>("modules")
            .find(doc! { "_id": { "$in": module_ids } })
            .await?
            .try_collect()
            .await?;
        let module_source: HashMap<ObjectId, ObjectId> =
            modules.iter().map(|m| (m.id, m.source_id)).collect();

        let source_ids: Vec<ObjectId> = module_source
            .values()
            .copied()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let sources: Vec<SourceRecord> = self
            .mongo
            .collection::<SourceRecord>("sources")
            .find(doc! { "_id": { "$in": source_ids } })
            .await?
            .try_collect()
            .await?;
        let source_subject: HashMap<ObjectId, ObjectId> =
            sources.iter().map(|s| (s.id, s.subject_id)).collect();

        let mut attribution = HashMap::new();
        for (session_id, question_id) in &first_question {
            let Some(module_id) = question_module.get(question_id) else {
                continue;
            };
            let Some(source_id) = module_source.get(module_id) else {
                continue;
            };
            let Some(subject_id) = source_subject.get(source_id) else {
                continue;
            };
            attribution.insert(
                *session_id,
                SessionAttribution {
                    subject_id: *subject_id,
                    module_id: *module_id,
                },
            );
        }

        Ok(attribution)
    }

    async fn subject_names(
        &self,
        ids: &[ObjectId],
    ) -> Result<HashMap<ObjectId, String>, ApiError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let subjects: Vec<SubjectRecord> = self
            .mongo
            .collection::<SubjectRecord>("subjects")
            .find(doc! { "_id": { "$in": ids.to_vec() } })
            .await?
            .try_collect()
            .await?;
        Ok(subjects.into_iter().map(|s| (s.id, s.name)).collect())
    }

    async fn module_names(&self, ids: &[ObjectId]) -> Result<HashMap<ObjectId, String>, ApiError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let modules: Vec<ModuleRecord> = self
            .mongo
            .collection::<ModuleRecord>("modules")
            .find(doc! { "_id": { "$in": ids.to_vec() } })
            .await?
            .try_collect()
            .await?;
        Ok(modules.into_iter().map(|m| (m.id, m.name)).collect())
    }

    /// Loads the full content hierarchy for the given subjects in four
    /// bulk reads: subjects, their sources, the modules underneath and
    /// every question in those modules.
    async fn load_hierarchy(
        &self,
        subject_ids: &HashSet<ObjectId>,
    ) -> Result<Hierarchy, ApiError> {
        let ids: Vec<ObjectId> = subject_ids.iter().copied().collect();

        let subjects: Vec<SubjectRecord> = self
            .mongo
            .collection::<SubjectRecord>("subjects")
            .find(doc! { "_id": { "$in": ids } })
            .sort(doc! { "name": 1 })
            .await?
            .try_collect()
            .await?;

        let subject_id_list: Vec<ObjectId> = subjects.iter().map(|s| s.id).collect();
        let sources: Vec<SourceRecord> = if subject_id_list.is_empty() {
            Vec::new()
        } else {
            self.mongo
                .collection::<SourceRecord>("sources")
                .find(doc! { "subject_id": { "$in": subject_id_list } })
                .await?
                .try_collect()
                .await?
        };

        let source_ids: Vec<ObjectId> = sources.iter().map(|s| s.id).collect();
        let modules: Vec<ModuleRecord> = if source_ids.is_empty() {
            Vec::new()
        } else {
            self.mongo
                .collection::<ModuleRecord>("modules")
                .find(doc! { "source_id": { "$in": source_ids } })
                .await?
                .try_collect()
                .await?
        };

        let module_ids: Vec<ObjectId> = modules.iter().map(|m| m.id).collect();
        let questions: Vec<QuestionRecord> = if module_ids.is_empty() {
            Vec::new()
        } else {
            self.mongo
                .collection::<QuestionRecord>("questions")
                .find(doc! { "module_id": { "$in": module_ids } })
                .await?
                .try_collect()
                .await?
        };

        Ok(Hierarchy {
            subjects,
            sources,
            modules,
            questions,
        })
    }
}

struct SessionAttribution {
    subject_id: ObjectId,
    module_id: ObjectId,
}

struct Hierarchy {
    subjects: Vec<SubjectRecord>,
    sources: Vec<SourceRecord>,
    modules: Vec<ModuleRecord>,
    questions: Vec<QuestionRecord>,
}

impl Hierarchy {
    fn subject_of_module(&self, module_id: &ObjectId) -> Option<ObjectId> {
        let module = self.modules.iter().find(|m| m.id == *module_id)?;
        let source = self.sources.iter().find(|s| s.id == module.source_id)?;
        Some(source.subject_id)
    }
}

/// Leaderboard rows round-trip through Redis as JSON.
#[derive(serde::Serialize, serde::Deserialize)]
struct CachedLeaderboardEntry {
    user_id: String,
    name: String,
    email: String,
    avg_score: i32,
    total_quiz: usize,
    points: i64,
}

impl From<&LeaderboardEntry> for CachedLeaderboardEntry {
    fn from(entry: &LeaderboardEntry) -> Self {
        Self {
            user_id: entry.user_id.clone(),
            name: entry.name.clone(),
            email: entry.email.clone(),
            avg_score: entry.avg_score,
            total_quiz: entry.total_quiz,
            points: entry.points,
        }
    }
}

impl From<CachedLeaderboardEntry> for LeaderboardEntry {
    fn from(entry: CachedLeaderboardEntry) -> Self {
        Self {
            user_id: entry.user_id,
            name: entry.name,
            email: entry.email,
            avg_score: entry.avg_score,
            total_quiz: entry.total_quiz,
            points: entry.points,
        }
    }
}

/// Percentage of mastered questions, rounded. Empty subjects sit at 0.
pub fn progress_percent(mastered: usize, total: usize) -> i32 {
    if total == 0 {
        return 0;
    }
    ((mastered as f64 / total as f64) * 100.0).round() as i32
}

/// Rounded mean of session scores; no sessions means 0.
pub fn average_score(scores: &[i32]) -> i32 {
    if scores.is_empty() {
        return 0;
    }
    let total: i64 = scores.iter().map(|s| *s as i64).sum();
    average_score_i64(total, scores.len())
}

fn average_score_i64(total: i64, count: usize) -> i32 {
    if count == 0 {
        return 0;
    }
    (total as f64 / count as f64).round() as i32
}

/// Global figures are recomputed from the summed totals, never averaged
/// from per-subject percentages.
pub fn global_progress(per_subject: &[(usize, usize)]) -> GlobalProgress {
    let total: usize = per_subject.iter().map(|(total, _)| *total).sum();
    let mastered: usize = per_subject.iter().map(|(_, mastered)| *mastered).sum();

    GlobalProgress {
        total_questions: total,
        mastered,
        progress: progress_percent(mastered, total),
        remaining: total.saturating_sub(mastered),
    }
}

/// Achievement tier shown on the profile page, by cumulative score.
pub fn achievement_level(total_score: i64) -> &'static str {
    if total_score > 2000 {
        "Quiz Legend"
    } else if total_score > 1000 {
        "Class Star"
    } else if total_score > 500 {
        "Diligent Student"
    } else {
        "Beginner"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_matches_expected_percentages() {
        assert_eq!(progress_percent(15, 20), 75);
        assert_eq!(progress_percent(0, 50), 0);
        assert_eq!(progress_percent(50, 50), 100);
        assert_eq!(progress_percent(0, 0), 0);
    }

    #[test]
    fn remaining_follows_total_minus_mastered() {
        let global = global_progress(&[(20, 15)]);
        assert_eq!(global.progress, 75);
        assert_eq!(global.remaining, 5);
    }

    #[test]
    fn global_progress_sums_before_dividing() {
        // Two subjects of unequal size: 20 questions with 15 mastered and
        // 5 questions with none. Summing first gives 15/25 = 60; averaging
        // the percentages would give (75 + 0) / 2 = 38. The former is
        // correct.
        let global = global_progress(&[(20, 15), (5, 0)]);
        assert_eq!(global.total_questions, 25);
        assert_eq!(global.mastered, 15);
        assert_eq!(global.progress, 60);
        assert_eq!(global.remaining, 10);
    }

    #[test]
    fn average_score_rounds_half_up() {
        assert_eq!(average_score(&[75, 80]), 78); // 77.5 rounds to 78
        assert_eq!(average_score(&[100, 0, 50]), 50);
        assert_eq!(average_score(&[]), 0);
    }

    #[test]
    fn achievement_tiers() {
        assert_eq!(achievement_level(0), "Beginner");
        assert_eq!(achievement_level(500), "Beginner");
        assert_eq!(achievement_level(501), "Diligent Student");
        assert_eq!(achievement_level(1500), "Class Star");
        assert_eq!(achievement_level(2500), "Quiz Legend");
    }
}
