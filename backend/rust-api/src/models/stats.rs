use serde::Serialize;

/// Per-subject progress block on the student dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct SubjectProgress {
    pub id: String,
    pub name: String,
    pub code: String,
    pub mastery_threshold: i32,
    pub total_questions: usize,
    pub mastered_questions: usize,
    pub progress: i32,
    pub remaining: usize,
    pub quiz_count: usize,
    pub avg_score: i32,
}

/// Global roll-up: sums of the per-subject figures with progress
/// recomputed from the sums, never averaged from percentages.
#[derive(Debug, Clone, Serialize)]
pub struct GlobalProgress {
    pub total_questions: usize,
    pub mastered: usize,
    pub progress: i32,
    pub remaining: usize,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub global: GlobalProgress,
    pub subjects: Vec<SubjectProgress>,
}

#[derive(Debug, Serialize)]
pub struct UserStats {
    pub total_quiz: usize,
    pub avg_score: i32,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub avg_score: i32,
    pub total_quiz: usize,
    pub points: i64,
}

// Analytics drilldown: subject -> source -> module.

#[derive(Debug, Serialize)]
pub struct AnalyticsTotals {
    pub total_questions: usize,
    pub mastered: usize,
    pub progress: i32,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsModule {
    pub id: String,
    pub name: String,
    pub total_questions: usize,
    pub mastered: usize,
    pub progress: i32,
    /// Correct answers over total recorded answers for this module.
    pub accuracy: i32,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsSource {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub modules: Vec<AnalyticsModule>,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsSubject {
    pub id: String,
    pub name: String,
    pub code: String,
    pub stats: AnalyticsTotals,
    pub sources: Vec<AnalyticsSource>,
}

#[derive(Debug, Serialize)]
pub struct ProfileStats {
    pub total_quiz: usize,
    pub total_score: i64,
    pub avg_score: i32,
    pub level: String,
}
