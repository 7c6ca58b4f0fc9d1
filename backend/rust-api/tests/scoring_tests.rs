use mongodb::bson::oid::ObjectId;

use quizbank_api::errors::ApiError;
use quizbank_api::models::catalog::OptionRecord;
use quizbank_api::services::session_service::{first_correct_option, score_percent};
use quizbank_api::services::stats_service::{
    average_score, global_progress, progress_percent,
};

fn option(is_correct: bool) -> OptionRecord {
    OptionRecord {
        id: ObjectId::new(),
        question_id: ObjectId::new(),
        text: "option".into(),
        is_correct,
    }
}

#[test]
fn four_answered_three_correct_scores_75() {
    assert_eq!(score_percent(3, 4), 75);
}

#[test]
fn empty_submission_scores_zero() {
    assert_eq!(score_percent(0, 0), 0);
}

#[test]
fn score_rounds_to_nearest_percent() {
    assert_eq!(score_percent(1, 6), 17); // 16.67
    assert_eq!(score_percent(1, 8), 13); // 12.5 rounds up
    assert_eq!(score_percent(5, 6), 83); // 83.33
}

#[test]
fn grading_uses_the_first_correct_flag() {
    let options = vec![option(false), option(true), option(false)];
    assert_eq!(first_correct_option(&options), Some(options[1].id));

    // Malformed data: several correct flags, the first one wins.
    let malformed = vec![option(true), option(true)];
    assert_eq!(first_correct_option(&malformed), Some(malformed[0].id));

    // No correct flag at all grades every submission as wrong.
    assert_eq!(first_correct_option(&[option(false)]), None);
    assert_eq!(first_correct_option(&[]), None);
}

#[test]
fn subject_progress_figures_match_the_dashboard_contract() {
    // 20 questions, 15 mastered: progress 75, remaining 5.
    assert_eq!(progress_percent(15, 20), 75);
    let global = global_progress(&[(20, 15)]);
    assert_eq!(global.remaining, 5);
    assert_eq!(global.progress, 75);
}

#[test]
fn global_progress_is_not_an_average_of_percentages() {
    // Unequal subjects distinguish sum-then-divide from averaging.
    let global = global_progress(&[(100, 100), (10, 0)]);
    assert_eq!(global.progress, 91); // 100/110, not (100 + 0) / 2
    assert_eq!(global.total_questions, 110);
    assert_eq!(global.mastered, 100);
    assert_eq!(global.remaining, 10);
}

#[test]
fn average_score_handles_empty_and_rounding() {
    assert_eq!(average_score(&[]), 0);
    assert_eq!(average_score(&[67]), 67);
    assert_eq!(average_score(&[70, 75]), 73); // 72.5 rounds up
}

#[test]
fn selection_failures_stay_distinguishable() {
    // The caller must be able to tell these apart, not receive one
    // collapsed error.
    assert_ne!(ApiError::EmptyScope.code(), ApiError::NoQuestions.code());
    assert_ne!(ApiError::NoQuestions.code(), ApiError::AllMastered.code());
    assert_ne!(
        ApiError::AllMastered.code(),
        ApiError::permission_denied("x").code()
    );
    assert_ne!(
        ApiError::AlreadyCompleted { score: 50 }.code(),
        ApiError::AllMastered.code()
    );
}

#[test]
fn all_mastered_message_celebrates_instead_of_alarming() {
    let message = ApiError::AllMastered.to_string();
    assert!(
        message.contains("mastered"),
        "message should mention mastery: {}",
        message
    );
    assert!(!message.to_lowercase().contains("error"));
    assert!(!message.to_lowercase().contains("fail"));
}
