use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};

lazy_static! {
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "HTTP requests by method, normalized path and status",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latency in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Quiz engine metrics
    pub static ref SESSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_sessions_total",
        "Quiz sessions by lifecycle event (created, completed)",
        &["status"]
    )
    .unwrap();

    pub static ref ANSWERS_GRADED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "answers_graded_total",
        "Answers graded at submission, labelled by correctness",
        &["correct"]
    )
    .unwrap();

    pub static ref MASTERY_UPSERTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "mastery_upserts_total",
        "Mastery counter writes (insert = first correct answer, increment = repeat)",
        &["kind"]
    )
    .unwrap();

    pub static ref SELECTION_OUTCOMES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "selection_outcomes_total",
        "Question selection outcomes (selected, all_mastered, empty_scope, ...)",
        &["outcome"]
    )
    .unwrap();
}

pub fn render_metrics() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|err| prometheus::Error::Msg(format!("Metrics are not valid UTF-8: {}", err)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accept_labels() {
        SESSIONS_TOTAL.with_label_values(&["created"]).inc();
        SELECTION_OUTCOMES_TOTAL
            .with_label_values(&["all_mastered"])
            .inc();
    }

    #[test]
    fn rendered_output_contains_registered_families() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/health", "200"])
            .inc();

        let output = render_metrics().unwrap();
        assert!(output.contains("http_requests_total"));
    }
}
