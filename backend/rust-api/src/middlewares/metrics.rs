use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::metrics::{HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS};

/// Records request count and latency for every HTTP request.
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&method, &path])
        .observe(start.elapsed().as_secs_f64());

    response
}

/// Collapses dynamic path segments (ObjectId hex, UUIDs, numeric ids)
/// into `{id}` so the path label stays low-cardinality.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if is_dynamic_segment(segment) {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_dynamic_segment(segment: &str) -> bool {
    let object_id = segment.len() == 24 && segment.chars().all(|c| c.is_ascii_hexdigit());
    let uuid =
        segment.len() == 36 && segment.chars().all(|c| c.is_ascii_hexdigit() || c == '-');
    let numeric = !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit());

    object_id || uuid || numeric
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_segments_collapse_to_id() {
        assert_eq!(
            normalize_path("/api/v1/quiz/sessions/68b3c1f2a9d04e5f6a7b8c9d"),
            "/api/v1/quiz/sessions/{id}"
        );
        assert_eq!(
            normalize_path("/api/v1/quiz/sessions/123/answers"),
            "/api/v1/quiz/sessions/{id}/answers"
        );
        assert_eq!(normalize_path("/health"), "/health");
    }

    #[test]
    fn static_segments_are_kept() {
        assert!(!is_dynamic_segment("sessions"));
        assert!(is_dynamic_segment("68b3c1f2a9d04e5f6a7b8c9d"));
        assert!(is_dynamic_segment("42"));
    }
}
