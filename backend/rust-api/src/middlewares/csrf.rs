use axum::{
    extract::Request,
    http::{header, Method, StatusCode},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose, Engine as _};
use rand::Rng;

const CSRF_COOKIE_NAME: &str = "csrf_token";
const CSRF_HEADER_NAME: &str = "x-csrf-token";

/// Double-submit cookie CSRF check.
///
/// State-changing requests must present the same token in the
/// `csrf_token` cookie and the `X-CSRF-Token` header. Safe methods pass
/// through untouched.
pub async fn csrf_middleware(request: Request, next: Next) -> Result<Response, StatusCode> {
    let method = request.method();
    if *method == Method::GET || *method == Method::HEAD || *method == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let cookie_token = cookie_value(&request, CSRF_COOKIE_NAME);
    let header_token = request
        .headers()
        .get(CSRF_HEADER_NAME)
        .and_then(|value| value.to_str().ok());

    match (cookie_token.as_deref(), header_token) {
        (Some(cookie), Some(header)) if cookie == header => Ok(next.run(request).await),
        (None, _) => {
            tracing::warn!("CSRF validation failed: missing cookie token");
            Err(StatusCode::FORBIDDEN)
        }
        (_, None) => {
            tracing::warn!("CSRF validation failed: missing header token");
            Err(StatusCode::FORBIDDEN)
        }
        _ => {
            tracing::warn!("CSRF validation failed: token mismatch");
            Err(StatusCode::FORBIDDEN)
        }
    }
}

fn cookie_value(request: &Request, name: &str) -> Option<String> {
    let cookies = request.headers().get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|cookie| {
        let (key, value) = cookie.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

pub fn generate_csrf_token() -> String {
    let random_bytes: [u8; 32] = rand::rng().random();
    general_purpose::URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Attach the token as a cookie so the client can mirror it back in the
/// header on its next state-changing request.
pub fn set_csrf_cookie(mut response: Response, token: &str) -> Response {
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Strict; Secure",
        CSRF_COOKIE_NAME, token
    );
    response
        .headers_mut()
        .insert(header::SET_COOKIE, cookie.parse().unwrap());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique_and_decodable() {
        let first = generate_csrf_token();
        let second = generate_csrf_token();

        assert_ne!(first, second);
        assert_eq!(
            general_purpose::URL_SAFE_NO_PAD
                .decode(&first)
                .unwrap()
                .len(),
            32
        );
    }

    #[test]
    fn cookie_value_finds_the_named_cookie() {
        let request = Request::builder()
            .header(header::COOKIE, "theme=dark; csrf_token=abc123; lang=en")
            .body(axum::body::Body::empty())
            .unwrap();

        assert_eq!(cookie_value(&request, "csrf_token"), Some("abc123".into()));
        assert_eq!(cookie_value(&request, "missing"), None);
    }
}
