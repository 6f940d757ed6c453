//! Cron-endpoint authentication: a single shared secret presented as a bearer token by the
//! scheduler. There are no sessions or roles on this surface; either the caller holds the
//! secret or it gets a 401.

use actix_web::dev::ServiceRequest;
use trs_common::Secret;

/// True when the request carries `Authorization: Bearer <secret>` and the secret is non-empty.
/// An unset secret rejects everything rather than opening the cron surface up.
pub fn cron_token_matches(req: &ServiceRequest, secret: &Secret<String>) -> bool {
    let expected = secret.reveal();
    if expected.is_empty() {
        return false;
    }
    req.headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| token == expected)
        .unwrap_or(false)
}

/// The admin identity attached to manually triggered payouts, read from the `X-Admin-Id`
/// header. Absent or malformed headers fall back to zero ("unattributed admin").
pub fn admin_id(req: &actix_web::HttpRequest) -> i64 {
    req.headers()
        .get("X-Admin-Id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod test {
    use actix_web::test::TestRequest;

    use super::*;

    fn secret() -> Secret<String> {
        Secret::new("hunter2".to_string())
    }

    #[test]
    fn accepts_the_configured_bearer_token() {
        let req = TestRequest::default().insert_header(("Authorization", "Bearer hunter2")).to_srv_request();
        assert!(cron_token_matches(&req, &secret()));
    }

    #[test]
    fn rejects_wrong_missing_or_malformed_tokens() {
        let wrong = TestRequest::default().insert_header(("Authorization", "Bearer nope")).to_srv_request();
        assert!(!cron_token_matches(&wrong, &secret()));
        let missing = TestRequest::default().to_srv_request();
        assert!(!cron_token_matches(&missing, &secret()));
        let malformed = TestRequest::default().insert_header(("Authorization", "hunter2")).to_srv_request();
        assert!(!cron_token_matches(&malformed, &secret()));
    }

    #[test]
    fn an_unset_secret_rejects_everything() {
        let req = TestRequest::default().insert_header(("Authorization", "Bearer ")).to_srv_request();
        assert!(!cron_token_matches(&req, &Secret::default()));
    }

    #[test]
    fn admin_id_falls_back_to_zero() {
        let req = TestRequest::default().insert_header(("X-Admin-Id", "42")).to_http_request();
        assert_eq!(admin_id(&req), 42);
        let bad = TestRequest::default().insert_header(("X-Admin-Id", "forty-two")).to_http_request();
        assert_eq!(admin_id(&bad), 0);
    }
}
