//! Failure classification for GoFile responses
//!
//! GoFile reports quota trouble inconsistently: sometimes as HTTP 507, often as
//! a 4xx or even a 200 whose body carries `error-trafficLimit` or similar. The
//! body text is therefore checked before the status code. Only quota signals
//! exhaust an account and only credential rejections disable one; everything
//! else is treated as transient and retried.

use storage::ErrorClassification;

/// Body fragments (lowercase) that indicate an exhausted traffic or storage quota.
const QUOTA_PATTERNS: &[&str] = &[
    "quota",
    "traffic limit",
    "trafficlimit",
    "storage limit",
    "storagelimit",
    "storage exceeded",
    "bandwidth limit",
    "insufficient storage",
    "no space left",
];

/// Body fragments (lowercase) that indicate a rejected credential.
const AUTH_PATTERNS: &[&str] = &["error-auth", "error-token", "invalid token", "unauthorized"];

/// Classify a response body on its own, if it carries a recognisable signal.
///
/// Quota wins over auth when both appear.
pub fn classify_body(body: &str) -> Option<ErrorClassification> {
    let lower = body.to_lowercase();
    if QUOTA_PATTERNS.iter().any(|p| lower.contains(p)) {
        return Some(ErrorClassification::QuotaExceeded);
    }
    if AUTH_PATTERNS.iter().any(|p| lower.contains(p)) {
        return Some(ErrorClassification::Auth);
    }
    None
}

/// Classify a failed response by HTTP status and body.
///
/// Quota text in the body decides first, then 507 is quota, 401/403 are
/// credential rejections, and auth text in the body is a rejection too.
/// Everything else (408, 429, 5xx, unknown) is transient.
pub fn classify_status(status: u16, body: &str) -> ErrorClassification {
    match classify_body(body) {
        Some(ErrorClassification::QuotaExceeded) => ErrorClassification::QuotaExceeded,
        _ if status == 507 => ErrorClassification::QuotaExceeded,
        _ if status == 401 || status == 403 => ErrorClassification::Auth,
        Some(classification) => classification,
        None => ErrorClassification::Transient,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traffic_limit_status_string_is_quota() {
        let body = r#"{"status":"error-trafficLimit","data":{}}"#;
        assert_eq!(classify_body(body), Some(ErrorClassification::QuotaExceeded));
        assert_eq!(classify_status(200, body), ErrorClassification::QuotaExceeded);
    }

    #[test]
    fn quota_text_beats_forbidden_status() {
        let body = r#"{"status":"error","message":"Monthly traffic limit reached"}"#;
        assert_eq!(classify_status(403, body), ErrorClassification::QuotaExceeded);
    }

    #[test]
    fn quota_word_in_any_case() {
        assert_eq!(
            classify_status(400, "Account QUOTA exceeded"),
            ErrorClassification::QuotaExceeded
        );
    }

    #[test]
    fn storage_signals_are_quota() {
        for body in [
            "storage limit reached",
            "error-storageLimit",
            "Storage exceeded for this account",
            "insufficient storage",
            "write failed: no space left on device",
            "bandwidth limit hit",
        ] {
            assert_eq!(
                classify_status(400, body),
                ErrorClassification::QuotaExceeded,
                "body: {body}"
            );
        }
    }

    #[test]
    fn status_507_is_quota() {
        assert_eq!(classify_status(507, ""), ErrorClassification::QuotaExceeded);
    }

    #[test]
    fn unauthorized_and_forbidden_are_permanent() {
        assert_eq!(classify_status(401, ""), ErrorClassification::Auth);
        assert_eq!(classify_status(403, "forbidden"), ErrorClassification::Auth);
    }

    #[test]
    fn auth_text_with_200_is_permanent() {
        assert_eq!(
            classify_status(200, r#"{"status":"error-auth"}"#),
            ErrorClassification::Auth
        );
        assert_eq!(
            classify_status(400, "Invalid token supplied"),
            ErrorClassification::Auth
        );
    }

    #[test]
    fn rate_limit_is_transient() {
        assert_eq!(
            classify_status(429, r#"{"status":"error-rateLimit"}"#),
            ErrorClassification::Transient
        );
        assert_eq!(
            classify_status(429, "rate limit exceeded, slow down"),
            ErrorClassification::Transient
        );
    }

    #[test]
    fn server_errors_are_transient() {
        for status in [408, 500, 502, 503, 504] {
            assert_eq!(
                classify_status(status, "upstream hiccup"),
                ErrorClassification::Transient,
                "status {status}"
            );
        }
    }

    #[test]
    fn unremarkable_body_has_no_classification() {
        assert_eq!(classify_body(r#"{"status":"error-notFound"}"#), None);
        assert_eq!(classify_body(""), None);
    }
}
