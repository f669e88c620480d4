//! Small helpers shared by the auth endpoints.

use axum::http::HeaderMap;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use once_cell::sync::Lazy;
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use sha2::{Digest, Sha256};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("invalid email regex"));

#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[must_use]
pub fn valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// 32 random bytes, url-safe base64 without padding.
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Tokens are stored hashed, a database leak must not expose live links.
#[must_use]
pub fn hash_token(token: &str) -> Vec<u8> {
    Sha256::digest(token.as_bytes()).to_vec()
}

#[must_use]
pub fn build_verify_url(frontend_base_url: &str, token: &str) -> String {
    format!("{frontend_base_url}/verify-email?token={token}")
}

#[must_use]
pub fn build_reset_url(frontend_base_url: &str, token: &str) -> String {
    format!("{frontend_base_url}/reset-password?token={token}")
}

/// Client IP from proxy headers, `x-forwarded-for` first then `x-real-ip`.
#[must_use]
pub fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            if let Some(first) = value.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return Some(first.to_string());
                }
            }
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[must_use]
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Ana@Example.COM "), "ana@example.com");
    }

    #[test]
    fn test_valid_email() {
        assert!(valid_email("ana@example.com"));
        assert!(valid_email("a.b+c@sub.example.co"));
        assert!(!valid_email("ana@example"));
        assert!(!valid_email("ana example@example.com"));
        assert!(!valid_email("@example.com"));
        assert!(!valid_email(""));
    }

    #[test]
    fn test_generate_token_shape() {
        let token = generate_token();
        // 32 bytes -> 43 chars of unpadded url-safe base64
        assert_eq!(token.len(), 43);
        assert!(!token.contains('='));
        assert!(!token.contains('+'));
        assert!(!token.contains('/'));
    }

    #[test]
    fn test_generate_token_unique() {
        assert_ne!(generate_token(), generate_token());
    }

    #[test]
    fn test_hash_token_deterministic() {
        let first = hash_token("abc");
        assert_eq!(first.len(), 32);
        assert_eq!(first, hash_token("abc"));
        assert_ne!(first, hash_token("abd"));
    }

    #[test]
    fn test_build_urls() {
        assert_eq!(
            build_verify_url("https://app.example.com", "t0k"),
            "https://app.example.com/verify-email?token=t0k"
        );
        assert_eq!(
            build_reset_url("https://app.example.com", "t0k"),
            "https://app.example.com/reset-password?token=t0k"
        );
    }

    #[test]
    fn test_extract_client_ip_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_extract_client_ip_real_ip_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("198.51.100.2"));
    }

    #[test]
    fn test_extract_client_ip_none() {
        let headers = HeaderMap::new();
        assert_eq!(extract_client_ip(&headers), None);
    }
}
