//! Signed session cookie.
//!
//! The cookie value is `<token>.<base64url(HMAC-SHA256(AUTH_SECRET, token))>`,
//! so a forged or truncated token is rejected before any database lookup.

use std::collections::HashMap;

use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::SESSION_TTL_SECS;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "session_token";

fn signature(value: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any size");
    mac.update(value.as_bytes());
    URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
}

pub fn sign_value(value: &str, secret: &str) -> String {
    format!("{}.{}", value, signature(value, secret))
}

/// Returns the unsigned value when the signature matches.
pub fn verify_signed(cookie_value: &str, secret: &str) -> Option<String> {
    let (value, sig) = cookie_value.rsplit_once('.')?;
    if value.is_empty() {
        return None;
    }
    let expected = signature(value, secret);
    bool::from(expected.as_bytes().ct_eq(sig.as_bytes())).then(|| value.to_string())
}

/// Parses a `Cookie` header. The first occurrence of a name wins.
pub fn parse_cookies(header_value: &str) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for pair in header_value.split(';') {
        if let Some((name, value)) = pair.trim().split_once('=') {
            cookies
                .entry(name.trim().to_string())
                .or_insert_with(|| value.trim().trim_matches('"').to_string());
        }
    }
    cookies
}

/// Reads a cookie across all `Cookie` headers of a request.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| parse_cookies(v).remove(name))
}

fn build(value: &str, max_age: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{SESSION_COOKIE}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value for a freshly issued or refreshed session.
pub fn session_cookie(token: &str, secret: &str, secure: bool) -> String {
    build(&sign_value(token, secret), SESSION_TTL_SECS, secure)
}

pub fn expired_session_cookie(secure: bool) -> String {
    build("", 0, secure)
}
