//! HTML-form login against the BC sign-in endpoint: harvest session cookies
//! and extract the CSRF token from the anti-forgery cookie. See spec.md
//! §4.1 and §6 "Wire: HTTP login".

use std::collections::HashMap;

use regex::Regex;
use tracing::{debug, instrument, warn};

use crate::error::AuthError;

const ANTI_FORGERY_COOKIE_PREFIX: &str = ".AspNetCore.Antiforgery.";
const ANTI_FORGERY_INPUT_NAME: &str = "__RequestVerificationToken";

/// A minimal cookie jar: just enough to accumulate `Set-Cookie` values
/// across the sign-in GET and POST and replay them as a `Cookie` header.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    cookies: HashMap<String, String>,
}

impl CookieJar {
    pub fn absorb(&mut self, headers: &reqwest::header::HeaderMap) {
        for value in headers.get_all(reqwest::header::SET_COOKIE) {
            let Ok(text) = value.to_str() else { continue };
            let pair = text.split_once(';').map_or(text, |(a, _)| a);
            if let Some((name, value)) = pair.split_once('=') {
                self.cookies.insert(name.trim().to_string(), value.trim().to_string());
            }
        }
    }

    #[must_use]
    pub fn to_header_value(&self) -> String {
        self.cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn find_by_prefix(&self, prefix: &str) -> Option<(&str, &str)> {
        self.cookies
            .iter()
            .find(|(name, _)| name.starts_with(prefix))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Cookies plus the CSRF token extracted from them, ready to hand to the
/// WebSocket transport.
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    pub cookie_header: String,
    pub csrf_token: String,
}

fn extract_anti_forgery_token(html: &str) -> Result<&str, AuthError> {
    let re = Regex::new(&format!(
        r#"name="{ANTI_FORGERY_INPUT_NAME}"\s+[^>]*value="([^"]+)""#
    ))
    .expect("static anti-forgery regex is valid");
    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| AuthError::MalformedLoginPage(format!("no {ANTI_FORGERY_INPUT_NAME} input found")))
}

/// A well-formed BC anti-forgery cookie value looks like a base64url-ish
/// opaque token; we only sanity-check it's non-empty and contains no
/// whitespace, rather than over-fitting a specific length/charset.
fn looks_like_opaque_token(value: &str) -> bool {
    !value.is_empty() && !value.contains(char::is_whitespace)
}

/// Build the HTTP client the sign-in dance runs on. Redirects must be
/// disabled: the POST's success signal is the raw 302 status code (spec.md
/// §4.1/§6) — a client that follows redirects would hand back the
/// post-redirect page's 200 instead and `authenticate` would always see a
/// rejected login.
fn build_login_client() -> Result<reqwest::Client, AuthError> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| AuthError::Http(e.to_string()))
}

/// Perform the sign-in dance against `base_url` for `tenant_id`, consuming
/// `username`/`password` once.
#[instrument(skip(password))]
pub async fn authenticate(
    base_url: &str,
    tenant_id: &str,
    username: &str,
    password: &str,
) -> Result<AuthenticatedSession, AuthError> {
    let client = build_login_client()?;
    let sign_in_url = format!("{base_url}/SignIn?tenant={tenant_id}");

    debug!(%sign_in_url, "fetching sign-in page");
    let get_resp = client
        .get(&sign_in_url)
        .send()
        .await
        .map_err(|e| AuthError::Http(e.to_string()))?;

    let mut jar = CookieJar::default();
    jar.absorb(get_resp.headers());

    let html = get_resp
        .text()
        .await
        .map_err(|e| AuthError::Http(e.to_string()))?;
    let token = extract_anti_forgery_token(&html)?.to_string();

    let body = format!(
        "userName={}&password={}&__RequestVerificationToken={}",
        urlencode(username),
        urlencode(password),
        urlencode(&token)
    );

    debug!("posting credentials");
    let post_resp = client
        .post(&sign_in_url)
        .header("Cookie", jar.to_header_value())
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(body)
        .send()
        .await
        .map_err(|e| AuthError::Http(e.to_string()))?;

    let status = post_resp.status().as_u16();
    if status != 302 {
        warn!(status, "login POST did not redirect");
        return Err(AuthError::LoginRejected { status });
    }

    jar.absorb(post_resp.headers());

    let (_name, value) = jar
        .find_by_prefix(ANTI_FORGERY_COOKIE_PREFIX)
        .filter(|(_, v)| looks_like_opaque_token(v))
        .ok_or(AuthError::CsrfTokenNotFound)?;

    Ok(AuthenticatedSession {
        cookie_header: jar.to_header_value(),
        csrf_token: value.to_string(),
    })
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_anti_forgery_token_from_hidden_input() {
        let html = r#"<form><input type="hidden" name="__RequestVerificationToken" value="abc123XYZ" /></form>"#;
        assert_eq!(extract_anti_forgery_token(html).unwrap(), "abc123XYZ");
    }

    #[test]
    fn missing_token_is_malformed_page_error() {
        let html = "<form></form>";
        assert!(matches!(
            extract_anti_forgery_token(html),
            Err(AuthError::MalformedLoginPage(_))
        ));
    }

    #[test]
    fn cookie_jar_accumulates_and_finds_by_prefix() {
        let mut jar = CookieJar::default();
        let mut headers = reqwest::header::HeaderMap::new();
        headers.append(
            reqwest::header::SET_COOKIE,
            ".AspNetCore.Antiforgery.abcDEF=some-opaque-value; Path=/; HttpOnly"
                .parse()
                .unwrap(),
        );
        jar.absorb(&headers);
        let (name, value) = jar.find_by_prefix(ANTI_FORGERY_COOKIE_PREFIX).unwrap();
        assert!(name.starts_with(ANTI_FORGERY_COOKIE_PREFIX));
        assert_eq!(value, "some-opaque-value");
    }
}
