//! One-shot flash messages
//!
//! A handler that redirects after a successful form attaches messages to the
//! redirect in a cookie. The next page that renders shows them and the
//! cookie is cleared on that response.

use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Redirect, Response};
use serde::{Deserialize, Serialize};

use super::middleware::read_cookie;

pub const FLASH_COOKIE: &str = "mutadi_messages";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashMessage {
    pub level: FlashLevel,
    pub text: String,
}

impl FlashMessage {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Success,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Warning,
            text: text.into(),
        }
    }
}

/// Messages carried by the request's flash cookie. A missing or mangled
/// cookie reads as no messages.
pub fn read(headers: &HeaderMap) -> Vec<FlashMessage> {
    read_cookie(headers, FLASH_COOKIE)
        .map(decode)
        .unwrap_or_default()
}

pub fn encode(messages: &[FlashMessage]) -> String {
    let json = serde_json::to_string(messages).unwrap_or_else(|_| "[]".to_string());
    urlencoding::encode(&json).into_owned()
}

pub fn decode(raw: &str) -> Vec<FlashMessage> {
    urlencoding::decode(raw)
        .ok()
        .and_then(|json| serde_json::from_str(&json).ok())
        .unwrap_or_default()
}

fn set_cookie(messages: &[FlashMessage], secure: bool) -> Option<HeaderValue> {
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax{}",
        FLASH_COOKIE,
        encode(messages),
        if secure { "; Secure" } else { "" }
    );
    HeaderValue::from_str(&cookie).ok()
}

pub fn clear_cookie() -> HeaderValue {
    HeaderValue::from_static("mutadi_messages=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Whether a response already sets the flash cookie
pub fn sets_flash(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .any(|c| c.starts_with(FLASH_COOKIE))
}

/// 303 redirect to `to` carrying `message`
pub fn redirect(to: &str, message: FlashMessage, secure: bool) -> Response {
    let mut response = Redirect::to(to).into_response();
    if let Some(cookie) = set_cookie(&[message], secure) {
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }
    response
}
