//! Web middleware
//!
//! Contains middleware and extractors for:
//! - Session lookup (session cookie to current user)
//! - Flash messages (read on the way in, cleared once shown)
//! - Error pages (rendered from the `ErrorPage` marker)
//! - Login guard for member-only routes

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::{Html, IntoResponse, Response},
};

use super::error::{ErrorPage, WebError};
use super::flash::{self, FlashMessage};
use super::AppState;
use crate::models::{User, UserSummary};
use crate::render::PageVars;

/// Per-request data every handler and template can use
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub user: Option<User>,
    /// Token of the session the request came with
    pub session_id: Option<String>,
    /// Path plus query string
    pub path: String,
    pub messages: Vec<FlashMessage>,
}

impl RequestContext {
    pub fn page_vars(&self, site_name: &str) -> PageVars {
        PageVars::new(site_name, self.path.clone())
            .with_user(self.user.as_ref().map(UserSummary::from))
            .with_messages(self.messages.clone())
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_default())
    }
}

/// The logged-in user; anonymous requests are sent to the login page
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .and_then(|ctx| ctx.user.clone())
            .map(AuthenticatedUser)
            .ok_or_else(|| WebError::LoginRequired(path_and_query(parts.uri.path(), parts.uri.query())))
    }
}

fn path_and_query(path: &str, query: Option<&str>) -> String {
    match query {
        Some(q) if !q.is_empty() => format!("{}?{}", path, q),
        _ => path.to_string(),
    }
}

/// Value of cookie `name` in the request headers
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|s| s.split(';'))
        .filter_map(|c| c.trim().strip_prefix(name)?.strip_prefix('='))
        .find(|v| !v.is_empty())
}

/// Load the session and flash messages, and render error pages.
pub async fn request_context(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let path = path_and_query(request.uri().path(), request.uri().query());
    let cookie_name = &state.config.session.cookie_name;

    let mut ctx = RequestContext {
        path,
        messages: flash::read(request.headers()),
        ..RequestContext::default()
    };

    if let Some(token) = read_cookie(request.headers(), cookie_name).map(str::to_string) {
        match state.user_service.validate_session(&token).await {
            Ok(Some(user)) => {
                ctx.user = Some(user);
                ctx.session_id = Some(token);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Session lookup failed: {}", e),
        }
    }

    request.extensions_mut().insert(ctx.clone());
    let mut response = next.run(request).await;

    if let Some(page) = response.extensions_mut().remove::<ErrorPage>() {
        response = render_error_page(&state, &ctx, &page);
    }

    let shown = !response.status().is_redirection();
    if !ctx.messages.is_empty() && shown && !flash::sets_flash(response.headers()) {
        response
            .headers_mut()
            .append(header::SET_COOKIE, flash::clear_cookie());
    }

    response
}

fn render_error_page(state: &AppState, ctx: &RequestContext, page: &ErrorPage) -> Response {
    let html = state.templates.render_error_page(
        page.status.as_u16(),
        &page.message,
        &ctx.page_vars(&state.config.site.name),
    );
    (page.status, Html(html)).into_response()
}

/// Login guard for member-only routes
pub async fn require_login(request: Request, next: Next) -> Response {
    let logged_in = request
        .extensions()
        .get::<RequestContext>()
        .is_some_and(|ctx| ctx.user.is_some());

    if !logged_in {
        let next_path = path_and_query(request.uri().path(), request.uri().query());
        return WebError::LoginRequired(next_path).into_response();
    }

    next.run(request).await
}

/// `Set-Cookie` value for a new session
pub fn session_cookie(state: &AppState, token: &str) -> Option<HeaderValue> {
    let max_age = state.user_service.session_expiration_days() * 24 * 60 * 60;
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{}",
        state.config.session.cookie_name,
        token,
        max_age,
        if state.config.environment.is_production() { "; Secure" } else { "" }
    );
    HeaderValue::from_str(&cookie).ok()
}

/// `Set-Cookie` value that drops the session cookie
pub fn clear_session_cookie(state: &AppState) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        state.config.session.cookie_name
    ))
    .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; mutadi_session=abc-123; other="),
        );
        assert_eq!(read_cookie(&headers, "mutadi_session"), Some("abc-123"));
        assert_eq!(read_cookie(&headers, "other"), None);
        assert_eq!(read_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_path_and_query() {
        assert_eq!(path_and_query("/posts/", None), "/posts/");
        assert_eq!(path_and_query("/posts/", Some("")), "/posts/");
        assert_eq!(path_and_query("/posts/", Some("page=2")), "/posts/?page=2");
    }
}
