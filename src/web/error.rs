//! Web error responses
//!
//! Handlers return [`WebError`] for anything that is not a form problem.
//! The response only carries an [`ErrorPage`] marker; the request context
//! middleware turns it into a rendered `error.html` once it knows who is
//! asking.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};

use crate::services::{
    CategoryServiceError, CommentServiceError, MessageServiceError, PostServiceError,
    ProfileServiceError, UserServiceError,
};

#[derive(Debug, thiserror::Error)]
pub enum WebError {
    #[error("Not found")]
    NotFound,

    #[error("Forbidden")]
    Forbidden,

    /// Anonymous access to a login-only page; carries the requested path
    #[error("Login required for {0}")]
    LoginRequired(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Marker left on error responses for the error page renderer
#[derive(Debug, Clone)]
pub struct ErrorPage {
    pub status: StatusCode,
    pub message: String,
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            WebError::LoginRequired(next) => {
                let to = format!("/members/login/?next={}", urlencoding::encode(&next));
                return Redirect::to(&to).into_response();
            }
            WebError::NotFound => (StatusCode::NOT_FOUND, "La page demandée est introuvable.".to_string()),
            WebError::Forbidden => (
                StatusCode::FORBIDDEN,
                "Vous n'avez pas la permission d'accéder à cette page.".to_string(),
            ),
            WebError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            WebError::Internal(e) => {
                tracing::error!("Request failed: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Une erreur interne est survenue.".to_string(),
                )
            }
        };

        let mut response = (status, message.clone()).into_response();
        response.extensions_mut().insert(ErrorPage { status, message });
        response
    }
}

// Non-form service errors. Validation and conflict errors are handled by
// the handlers, which re-render their form; reaching these arms is a bug.

impl From<UserServiceError> for WebError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::NotFound => WebError::NotFound,
            UserServiceError::InternalError(e) => WebError::Internal(e),
            other => WebError::Internal(anyhow::anyhow!("Unhandled user error: {}", other)),
        }
    }
}

impl From<ProfileServiceError> for WebError {
    fn from(e: ProfileServiceError) -> Self {
        match e {
            ProfileServiceError::NotFound => WebError::NotFound,
            ProfileServiceError::Forbidden => WebError::Forbidden,
            ProfileServiceError::InternalError(e) => WebError::Internal(e),
            other => WebError::Internal(anyhow::anyhow!("Unhandled profile error: {}", other)),
        }
    }
}

impl From<PostServiceError> for WebError {
    fn from(e: PostServiceError) -> Self {
        match e {
            PostServiceError::NotFound(_) => WebError::NotFound,
            PostServiceError::Forbidden => WebError::Forbidden,
            PostServiceError::InternalError(e) => WebError::Internal(e),
            other => WebError::Internal(anyhow::anyhow!("Unhandled post error: {}", other)),
        }
    }
}

impl From<CategoryServiceError> for WebError {
    fn from(e: CategoryServiceError) -> Self {
        match e {
            CategoryServiceError::NotFound(_) => WebError::NotFound,
            CategoryServiceError::Forbidden => WebError::Forbidden,
            CategoryServiceError::InternalError(e) => WebError::Internal(e),
            other => WebError::Internal(anyhow::anyhow!("Unhandled category error: {}", other)),
        }
    }
}

impl From<CommentServiceError> for WebError {
    fn from(e: CommentServiceError) -> Self {
        match e {
            CommentServiceError::PostNotFound(_) => WebError::NotFound,
            CommentServiceError::InternalError(e) => WebError::Internal(e),
            other => WebError::Internal(anyhow::anyhow!("Unhandled comment error: {}", other)),
        }
    }
}

impl From<MessageServiceError> for WebError {
    fn from(e: MessageServiceError) -> Self {
        match e {
            MessageServiceError::NotFound(_) => WebError::NotFound,
            MessageServiceError::InternalError(e) => WebError::Internal(e),
            other => WebError::Internal(anyhow::anyhow!("Unhandled message error: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    #[test]
    fn test_login_required_redirects_with_next() {
        let response = WebError::LoginRequired("/messages/inbox/?page=2".into()).into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/members/login/?next=%2Fmessages%2Finbox%2F%3Fpage%3D2"
        );
    }

    #[test]
    fn test_error_page_marker() {
        let response = WebError::Forbidden.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.extensions().get::<ErrorPage>().unwrap().status,
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_service_errors_map_to_status() {
        assert!(matches!(
            WebError::from(PostServiceError::NotFound(3)),
            WebError::NotFound
        ));
        assert!(matches!(
            WebError::from(ProfileServiceError::Forbidden),
            WebError::Forbidden
        ));
        assert!(matches!(
            WebError::from(MessageServiceError::NotFound(1)),
            WebError::NotFound
        ));
    }
}
