//! Web layer - HTML handlers and routing
//!
//! Server-rendered pages for the four areas of the site:
//! - pages: home, terms, how it works
//! - members: registration, login, settings, password, profiles
//! - posts: listings, detail and comments, authoring, categories, search
//! - messages: inbox, outbox, compose, reply, delete

pub mod error;
pub mod flash;
pub mod forms;
pub mod members;
pub mod messages;
pub mod middleware;
pub mod pages;
pub mod posts;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue},
    middleware as axum_middleware,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tera::Context as TeraContext;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, services::ServeDir, set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::cache::MemoryCache;
use crate::config::Config;
use crate::db::repositories::{
    SqlxCategoryRepository, SqlxCommentRepository, SqlxPostRepository,
    SqlxPrivateMessageRepository, SqlxProfileRepository, SqlxSessionRepository,
    SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::render::TemplateEngine;
use crate::services::{
    CategoryService, CommentService, MediaStore, MessageService, PostService, ProfileService,
    UserService,
};

pub use error::WebError;
pub use middleware::{AuthenticatedUser, RequestContext};

use flash::FlashMessage;

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub templates: Arc<TemplateEngine>,
    pub user_service: Arc<UserService>,
    pub profile_service: Arc<ProfileService>,
    pub post_service: Arc<PostService>,
    pub category_service: Arc<CategoryService>,
    pub comment_service: Arc<CommentService>,
    pub message_service: Arc<MessageService>,
}

impl AppState {
    /// Wire repositories and services over `pool`
    pub fn new(
        config: Config,
        pool: DynDatabasePool,
        cache: Arc<MemoryCache>,
        templates: TemplateEngine,
    ) -> Self {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let profile_repo = SqlxProfileRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());
        let category_repo = SqlxCategoryRepository::boxed(pool.clone());
        let post_repo = SqlxPostRepository::boxed(pool.clone());
        let comment_repo = SqlxCommentRepository::boxed(pool.clone());
        let message_repo = SqlxPrivateMessageRepository::boxed(pool);

        let media = MediaStore::new(config.media.clone());

        let user_service = UserService::new(user_repo.clone(), profile_repo.clone(), session_repo)
            .with_session_expiration(config.session.expiration_days)
            .with_post_cache(cache.clone());
        let profile_service = ProfileService::new(user_repo.clone(), profile_repo, media.clone());
        let category_service = CategoryService::new(category_repo.clone(), cache.clone());
        let post_service = PostService::new(
            post_repo.clone(),
            user_repo.clone(),
            category_repo,
            comment_repo.clone(),
            cache.clone(),
            media,
        );
        let comment_service = CommentService::new(comment_repo, post_repo, cache);
        let message_service = MessageService::new(message_repo, user_repo);

        Self {
            config: Arc::new(config),
            templates: Arc::new(templates),
            user_service: Arc::new(user_service),
            profile_service: Arc::new(profile_service),
            post_service: Arc::new(post_service),
            category_service: Arc::new(category_service),
            comment_service: Arc::new(comment_service),
            message_service: Arc::new(message_service),
        }
    }

    /// Render a page with the standard variables for this request. A
    /// template failure becomes a 500 error page.
    pub fn render(
        &self,
        ctx: &RequestContext,
        template: &str,
        context: &TeraContext,
    ) -> Result<Html<String>, WebError> {
        let vars = ctx.page_vars(&self.config.site.name);
        self.templates
            .render_page(template, context, &vars)
            .map(Html)
            .map_err(WebError::Internal)
    }

    /// 303 redirect carrying a flash message
    pub fn redirect(&self, to: &str, message: FlashMessage) -> Response {
        flash::redirect(to, message, self.config.environment.is_production())
    }
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    // Pages that need a logged-in member
    let member_routes = Router::new()
        .route(
            "/members/edit_user_settings/",
            get(members::edit_settings_page).post(members::edit_settings),
        )
        .route(
            "/members/password/",
            get(members::change_password_page).post(members::change_password),
        )
        .route(
            "/members/{pk}/edit_user_profile/",
            get(members::edit_profile_page).post(members::edit_profile),
        )
        .route("/posts/add_post/", get(posts::add_post_page).post(posts::add_post))
        .route(
            "/posts/post_detail/edit/{pk}",
            get(posts::update_post_page).post(posts::update_post),
        )
        .route(
            "/posts/post_detail/{pk}/remove",
            get(posts::delete_post_page).post(posts::delete_post),
        )
        .route(
            "/posts/categories/",
            get(posts::categories_page).post(posts::add_category),
        )
        .route("/posts/categories/{id}/remove", post(posts::remove_category))
        .route("/messages/inbox/", get(messages::inbox))
        .route("/messages/outbox/", get(messages::outbox))
        .route(
            "/messages/compose_message/",
            get(messages::compose_page).post(messages::compose),
        )
        .route(
            "/messages/message_detail/{pk}",
            get(messages::message_detail).post(messages::reply),
        )
        .route(
            "/messages/message_detail/{pk}/delete",
            get(messages::delete_message_page).post(messages::delete_message),
        )
        .route_layer(axum_middleware::from_fn(middleware::require_login));

    let public_routes = Router::new()
        .route("/", get(pages::home))
        .route("/tos/", get(pages::tos))
        .route("/how/", get(pages::how))
        .route("/members/register/", get(members::register_page).post(members::register))
        .route("/members/login/", get(members::login_page).post(members::login))
        .route("/members/logout/", get(members::logout).post(members::logout))
        .route(
            "/members/change_password_success/",
            get(members::change_password_success),
        )
        .route("/members/{pk}/profile/", get(members::show_profile))
        .route("/posts/post_list/", get(posts::post_list))
        // Reading is public; commenting checks for a member in the handler
        .route(
            "/posts/post_detail/{pk}",
            get(posts::post_detail).post(posts::add_comment),
        )
        .route("/posts/category/{cats}/", get(posts::category_view))
        .route("/posts/search/", get(posts::search_results));

    // Multipart forms carry one image plus a few text fields
    let body_limit = state.config.media.max_file_size as usize + 1024 * 1024;

    let mut router = Router::new()
        .merge(public_routes)
        .merge(member_routes)
        .nest_service("/media", ServeDir::new(&state.config.media.path))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::request_context,
        ))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new()),
        );

    if state.config.environment.is_production() {
        router = router.layer(SetResponseHeaderLayer::if_not_present(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        ));
    }

    router.with_state(state)
}

async fn not_found() -> Response {
    WebError::NotFound.into_response()
}

/// Primary key from the path; anything but an integer is a 404
pub(crate) fn parse_pk(raw: &str) -> Result<i64, WebError> {
    raw.parse().map_err(|_| WebError::NotFound)
}

#[cfg(test)]
mod tests;
