//! Static and home pages

use axum::{extract::State, response::Html};
use tera::Context as TeraContext;

use super::{AppState, RequestContext, WebError};

/// GET / - featured and latest posts
pub async fn home(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Html<String>, WebError> {
    let home = state.post_service.home().await?;

    let mut context = TeraContext::new();
    context.insert("featured_posts", &home.featured_posts);
    context.insert("latest_posts", &home.latest_posts);
    state.render(&ctx, "pages/home.html", &context)
}

/// GET /tos/ - legal notice
pub async fn tos(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Html<String>, WebError> {
    state.render(&ctx, "pages/tos.html", &TeraContext::new())
}

/// GET /how/ - how the site works
pub async fn how(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Html<String>, WebError> {
    state.render(&ctx, "pages/how.html", &TeraContext::new())
}
