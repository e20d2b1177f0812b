//! Post pages: listings, detail with comments, authoring and categories

use axum::{
    extract::{Multipart, Path, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use tera::Context as TeraContext;

use super::flash::FlashMessage;
use super::forms::{read_post_form, CategoryForm, CommentForm, PageQuery, PostValues, SearchQuery};
use super::{parse_pk, AppState, AuthenticatedUser, RequestContext, WebError};
use crate::models::{CreateCommentInput, PostWithMeta, User};
use crate::services::{CategoryServiceError, CommentServiceError, FieldErrors, PostServiceError};

/// Latest posts and per-category counts shown next to listings
async fn insert_sidebar(state: &AppState, context: &mut TeraContext) -> Result<(), WebError> {
    let latest_posts = state.post_service.latest().await?;
    let category_count = state.category_service.counts().await?;
    context.insert("latest_posts", &latest_posts);
    context.insert("category_count", &category_count);
    Ok(())
}

// ============================================================================
// Listings
// ============================================================================

/// GET /posts/post_list/?page=
pub async fn post_list(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, WebError> {
    let page = state.post_service.list(query.page.as_deref()).await?;

    let mut context = TeraContext::new();
    context.insert("page_obj", &page);
    insert_sidebar(&state, &mut context).await?;
    state.render(&ctx, "posts/post_list.html", &context)
}

/// GET /posts/category/{cats}/?page=
pub async fn category_view(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(cats): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, WebError> {
    let page = state
        .post_service
        .by_category(&cats, query.page.as_deref())
        .await?;

    let mut context = TeraContext::new();
    context.insert("cats", &cats);
    context.insert("page_obj", &page);
    state.render(&ctx, "posts/categories.html", &context)
}

/// GET /posts/search/?q=&page=
pub async fn search_results(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<SearchQuery>,
) -> Result<Html<String>, WebError> {
    let q = query.q.unwrap_or_default();
    let page = state.post_service.search(&q, query.page.as_deref()).await?;

    let mut context = TeraContext::new();
    context.insert("query", q.trim());
    context.insert("page_obj", &page);
    state.render(&ctx, "posts/search_results.html", &context)
}

// ============================================================================
// Detail and comments
// ============================================================================

/// GET /posts/post_detail/{pk}
pub async fn post_detail(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(pk): Path<String>,
) -> Result<Html<String>, WebError> {
    let pk = parse_pk(&pk)?;
    render_detail(&state, &ctx, pk, &CommentForm::default(), &FieldErrors::new()).await
}

/// POST /posts/post_detail/{pk}
pub async fn add_comment(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(pk): Path<String>,
    Form(form): Form<CommentForm>,
) -> Result<Response, WebError> {
    let pk = parse_pk(&pk)?;
    let input = CreateCommentInput::new(pk, form.content.clone());

    match state.comment_service.add(&user, input).await {
        Ok(_) => Ok(Redirect::to(&format!("/posts/post_detail/{}", pk)).into_response()),
        Err(CommentServiceError::Validation(errors)) => {
            Ok(render_detail(&state, &ctx, pk, &form, &errors).await?.into_response())
        }
        Err(e) => Err(e.into()),
    }
}

async fn render_detail(
    state: &AppState,
    ctx: &RequestContext,
    pk: i64,
    form: &CommentForm,
    errors: &FieldErrors,
) -> Result<Html<String>, WebError> {
    let post = state.post_service.get(pk).await?;
    let comments = state.comment_service.list_for_post(pk).await?;
    let can_edit = ctx
        .user
        .as_ref()
        .is_some_and(|u| u.can_edit(post.post.author_id));

    let mut context = TeraContext::new();
    context.insert("comment_count", &post.comment_count);
    context.insert("post", &post);
    context.insert("comments", &comments);
    context.insert("form", form);
    context.insert("errors", errors);
    context.insert("can_edit", &can_edit);
    insert_sidebar(state, &mut context).await?;
    state.render(ctx, "posts/post_detail.html", &context)
}

// ============================================================================
// Authoring
// ============================================================================

pub async fn add_post_page(
    State(state): State<AppState>,
    ctx: RequestContext,
    _user: AuthenticatedUser,
) -> Result<Html<String>, WebError> {
    render_post_form(&state, &ctx, None, &PostValues::default(), &FieldErrors::new()).await
}

pub async fn add_post(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthenticatedUser(user): AuthenticatedUser,
    multipart: Multipart,
) -> Result<Response, WebError> {
    let input = read_post_form(multipart).await?;
    let values = PostValues::from_input(&input);

    match state.post_service.create(&user, input).await {
        Ok(_) => Ok(state.redirect(
            "/",
            FlashMessage::success("La publication a été créée avec succès !"),
        )),
        Err(PostServiceError::Validation(errors)) => {
            Ok(render_post_form(&state, &ctx, None, &values, &errors).await?.into_response())
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn update_post_page(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(pk): Path<String>,
) -> Result<Html<String>, WebError> {
    let post = state.post_service.get_editable(&user, parse_pk(&pk)?).await?;
    let values = PostValues {
        title: post.post.title.clone(),
        overview: post.post.overview.clone(),
        content: post.post.content.clone(),
        featured: post.post.featured,
        status: post.post.status.as_i32(),
        categories: post.categories.iter().map(|c| c.id).collect(),
    };
    render_post_form(&state, &ctx, Some(&post), &values, &FieldErrors::new()).await
}

pub async fn update_post(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(pk): Path<String>,
    multipart: Multipart,
) -> Result<Response, WebError> {
    let pk = parse_pk(&pk)?;
    let post = state.post_service.get_editable(&user, pk).await?;
    let input = read_post_form(multipart).await?;
    let values = PostValues::from_input(&input);

    match state.post_service.update(&user, pk, input).await {
        Ok(_) => Ok(state.redirect(
            "/",
            FlashMessage::success("La publication a été mise à jour avec succès !"),
        )),
        Err(PostServiceError::Validation(errors)) => Ok(render_post_form(
            &state,
            &ctx,
            Some(&post),
            &values,
            &errors,
        )
        .await?
        .into_response()),
        Err(e) => Err(e.into()),
    }
}

async fn render_post_form(
    state: &AppState,
    ctx: &RequestContext,
    post: Option<&PostWithMeta>,
    values: &PostValues,
    errors: &FieldErrors,
) -> Result<Html<String>, WebError> {
    let categories = state.category_service.list().await?;

    let mut context = TeraContext::new();
    context.insert("form", values);
    context.insert("errors", errors);
    context.insert("categories", &categories);
    let template = match post {
        Some(post) => {
            context.insert("post", post);
            "posts/update_post.html"
        }
        None => "posts/add_post.html",
    };
    state.render(ctx, template, &context)
}

pub async fn delete_post_page(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(pk): Path<String>,
) -> Result<Html<String>, WebError> {
    let post = state.post_service.get_editable(&user, parse_pk(&pk)?).await?;

    let mut context = TeraContext::new();
    context.insert("post", &post);
    state.render(&ctx, "posts/delete_post.html", &context)
}

pub async fn delete_post(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(pk): Path<String>,
) -> Result<Response, WebError> {
    state.post_service.delete(&user, parse_pk(&pk)?).await?;
    Ok(state.redirect(
        "/",
        FlashMessage::warning("La publication a été supprimée avec succès !"),
    ))
}

// ============================================================================
// Category management (admins)
// ============================================================================

pub async fn categories_page(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Html<String>, WebError> {
    ensure_admin(&user)?;
    render_categories(&state, &ctx, &CategoryForm::default(), &FieldErrors::new()).await
}

pub async fn add_category(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthenticatedUser(user): AuthenticatedUser,
    Form(form): Form<CategoryForm>,
) -> Result<Response, WebError> {
    match state.category_service.create(&user, &form.title).await {
        Ok(category) => Ok(state.redirect(
            "/posts/categories/",
            FlashMessage::success(format!(
                "La catégorie {} a été ajoutée avec succès !",
                category.title
            )),
        )),
        Err(CategoryServiceError::Validation(errors))
        | Err(CategoryServiceError::Conflict(errors)) => {
            Ok(render_categories(&state, &ctx, &form, &errors).await?.into_response())
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn remove_category(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Response, WebError> {
    state.category_service.delete(&user, parse_pk(&id)?).await?;
    Ok(state.redirect(
        "/posts/categories/",
        FlashMessage::warning("La catégorie a été supprimée avec succès !"),
    ))
}

fn ensure_admin(user: &User) -> Result<(), WebError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(WebError::Forbidden)
    }
}

async fn render_categories(
    state: &AppState,
    ctx: &RequestContext,
    form: &CategoryForm,
    errors: &FieldErrors,
) -> Result<Html<String>, WebError> {
    let categories = state.category_service.list().await?;

    let mut context = TeraContext::new();
    context.insert("categories", &categories);
    context.insert("form", form);
    context.insert("errors", errors);
    state.render(ctx, "posts/manage_categories.html", &context)
}
