//! Private message pages

use axum::{
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Response},
    Form,
};
use tera::Context as TeraContext;

use super::flash::FlashMessage;
use super::forms::{MessageForm, PageQuery, ReplyForm};
use super::{parse_pk, AppState, AuthenticatedUser, RequestContext, WebError};
use crate::models::{CreateMessageInput, MessageWithMeta, User};
use crate::services::{FieldErrors, MessageServiceError};

const INBOX: &str = "/messages/inbox/";

pub async fn inbox(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, WebError> {
    let page = state.message_service.inbox(&user, query.page.as_deref()).await?;

    let mut context = TeraContext::new();
    context.insert("page_obj", &page);
    state.render(&ctx, "messages/inbox.html", &context)
}

pub async fn outbox(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, WebError> {
    let page = state.message_service.outbox(&user, query.page.as_deref()).await?;

    let mut context = TeraContext::new();
    context.insert("page_obj", &page);
    state.render(&ctx, "messages/outbox.html", &context)
}

// ============================================================================
// Compose
// ============================================================================

pub async fn compose_page(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Html<String>, WebError> {
    render_compose(&state, &ctx, &user, &MessageForm::default(), &FieldErrors::new()).await
}

pub async fn compose(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthenticatedUser(user): AuthenticatedUser,
    Form(form): Form<MessageForm>,
) -> Result<Response, WebError> {
    let input = CreateMessageInput::new(form.recipient_id(), form.subject.clone(), form.content.clone());

    match state.message_service.compose(&user, input).await {
        Ok(_) => Ok(state.redirect(INBOX, FlashMessage::success("Le message a été envoyé avec succès !"))),
        Err(MessageServiceError::Validation(errors)) => {
            Ok(render_compose(&state, &ctx, &user, &form, &errors).await?.into_response())
        }
        Err(e) => Err(e.into()),
    }
}

async fn render_compose(
    state: &AppState,
    ctx: &RequestContext,
    user: &User,
    form: &MessageForm,
    errors: &FieldErrors,
) -> Result<Html<String>, WebError> {
    let recipients = state.user_service.list_other_users(user.id).await?;

    let mut context = TeraContext::new();
    context.insert("recipients", &recipients);
    context.insert("form", form);
    context.insert("errors", errors);
    state.render(ctx, "messages/compose_message.html", &context)
}

// ============================================================================
// Detail, reply and delete
// ============================================================================

/// GET /messages/message_detail/{pk} - the message and a reply form
pub async fn message_detail(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(pk): Path<String>,
) -> Result<Html<String>, WebError> {
    let message = state.message_service.detail(&user, parse_pk(&pk)?).await?;
    let form = ReplyForm {
        subject: message.message.reply_subject(),
        content: String::new(),
    };
    render_detail(&state, &ctx, &message, &form, &FieldErrors::new())
}

/// POST /messages/message_detail/{pk} - reply to the other party
pub async fn reply(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(pk): Path<String>,
    Form(form): Form<ReplyForm>,
) -> Result<Response, WebError> {
    let pk = parse_pk(&pk)?;

    match state
        .message_service
        .reply(&user, pk, &form.subject, &form.content)
        .await
    {
        Ok(_) => Ok(state.redirect(INBOX, FlashMessage::success("La réponse a été envoyé avec succès !"))),
        Err(MessageServiceError::Validation(errors)) => {
            let message = state.message_service.detail(&user, pk).await?;
            Ok(render_detail(&state, &ctx, &message, &form, &errors)?.into_response())
        }
        Err(e) => Err(e.into()),
    }
}

fn render_detail(
    state: &AppState,
    ctx: &RequestContext,
    message: &MessageWithMeta,
    form: &ReplyForm,
    errors: &FieldErrors,
) -> Result<Html<String>, WebError> {
    let mut context = TeraContext::new();
    context.insert("message", message);
    context.insert("form", form);
    context.insert("errors", errors);
    state.render(ctx, "messages/message_detail.html", &context)
}

pub async fn delete_message_page(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(pk): Path<String>,
) -> Result<Html<String>, WebError> {
    let message = state.message_service.detail(&user, parse_pk(&pk)?).await?;

    let mut context = TeraContext::new();
    context.insert("message", &message);
    state.render(&ctx, "messages/delete_message.html", &context)
}

pub async fn delete_message(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(pk): Path<String>,
) -> Result<Response, WebError> {
    state.message_service.delete(&user, parse_pk(&pk)?).await?;
    Ok(state.redirect(INBOX, FlashMessage::warning("Le message a été supprimé avec succès !")))
}
