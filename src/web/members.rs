//! Member pages: registration, login, settings, password and profiles

use axum::{
    extract::{Multipart, Path, Query, State},
    http::header,
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use tera::Context as TeraContext;
use validator::Validate;

use super::flash::FlashMessage;
use super::forms::{
    read_profile_form, safe_next, LoginForm, NextQuery, PasswordForm, RegisterForm,
    RegisterValues, SettingsForm,
};
use super::middleware::{clear_session_cookie, session_cookie};
use super::{parse_pk, AppState, AuthenticatedUser, RequestContext, WebError};
use crate::models::{CreateUserInput, UpdateUserInput, User};
use crate::services::{FieldErrors, ProfileServiceError, UserServiceError, NON_FIELD};

const LOGIN_FAILED: &str = "Saisissez un nom d'utilisateur et un mot de passe valides. \
     Remarquez que chacun de ces champs est sensible à la casse \
     (différenciation des majuscules/minuscules).";
const LOGIN_LIMITED: &str =
    "Trop de tentatives de connexion. Veuillez réessayer dans quelques minutes.";

// ============================================================================
// Registration
// ============================================================================

pub async fn register_page(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Html<String>, WebError> {
    render_register(&state, &ctx, RegisterValues::default(), &FieldErrors::new())
}

pub async fn register(
    State(state): State<AppState>,
    ctx: RequestContext,
    Form(form): Form<RegisterForm>,
) -> Result<Response, WebError> {
    let input = CreateUserInput::new(form.username.trim(), form.email.trim(), &form.password1)
        .with_names(form.first_name.trim(), form.last_name.trim())
        .with_confirmation(&form.password2);

    match state.user_service.register(input).await {
        Ok(user) => Ok(state.redirect(
            "/members/login/",
            FlashMessage::success(format!(
                "Le compte de {} a été créé avec succès !",
                user.username
            )),
        )),
        Err(UserServiceError::Validation(errors)) | Err(UserServiceError::Conflict(errors)) => {
            Ok(render_register(&state, &ctx, form.values(), &errors)?.into_response())
        }
        Err(e) => Err(e.into()),
    }
}

fn render_register(
    state: &AppState,
    ctx: &RequestContext,
    values: RegisterValues<'_>,
    errors: &FieldErrors,
) -> Result<Html<String>, WebError> {
    let mut context = TeraContext::new();
    context.insert("form", &values);
    context.insert("errors", errors);
    state.render(ctx, "registration/register.html", &context)
}

// ============================================================================
// Login / logout
// ============================================================================

pub async fn login_page(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<NextQuery>,
) -> Result<Html<String>, WebError> {
    render_login(&state, &ctx, "", query.next.as_deref(), &FieldErrors::new())
}

pub async fn login(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<NextQuery>,
    Form(form): Form<LoginForm>,
) -> Result<Response, WebError> {
    let next = form.next.as_deref().or(query.next.as_deref());

    if let Err(e) = form.validate() {
        let errors = FieldErrors::from(e);
        return Ok(render_login(&state, &ctx, &form.username, next, &errors)?.into_response());
    }

    let session = match state.user_service.login(&form.username, &form.password).await {
        Ok(session) => session,
        Err(UserServiceError::InvalidCredentials) => {
            let errors = FieldErrors::single(NON_FIELD, LOGIN_FAILED);
            return Ok(render_login(&state, &ctx, &form.username, next, &errors)?.into_response());
        }
        Err(UserServiceError::TooManyAttempts) => {
            let errors = FieldErrors::single(NON_FIELD, LOGIN_LIMITED);
            return Ok(render_login(&state, &ctx, &form.username, next, &errors)?.into_response());
        }
        Err(e) => return Err(e.into()),
    };

    let mut response = Redirect::to(&safe_next(next)).into_response();
    if let Some(cookie) = session_cookie(&state, &session.id) {
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }
    Ok(response)
}

fn render_login(
    state: &AppState,
    ctx: &RequestContext,
    username: &str,
    next: Option<&str>,
    errors: &FieldErrors,
) -> Result<Html<String>, WebError> {
    let mut context = TeraContext::new();
    context.insert("username", username);
    context.insert("next", &next.map(|n| safe_next(Some(n))));
    context.insert("errors", errors);
    state.render(ctx, "registration/login.html", &context)
}

/// GET or POST /members/logout/
pub async fn logout(State(state): State<AppState>, ctx: RequestContext) -> Result<Response, WebError> {
    if let Some(token) = ctx.session_id.as_deref() {
        state.user_service.logout(token).await?;
    }

    let mut response = Redirect::to("/").into_response();
    if let Some(cookie) = clear_session_cookie(&state) {
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }
    Ok(response)
}

// ============================================================================
// Account settings
// ============================================================================

pub async fn edit_settings_page(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Html<String>, WebError> {
    let form = SettingsForm {
        username: user.username,
        first_name: user.first_name,
        last_name: user.last_name,
        email: user.email,
    };
    render_settings(&state, &ctx, &form, &FieldErrors::new())
}

pub async fn edit_settings(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthenticatedUser(user): AuthenticatedUser,
    Form(form): Form<SettingsForm>,
) -> Result<Response, WebError> {
    let input = UpdateUserInput {
        username: form.username.trim().to_string(),
        email: form.email.trim().to_string(),
        first_name: form.first_name.clone(),
        last_name: form.last_name.clone(),
    };

    match state.user_service.update_settings(user.id, input).await {
        Ok(_) => Ok(state.redirect(
            "/",
            FlashMessage::success("Vos paramètres ont été mis à jour avec succès !"),
        )),
        Err(UserServiceError::Validation(errors)) | Err(UserServiceError::Conflict(errors)) => {
            Ok(render_settings(&state, &ctx, &form, &errors)?.into_response())
        }
        Err(e) => Err(e.into()),
    }
}

fn render_settings(
    state: &AppState,
    ctx: &RequestContext,
    form: &SettingsForm,
    errors: &FieldErrors,
) -> Result<Html<String>, WebError> {
    let mut context = TeraContext::new();
    context.insert("form", form);
    context.insert("errors", errors);
    state.render(ctx, "registration/edit_user_settings.html", &context)
}

// ============================================================================
// Password change
// ============================================================================

pub async fn change_password_page(
    State(state): State<AppState>,
    ctx: RequestContext,
    _user: AuthenticatedUser,
) -> Result<Html<String>, WebError> {
    render_change_password(&state, &ctx, &FieldErrors::new())
}

pub async fn change_password(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthenticatedUser(user): AuthenticatedUser,
    Form(form): Form<PasswordForm>,
) -> Result<Response, WebError> {
    let result = state
        .user_service
        .change_password(
            user.id,
            &form.old_password,
            &form.new_password1,
            &form.new_password2,
        )
        .await;

    match result {
        Ok(session) => {
            let mut response = Redirect::to("/members/change_password_success/").into_response();
            if let Some(cookie) = session_cookie(&state, &session.id) {
                response.headers_mut().append(header::SET_COOKIE, cookie);
            }
            Ok(response)
        }
        Err(UserServiceError::Validation(errors)) => {
            Ok(render_change_password(&state, &ctx, &errors)?.into_response())
        }
        Err(e) => Err(e.into()),
    }
}

fn render_change_password(
    state: &AppState,
    ctx: &RequestContext,
    errors: &FieldErrors,
) -> Result<Html<String>, WebError> {
    let mut context = TeraContext::new();
    context.insert("errors", errors);
    state.render(ctx, "registration/change_password.html", &context)
}

pub async fn change_password_success(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Html<String>, WebError> {
    state.render(
        &ctx,
        "registration/change_password_success.html",
        &TeraContext::new(),
    )
}

// ============================================================================
// Profiles
// ============================================================================

/// GET /members/{pk}/profile/
pub async fn show_profile(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(pk): Path<String>,
) -> Result<Html<String>, WebError> {
    let pk = parse_pk(&pk)?;
    let (profile_user, profile) = state.profile_service.show(pk).await?;
    let posts = state.post_service.by_author(pk).await?;

    let mut context = TeraContext::new();
    context.insert("profile_user", &profile_user);
    context.insert("display_name", &profile_user.display_name());
    context.insert("profile", &profile);
    context.insert("posts", &posts);
    context.insert("can_edit", &ctx.user.as_ref().is_some_and(|u| u.can_edit(pk)));
    state.render(&ctx, "registration/user_profile.html", &context)
}

pub async fn edit_profile_page(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(pk): Path<String>,
) -> Result<Html<String>, WebError> {
    let pk = parse_pk(&pk)?;
    let (profile_user, profile) = state.profile_service.show(pk).await?;
    ensure_can_edit(&user, pk)?;
    render_edit_profile(&state, &ctx, &profile_user, &profile.bio, &FieldErrors::new())
}

pub async fn edit_profile(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(pk): Path<String>,
    multipart: Multipart,
) -> Result<Response, WebError> {
    let pk = parse_pk(&pk)?;
    ensure_can_edit(&user, pk)?;
    let update = read_profile_form(multipart).await?;
    let bio = update.bio.clone();

    match state.profile_service.update(&user, pk, update).await {
        Ok(_) => Ok(state.redirect(
            "/",
            FlashMessage::success("Votre profil a été mis à jour avec succès !"),
        )),
        Err(ProfileServiceError::Validation(errors)) => {
            let (profile_user, _) = state.profile_service.show(pk).await?;
            Ok(render_edit_profile(&state, &ctx, &profile_user, &bio, &errors)?.into_response())
        }
        Err(e) => Err(e.into()),
    }
}

fn ensure_can_edit(user: &User, owner_id: i64) -> Result<(), WebError> {
    if user.can_edit(owner_id) {
        Ok(())
    } else {
        Err(WebError::Forbidden)
    }
}

fn render_edit_profile(
    state: &AppState,
    ctx: &RequestContext,
    profile_user: &User,
    bio: &str,
    errors: &FieldErrors,
) -> Result<Html<String>, WebError> {
    let mut context = TeraContext::new();
    context.insert("profile_user", profile_user);
    context.insert("bio", bio);
    context.insert("errors", errors);
    state.render(ctx, "registration/edit_user_profile.html", &context)
}
