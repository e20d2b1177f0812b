//! User service
//!
//! Accounts and login sessions:
//! - registration (the first account becomes admin, every account gets a profile)
//! - login with username or e-mail, rate limited per username
//! - session validation and logout
//! - account settings and password change

use crate::cache::MemoryCache;
use crate::db::repositories::{ProfileRepository, SessionRepository, UserRepository};
use crate::models::{CreateUserInput, Profile, Session, UpdateUserInput, User, UserRole};
use crate::services::category::CACHE_PATTERN_POSTS;
use crate::services::password::{check_password_rules, hash_password, verify_password};
use crate::services::rate_limiter::LoginRateLimiter;
use crate::services::validation::{check_email, check_length, check_username, FieldErrors};
use anyhow::Context;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Default session expiration time in days
const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 14;

const MAX_NAME_LENGTH: usize = 100;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Unknown user or wrong password
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// Too many failed logins for this username
    #[error("Too many failed login attempts")]
    TooManyAttempts,

    /// Input breaks a field rule
    #[error("Validation error: {0}")]
    Validation(FieldErrors),

    /// Username or e-mail already belongs to another account
    #[error("Conflict: {0}")]
    Conflict(FieldErrors),

    #[error("User not found")]
    NotFound,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// User service for managing users and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    profile_repo: Arc<dyn ProfileRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_expiration_days: i64,
    rate_limiter: LoginRateLimiter,
    /// Post listings embed author names
    post_cache: Option<Arc<MemoryCache>>,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        profile_repo: Arc<dyn ProfileRepository>,
        session_repo: Arc<dyn SessionRepository>,
    ) -> Self {
        Self {
            user_repo,
            profile_repo,
            session_repo,
            session_expiration_days: DEFAULT_SESSION_EXPIRATION_DAYS,
            rate_limiter: LoginRateLimiter::new(),
            post_cache: None,
        }
    }

    /// Cache whose post listings are dropped when an account is renamed
    pub fn with_post_cache(mut self, cache: Arc<MemoryCache>) -> Self {
        self.post_cache = Some(cache);
        self
    }

    /// Sessions issued from now on expire after `days`
    pub fn with_session_expiration(mut self, days: i64) -> Self {
        self.session_expiration_days = days;
        self
    }

    pub fn with_rate_limiter(mut self, rate_limiter: LoginRateLimiter) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub fn session_expiration_days(&self) -> i64 {
        self.session_expiration_days
    }

    /// Register a new account and its profile.
    ///
    /// The first account in an empty database is made admin.
    pub async fn register(&self, input: CreateUserInput) -> Result<User, UserServiceError> {
        let mut errors = FieldErrors::new();
        check_account_fields(
            &input.username,
            &input.email,
            &input.first_name,
            &input.last_name,
            &mut errors,
        );
        check_new_password(
            &input.password,
            &input.password_confirmation,
            &input.username,
            "password2",
            &mut errors,
        );
        errors.into_result().map_err(UserServiceError::Validation)?;

        self.ensure_unique(&input.username, &input.email, None).await?;

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;

        let user = User::new(
            input.username,
            input.email.trim().to_string(),
            input.first_name.trim().to_string(),
            input.last_name.trim().to_string(),
            password_hash,
            UserRole::Member,
        );
        let created = self
            .user_repo
            .create_registered(&user)
            .await
            .context("Failed to create user")?;

        self.profile_repo
            .create(&Profile::for_user(created.id))
            .await
            .context("Failed to create profile")?;

        tracing::info!("Registered user {} ({})", created.username, created.role);
        Ok(created)
    }

    /// Check credentials and open a new session.
    ///
    /// `username_or_email` is tried as a username first, then as an e-mail.
    pub async fn login(
        &self,
        username_or_email: &str,
        password: &str,
    ) -> Result<Session, UserServiceError> {
        let key = username_or_email.trim();
        if self.rate_limiter.is_limited(key).await {
            tracing::warn!("Login refused for {}: too many failed attempts", key);
            return Err(UserServiceError::TooManyAttempts);
        }

        let user = match self.find_user_by_username_or_email(key).await? {
            Some(user) => user,
            None => {
                self.rate_limiter.record_failure(key).await;
                return Err(UserServiceError::InvalidCredentials);
            }
        };

        let password_valid =
            verify_password(password, &user.password_hash).context("Failed to verify password")?;
        if !password_valid {
            self.rate_limiter.record_failure(key).await;
            return Err(UserServiceError::InvalidCredentials);
        }

        self.rate_limiter.clear(key).await;

        let session = self.create_session(user.id).await?;
        self.user_repo
            .update_last_login(user.id, session.created_at)
            .await
            .context("Failed to record last login")?;

        Ok(session)
    }

    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// The user behind a session token, or `None` when the token is unknown
    /// or expired. Expired sessions are removed on sight.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            if let Err(e) = self.session_repo.delete(token).await {
                tracing::warn!("Failed to delete expired session: {:#}", e);
            }
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;

        Ok(user)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        let user = self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?;
        Ok(user)
    }

    pub async fn require_by_id(&self, id: i64) -> Result<User, UserServiceError> {
        self.get_by_id(id).await?.ok_or(UserServiceError::NotFound)
    }

    /// Every account except `user_id`, by username; the recipients a user
    /// can write to.
    pub async fn list_other_users(&self, user_id: i64) -> Result<Vec<User>, UserServiceError> {
        let users = self
            .user_repo
            .list_all()
            .await
            .context("Failed to list users")?;
        Ok(users.into_iter().filter(|u| u.id != user_id).collect())
    }

    /// Change username, e-mail and names of an account.
    pub async fn update_settings(
        &self,
        user_id: i64,
        input: UpdateUserInput,
    ) -> Result<User, UserServiceError> {
        let mut user = self.require_by_id(user_id).await?;
        let previous_username = user.username.clone();

        let mut errors = FieldErrors::new();
        check_account_fields(
            &input.username,
            &input.email,
            &input.first_name,
            &input.last_name,
            &mut errors,
        );
        errors.into_result().map_err(UserServiceError::Validation)?;

        self.ensure_unique(&input.username, &input.email, Some(user_id))
            .await?;

        user.username = input.username;
        user.email = input.email.trim().to_string();
        user.first_name = input.first_name.trim().to_string();
        user.last_name = input.last_name.trim().to_string();

        let updated = self
            .user_repo
            .update(&user)
            .await
            .context("Failed to update user")?;

        if updated.username != previous_username {
            if let Some(cache) = &self.post_cache {
                cache.delete_pattern(CACHE_PATTERN_POSTS).await;
            }
            tracing::info!("User {} renamed to {}", previous_username, updated.username);
        }
        Ok(updated)
    }

    /// Replace the password after checking the current one.
    ///
    /// Every existing session of the user is closed and a fresh session is
    /// returned for the caller to hand back to the browser.
    pub async fn change_password(
        &self,
        user_id: i64,
        old_password: &str,
        new_password: &str,
        new_password_confirmation: &str,
    ) -> Result<Session, UserServiceError> {
        let mut user = self.require_by_id(user_id).await?;

        let mut errors = FieldErrors::new();
        let old_valid =
            verify_password(old_password, &user.password_hash).context("Failed to verify password")?;
        if !old_valid {
            errors.add(
                "old_password",
                "Votre ancien mot de passe est incorrect. Veuillez le rectifier.",
            );
        }
        check_new_password(
            new_password,
            new_password_confirmation,
            &user.username,
            "new_password2",
            &mut errors,
        );
        errors.into_result().map_err(UserServiceError::Validation)?;

        user.password_hash = hash_password(new_password).context("Failed to hash password")?;
        self.user_repo
            .update(&user)
            .await
            .context("Failed to update password")?;

        let session = self.create_session(user.id).await?;
        let closed = self
            .session_repo
            .delete_other_sessions(user.id, &session.id)
            .await
            .context("Failed to close old sessions")?;

        tracing::info!(
            "Password changed for {}, {} other session(s) closed",
            user.username,
            closed
        );
        Ok(session)
    }

    /// Delete all expired sessions. Returns how many were removed.
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        let count = self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?;
        self.rate_limiter.cleanup().await;
        Ok(count)
    }

    // ========================================================================
    // Private helper methods
    // ========================================================================

    /// Username and e-mail must not belong to an account other than `current`
    async fn ensure_unique(
        &self,
        username: &str,
        email: &str,
        current: Option<i64>,
    ) -> Result<(), UserServiceError> {
        let mut conflicts = FieldErrors::new();

        let by_username = self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to check username")?;
        if by_username.is_some_and(|u| Some(u.id) != current) {
            conflicts.add("username", "Un utilisateur avec ce nom existe déjà.");
        }

        let by_email = self
            .user_repo
            .get_by_email(email.trim())
            .await
            .context("Failed to check email")?;
        if by_email.is_some_and(|u| Some(u.id) != current) {
            conflicts.add("email", "Cette adresse e-mail est déjà utilisée.");
        }

        conflicts.into_result().map_err(UserServiceError::Conflict)
    }

    async fn find_user_by_username_or_email(
        &self,
        username_or_email: &str,
    ) -> Result<Option<User>, UserServiceError> {
        if let Some(user) = self
            .user_repo
            .get_by_username(username_or_email)
            .await
            .context("Failed to get user by username")?
        {
            return Ok(Some(user));
        }

        let user = self
            .user_repo
            .get_by_email(username_or_email)
            .await
            .context("Failed to get user by email")?;

        Ok(user)
    }

    async fn create_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id,
            expires_at: now + Duration::days(self.session_expiration_days),
            created_at: now,
        };

        let created = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;

        Ok(created)
    }
}

fn check_account_fields(
    username: &str,
    email: &str,
    first_name: &str,
    last_name: &str,
    errors: &mut FieldErrors,
) {
    check_username(username, errors);
    check_email(email.trim(), errors);
    check_length("first_name", first_name.trim(), 0, MAX_NAME_LENGTH, errors);
    check_length("last_name", last_name.trim(), 0, MAX_NAME_LENGTH, errors);
}

fn check_new_password(
    password: &str,
    confirmation: &str,
    username: &str,
    field: &str,
    errors: &mut FieldErrors,
) {
    if password != confirmation {
        errors.add(field, "Les deux mots de passe ne correspondent pas.");
        return;
    }
    for problem in check_password_rules(password, username) {
        errors.add(field, problem);
    }
}
