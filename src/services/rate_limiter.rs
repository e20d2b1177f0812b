//! Rate limiter for login attempts
//!
//! Failed logins are counted per username (case-insensitive). After
//! `MAX_FAILED_ATTEMPTS` failures inside the window further attempts are
//! refused until the oldest failure ages out.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

const MAX_FAILED_ATTEMPTS: usize = 5;
const WINDOW_MINUTES: i64 = 15;

/// Login rate limiter
#[derive(Clone)]
pub struct LoginRateLimiter {
    /// Failed login attempts by lower-cased username
    attempts: Arc<RwLock<HashMap<String, Vec<DateTime<Utc>>>>>,
    max_attempts: usize,
    window: Duration,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self::with_limits(MAX_FAILED_ATTEMPTS, Duration::minutes(WINDOW_MINUTES))
    }

    pub fn with_limits(max_attempts: usize, window: Duration) -> Self {
        Self {
            attempts: Arc::new(RwLock::new(HashMap::new())),
            max_attempts,
            window,
        }
    }

    /// Whether the username has used up its failed attempts for now
    pub async fn is_limited(&self, username: &str) -> bool {
        let mut attempts = self.attempts.write().await;
        let cutoff = Utc::now() - self.window;

        let user_attempts = attempts.entry(username.to_lowercase()).or_default();
        user_attempts.retain(|time| *time > cutoff);

        user_attempts.len() >= self.max_attempts
    }

    pub async fn record_failure(&self, username: &str) {
        let mut attempts = self.attempts.write().await;
        attempts
            .entry(username.to_lowercase())
            .or_default()
            .push(Utc::now());
    }

    /// Forget failures after a successful login
    pub async fn clear(&self, username: &str) {
        let mut attempts = self.attempts.write().await;
        attempts.remove(&username.to_lowercase());
    }

    /// Drop entries whose failures have all expired
    pub async fn cleanup(&self) {
        let cutoff = Utc::now() - self.window;
        let mut attempts = self.attempts.write().await;
        attempts.retain(|_, times| {
            times.retain(|time| *time > cutoff);
            !times.is_empty()
        });
    }

    #[cfg(test)]
    async fn tracked_usernames(&self) -> usize {
        self.attempts.read().await.len()
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_username_rate_limit() {
        let limiter = LoginRateLimiter::new();

        for _ in 0..4 {
            assert!(!limiter.is_limited("testuser").await);
            limiter.record_failure("testuser").await;
        }

        limiter.record_failure("testuser").await;
        assert!(limiter.is_limited("testuser").await);

        limiter.clear("testuser").await;
        assert!(!limiter.is_limited("testuser").await);
    }

    #[tokio::test]
    async fn test_case_insensitive_username() {
        let limiter = LoginRateLimiter::new();

        limiter.record_failure("TestUser").await;
        limiter.record_failure("testuser").await;
        limiter.record_failure("TESTUSER").await;
        assert!(!limiter.is_limited("testuser").await);

        limiter.record_failure("testuser").await;
        limiter.record_failure("testuser").await;
        assert!(limiter.is_limited("TestUser").await);
    }

    #[tokio::test]
    async fn test_expired_failures_do_not_count() {
        let limiter = LoginRateLimiter::with_limits(1, Duration::zero());
        limiter.record_failure("bob").await;
        assert!(!limiter.is_limited("bob").await);

        limiter.cleanup().await;
        assert_eq!(limiter.tracked_usernames().await, 0);
    }
}
