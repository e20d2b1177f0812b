//! Password hashing and password rules
//!
//! Hashes are Argon2id PHC strings with a random salt per password.
//! [`check_password_rules`] applies the rules every new password must pass,
//! at registration and on password change.

use anyhow::{Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Minimum number of characters in a password.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Passwords refused outright, compared case-insensitively.
const COMMON_PASSWORDS: &[&str] = &[
    "password", "password1", "motdepasse", "azertyuiop", "azerty123", "qwertyuiop",
    "iloveyou", "sunshine", "princess", "football", "baseball", "welcome1", "abcdefgh",
    "bonjour1", "soleil123", "doudou123", "loulou123", "chouchou",
];

/// Hash a password using Argon2id with secure defaults.
///
/// ```ignore
/// use mutadi::services::password::hash_password;
///
/// let hash = hash_password("my_secure_password")?;
/// assert!(hash.starts_with("$argon2id$"));
/// ```
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
        .context("Password hashing failed")?;

    Ok(password_hash.to_string())
}

/// Verify a password against a stored hash.
///
/// Returns `Ok(false)` for a wrong password and an error only when the
/// stored hash cannot be parsed.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))
        .context("Failed to parse password hash")?;

    let argon2 = Argon2::default();

    match argon2.verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow::anyhow!("Password verification failed: {}", e))
            .context("Password verification error"),
    }
}

/// Check a candidate password against the password rules.
///
/// Returns every rule the password breaks, as messages ready to show next
/// to the form field. An empty list means the password is acceptable.
pub fn check_password_rules(password: &str, username: &str) -> Vec<String> {
    let mut problems = Vec::new();

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        problems.push(format!(
            "Ce mot de passe est trop court. Il doit contenir au minimum {} caractères.",
            MIN_PASSWORD_LENGTH
        ));
    }

    let lowered = password.to_lowercase();
    if COMMON_PASSWORDS.contains(&lowered.as_str()) {
        problems.push("Ce mot de passe est trop courant.".to_string());
    }

    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        problems.push("Ce mot de passe est entièrement numérique.".to_string());
    }

    if is_similar_to_username(&lowered, username) {
        problems.push(
            "Le mot de passe est trop semblable au champ « nom d'utilisateur ».".to_string(),
        );
    }

    problems
}

fn is_similar_to_username(lowered_password: &str, username: &str) -> bool {
    let username = username.trim().to_lowercase();
    if username.is_empty() || lowered_password.is_empty() {
        return false;
    }
    lowered_password.contains(&username) || username.contains(lowered_password)
}
