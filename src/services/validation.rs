//! Field-level validation errors shared by services and HTML forms

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use validator::{ValidateEmail, ValidationErrors};

/// Letters, digits and `@ . + - _`, 1 to 150 characters
static USERNAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\w.@+-]{1,150}$").expect("username pattern is valid")
});

/// Key for errors that belong to the form as a whole
pub const NON_FIELD: &str = "__all__";

/// Messages per form field, in field-name order.
///
/// Serialises as a map so templates can do `errors.username`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn extend(&mut self, other: FieldErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `Ok(())` when nothing was recorded
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, messages)| format!("{}: {}", field, messages.join(" ")))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl From<ValidationErrors> for FieldErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut out = FieldErrors::new();
        for (field, errs) in errors.field_errors() {
            for err in errs.iter() {
                let message = err
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Valeur invalide ({})", err.code));
                out.add(&field.to_string(), message);
            }
        }
        out
    }
}

/// Username shape: 150 characters or fewer, letters, digits and `@ . + - _`.
pub fn check_username(username: &str, errors: &mut FieldErrors) {
    if username.is_empty() {
        errors.add("username", "Ce champ est obligatoire.");
    } else if !USERNAME_RE.is_match(username) {
        errors.add(
            "username",
            "Saisissez un nom d'utilisateur valide. Il ne peut contenir que des lettres, \
             des nombres ou les caractères « @ », « . », « + », « - » et « _ » (150 au maximum).",
        );
    }
}

pub fn check_email(email: &str, errors: &mut FieldErrors) {
    if email.is_empty() {
        errors.add("email", "Ce champ est obligatoire.");
    } else if !email.validate_email() {
        errors.add("email", "Saisissez une adresse e-mail valide.");
    }
}

/// Required text of at most `max` characters
pub fn check_length(field: &str, value: &str, min: usize, max: usize, errors: &mut FieldErrors) {
    let len = value.chars().count();
    if len < min {
        if min <= 1 {
            errors.add(field, "Ce champ est obligatoire.");
        } else {
            errors.add(field, format!("Au moins {} caractères sont requis.", min));
        }
    } else if len > max {
        errors.add(
            field,
            format!("Assurez-vous que cette valeur comporte au plus {} caractères.", max),
        );
    }
}
