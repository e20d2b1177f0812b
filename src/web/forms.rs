//! HTML form payloads
//!
//! URL-encoded forms deserialize straight into these structs. The two
//! multipart forms (post and profile) are read field by field with
//! [`read_post_form`] and [`read_profile_form`].

use axum::extract::Multipart;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::error::WebError;
use crate::models::{PostInput, PostStatus};
use crate::services::ProfileUpdate;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub page: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct LoginForm {
    #[validate(length(min = 1, message = "Ce champ est obligatoire."))]
    #[serde(default)]
    pub username: String,
    #[validate(length(min = 1, message = "Ce champ est obligatoire."))]
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password1: String,
    #[serde(default)]
    pub password2: String,
}

/// Values echoed back into the register form; passwords never are
#[derive(Debug, Default, Serialize)]
pub struct RegisterValues<'a> {
    pub username: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub email: &'a str,
}

impl RegisterForm {
    pub fn values(&self) -> RegisterValues<'_> {
        RegisterValues {
            username: &self.username,
            first_name: &self.first_name,
            last_name: &self.last_name,
            email: &self.email,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SettingsForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PasswordForm {
    #[serde(default)]
    pub old_password: String,
    #[serde(default)]
    pub new_password1: String,
    #[serde(default)]
    pub new_password2: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CategoryForm {
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MessageForm {
    #[serde(default)]
    pub subject: String,
    /// Recipient id as submitted by the select
    #[serde(default)]
    pub recipient: String,
    #[serde(default)]
    pub content: String,
}

impl MessageForm {
    /// Unparseable ids become 0, which matches no account
    pub fn recipient_id(&self) -> i64 {
        self.recipient.trim().parse().unwrap_or(0)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ReplyForm {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub content: String,
}

/// Text fields of the post form, echoed back on errors
#[derive(Debug, Default, Clone, Serialize)]
pub struct PostValues {
    pub title: String,
    pub overview: String,
    pub content: String,
    pub featured: bool,
    pub status: i32,
    pub categories: Vec<i64>,
}

impl PostValues {
    pub fn from_input(input: &PostInput) -> Self {
        Self {
            title: input.title.clone(),
            overview: input.overview.clone(),
            content: input.content.clone(),
            featured: input.featured,
            status: input.status.as_i32(),
            categories: input.category_ids.clone(),
        }
    }
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> WebError {
    WebError::BadRequest(format!("Formulaire invalide : {}", e))
}

/// Read the add/edit post form. An empty file input counts as no thumbnail.
pub async fn read_post_form(mut multipart: Multipart) -> Result<PostInput, WebError> {
    let mut input = PostInput::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "thumbnail" => {
                let data = field.bytes().await.map_err(multipart_error)?;
                if !data.is_empty() {
                    input.thumbnail = Some(data.to_vec());
                }
            }
            "title" => input.title = field.text().await.map_err(multipart_error)?,
            "overview" => input.overview = field.text().await.map_err(multipart_error)?,
            "content" => input.content = field.text().await.map_err(multipart_error)?,
            "featured" => {
                let value = field.text().await.map_err(multipart_error)?;
                input.featured = matches!(value.as_str(), "on" | "true" | "1");
            }
            "status" => {
                let value = field.text().await.map_err(multipart_error)?;
                input.status = PostStatus::from_i32(value.trim().parse().unwrap_or(0));
            }
            "categories" => {
                let value = field.text().await.map_err(multipart_error)?;
                if let Ok(id) = value.trim().parse::<i64>() {
                    input.category_ids.push(id);
                }
            }
            _ => {}
        }
    }

    Ok(input)
}

/// Read the profile form
pub async fn read_profile_form(mut multipart: Multipart) -> Result<ProfileUpdate, WebError> {
    let mut update = ProfileUpdate::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name().unwrap_or("") {
            "bio" => update.bio = field.text().await.map_err(multipart_error)?,
            "profile_pic" => {
                let data = field.bytes().await.map_err(multipart_error)?;
                if !data.is_empty() {
                    update.picture = Some(data.to_vec());
                }
            }
            _ => {}
        }
    }

    Ok(update)
}

/// `next` if it is a path on this site, `/` otherwise
pub fn safe_next(next: Option<&str>) -> String {
    match next.map(str::trim) {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.contains('\\')
                && !path.chars().any(char::is_control) =>
        {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::FieldErrors;

    #[test]
    fn test_safe_next() {
        assert_eq!(safe_next(Some("/messages/inbox/?page=2")), "/messages/inbox/?page=2");
        assert_eq!(safe_next(Some("https://evil.example")), "/");
        assert_eq!(safe_next(Some("//evil.example")), "/");
        assert_eq!(safe_next(Some("/\\evil.example")), "/");
        assert_eq!(safe_next(None), "/");
    }

    #[test]
    fn test_login_form_requires_both_fields() {
        let form = LoginForm {
            username: String::new(),
            password: "secret".into(),
            next: None,
        };
        let errors: FieldErrors = form.validate().unwrap_err().into();
        assert!(errors.has("username"));
        assert!(!errors.has("password"));
    }

    #[test]
    fn test_message_recipient_id() {
        let mut form = MessageForm::default();
        form.recipient = " 12 ".into();
        assert_eq!(form.recipient_id(), 12);
        form.recipient = "douze".into();
        assert_eq!(form.recipient_id(), 0);
    }
}
