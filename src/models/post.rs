//! Post model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Category, UserSummary};

/// A blog post.
///
/// `content` holds the Markdown source and `content_html` its rendered form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub author_id: i64,
    pub overview: String,
    pub content: String,
    pub content_html: String,
    /// Path relative to the media root
    pub thumbnail: String,
    pub featured: bool,
    pub status: PostStatus,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

/// Publication status, stored as an integer column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
}

impl PostStatus {
    pub fn as_i32(self) -> i32 {
        match self {
            PostStatus::Draft => 0,
            PostStatus::Published => 1,
        }
    }

    /// Unknown values read back as drafts.
    pub fn from_i32(value: i32) -> Self {
        match value {
            1 => PostStatus::Published,
            _ => PostStatus::Draft,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PostStatus::Draft => "Non publié",
            PostStatus::Published => "Publié",
        }
    }
}

/// Post joined with what list and detail pages display alongside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostWithMeta {
    #[serde(flatten)]
    pub post: Post,
    pub author: UserSummary,
    pub categories: Vec<Category>,
    pub comment_count: i64,
    pub status_label: String,
}

impl PostWithMeta {
    pub fn new(post: Post, author: UserSummary, categories: Vec<Category>, comment_count: i64) -> Self {
        let status_label = post.status.label().to_string();
        Self {
            post,
            author,
            categories,
            comment_count,
            status_label,
        }
    }
}

/// What the add and edit forms submit.
///
/// `thumbnail` holds the bytes of a newly chosen image. It is required when
/// a post is created; on edit `None` keeps the current image.
#[derive(Debug, Clone, Default)]
pub struct PostInput {
    pub title: String,
    pub overview: String,
    pub content: String,
    pub thumbnail: Option<Vec<u8>>,
    pub featured: bool,
    pub status: PostStatus,
    pub category_ids: Vec<i64>,
}

impl PostInput {
    pub fn new(
        title: impl Into<String>,
        overview: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            overview: overview.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_thumbnail(mut self, bytes: Vec<u8>) -> Self {
        self.thumbnail = Some(bytes);
        self
    }

    pub fn with_categories(mut self, category_ids: Vec<i64>) -> Self {
        self.category_ids = category_ids;
        self
    }

    pub fn featured(mut self, featured: bool) -> Self {
        self.featured = featured;
        self
    }

    pub fn with_status(mut self, status: PostStatus) -> Self {
        self.status = status;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_storage_values() {
        assert_eq!(PostStatus::Draft.as_i32(), 0);
        assert_eq!(PostStatus::Published.as_i32(), 1);
        assert_eq!(PostStatus::from_i32(1), PostStatus::Published);
        assert_eq!(PostStatus::from_i32(7), PostStatus::Draft);
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(PostStatus::Draft.label(), "Non publié");
        assert_eq!(PostStatus::Published.label(), "Publié");
    }
}
