//! Comment model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Comment joined with its author's username
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentWithMeta {
    #[serde(flatten)]
    pub comment: Comment,
    pub username: String,
}

#[derive(Debug, Clone)]
pub struct CreateCommentInput {
    pub post_id: i64,
    pub content: String,
}

impl CreateCommentInput {
    pub fn new(post_id: i64, content: impl Into<String>) -> Self {
        Self {
            post_id,
            content: content.into(),
        }
    }
}
