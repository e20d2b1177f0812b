//! Comment repository

use crate::config::DatabaseDriver;
use crate::db::pool::{require_mysql, require_sqlite};
use crate::db::DynDatabasePool;
use crate::models::{Comment, CommentWithMeta};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;

/// Comment repository trait
#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn create(&self, comment: &Comment) -> Result<Comment>;

    /// Comments of a post with their authors, newest first
    async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentWithMeta>>;

    async fn count_for_post(&self, post_id: i64) -> Result<i64>;
}

pub struct SqlxCommentRepository {
    pool: DynDatabasePool,
}

impl SqlxCommentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

const LIST_SQL: &str = r#"
    SELECT c.id, c.post_id, c.user_id, c.content, c.timestamp, u.username
    FROM comments c
    INNER JOIN users u ON u.id = c.user_id
    WHERE c.post_id = ?
    ORDER BY c.timestamp DESC, c.id DESC
"#;

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create(&self, comment: &Comment) -> Result<Comment> {
        let sql = "INSERT INTO comments (post_id, user_id, content, timestamp) VALUES (?, ?, ?, ?)";
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(comment.post_id)
                .bind(comment.user_id)
                .bind(&comment.content)
                .bind(comment.timestamp)
                .execute(require_sqlite(&self.pool)?)
                .await
                .context("Failed to create comment")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(comment.post_id)
                .bind(comment.user_id)
                .bind(&comment.content)
                .bind(comment.timestamp)
                .execute(require_mysql(&self.pool)?)
                .await
                .context("Failed to create comment")?
                .last_insert_id() as i64,
        };

        Ok(Comment {
            id,
            ..comment.clone()
        })
    }

    async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentWithMeta>> {
        let comments: Vec<CommentWithMeta> = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(LIST_SQL)
                    .bind(post_id)
                    .fetch_all(require_sqlite(&self.pool)?)
                    .await
                    .context("Failed to list comments")?;
                rows.iter()
                    .map(|row| CommentWithMeta {
                        comment: Comment {
                            id: row.get("id"),
                            post_id: row.get("post_id"),
                            user_id: row.get("user_id"),
                            content: row.get("content"),
                            timestamp: row.get("timestamp"),
                        },
                        username: row.get("username"),
                    })
                    .collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(LIST_SQL)
                    .bind(post_id)
                    .fetch_all(require_mysql(&self.pool)?)
                    .await
                    .context("Failed to list comments")?;
                rows.iter()
                    .map(|row| CommentWithMeta {
                        comment: Comment {
                            id: row.get("id"),
                            post_id: row.get("post_id"),
                            user_id: row.get("user_id"),
                            content: row.get("content"),
                            timestamp: row.get("timestamp"),
                        },
                        username: row.get("username"),
                    })
                    .collect()
            }
        };
        Ok(comments)
    }

    async fn count_for_post(&self, post_id: i64) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM comments WHERE post_id = ?";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(post_id)
                .fetch_one(require_sqlite(&self.pool)?)
                .await
                .context("Failed to count comments")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(post_id)
                .fetch_one(require_mysql(&self.pool)?)
                .await
                .context("Failed to count comments")?
                .get("count"),
        };
        Ok(count)
    }
}
