//! Post repository
//!
//! Listings are expressed as a [`PostFilter`]; every filter can be counted
//! and paged the same way. Category links live in `post_categories` and are
//! written in the same transaction as the post itself.

use crate::config::DatabaseDriver;
use crate::db::pool::{require_mysql, require_sqlite};
use crate::db::repositories::fold_case;
use crate::db::DynDatabasePool;
use crate::models::{Post, PostStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

const POST_COLUMNS: &str = "p.id, p.title, p.author_id, p.overview, p.content, p.content_html, \
     p.thumbnail, p.featured, p.status, p.created_on, p.updated_on";

/// Which posts a listing contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostFilter {
    /// Every post, newest first
    All,
    /// Featured posts, newest first
    Featured,
    /// Posts filed under the category with this exact title, oldest first
    Category(String),
    /// Posts whose title, overview or a category title contains the term
    /// (case-insensitive), newest first
    Search(String),
    /// Posts written by a user, newest first
    Author(i64),
}

enum BindValue {
    Text(String),
    Int(i64),
}

impl PostFilter {
    fn where_clause(&self) -> (&'static str, Vec<BindValue>) {
        match self {
            PostFilter::All => ("1 = 1", vec![]),
            PostFilter::Featured => ("p.featured = 1", vec![]),
            PostFilter::Category(title) => (
                "EXISTS (SELECT 1 FROM post_categories pc \
                 INNER JOIN categories c ON c.id = pc.category_id \
                 WHERE pc.post_id = p.id AND c.title = ?)",
                vec![BindValue::Text(title.clone())],
            ),
            PostFilter::Search(term) => {
                let pattern = like_pattern(term);
                (
                    "(p.title_folded LIKE ? ESCAPE '!' \
                     OR p.overview_folded LIKE ? ESCAPE '!' \
                     OR EXISTS (SELECT 1 FROM post_categories pc \
                        INNER JOIN categories c ON c.id = pc.category_id \
                        WHERE pc.post_id = p.id AND c.title_folded LIKE ? ESCAPE '!'))",
                    vec![
                        BindValue::Text(pattern.clone()),
                        BindValue::Text(pattern.clone()),
                        BindValue::Text(pattern),
                    ],
                )
            }
            PostFilter::Author(id) => ("p.author_id = ?", vec![BindValue::Int(*id)]),
        }
    }

    fn order_clause(&self) -> &'static str {
        match self {
            PostFilter::Category(_) => "p.created_on ASC, p.id ASC",
            _ => "p.created_on DESC, p.id DESC",
        }
    }

    fn count_sql(&self) -> (String, Vec<BindValue>) {
        let (clause, binds) = self.where_clause();
        (format!("SELECT COUNT(*) AS count FROM posts p WHERE {}", clause), binds)
    }

    fn list_sql(&self) -> (String, Vec<BindValue>) {
        let (clause, binds) = self.where_clause();
        (
            format!(
                "SELECT {} FROM posts p WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
                POST_COLUMNS,
                clause,
                self.order_clause()
            ),
            binds,
        )
    }
}

/// Case-folded `%term%` with LIKE wildcards in the term escaped by `!`.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in fold_case(term).chars() {
        if matches!(c, '%' | '_' | '!') {
            escaped.push('!');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Post repository trait
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Insert a post with its category links
    async fn create(&self, post: &Post, category_ids: &[i64]) -> Result<Post>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>>;

    /// Update a post and replace its category links
    async fn update(&self, post: &Post, category_ids: &[i64]) -> Result<Post>;

    /// Delete a post; comments and category links go with it
    async fn delete(&self, id: i64) -> Result<bool>;

    async fn count(&self, filter: &PostFilter) -> Result<i64>;

    async fn list(&self, filter: &PostFilter, offset: i64, limit: i64) -> Result<Vec<Post>>;
}

pub struct SqlxPostRepository {
    pool: DynDatabasePool,
}

impl SqlxPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, post: &Post, category_ids: &[i64]) -> Result<Post> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_post_sqlite(require_sqlite(&self.pool)?, post, category_ids).await
            }
            DatabaseDriver::Mysql => {
                create_post_mysql(require_mysql(&self.pool)?, post, category_ids).await
            }
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>> {
        let sql = format!("SELECT {} FROM posts p WHERE p.id = ?", POST_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(require_sqlite(&self.pool)?)
                    .await
                    .context("Failed to get post by ID")?;
                row.as_ref().map(row_to_post_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(require_mysql(&self.pool)?)
                    .await
                    .context("Failed to get post by ID")?;
                row.as_ref().map(row_to_post_mysql).transpose()
            }
        }
    }

    async fn update(&self, post: &Post, category_ids: &[i64]) -> Result<Post> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                update_post_sqlite(require_sqlite(&self.pool)?, post, category_ids).await?
            }
            DatabaseDriver::Mysql => {
                update_post_mysql(require_mysql(&self.pool)?, post, category_ids).await?
            }
        }
        self.get_by_id(post.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Post not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM posts WHERE id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .execute(require_sqlite(&self.pool)?)
                .await
                .context("Failed to delete post")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .execute(require_mysql(&self.pool)?)
                .await
                .context("Failed to delete post")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn count(&self, filter: &PostFilter) -> Result<i64> {
        let (sql, binds) = filter.count_sql();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut query = sqlx::query(&sql);
                for bind in binds {
                    query = match bind {
                        BindValue::Text(s) => query.bind(s),
                        BindValue::Int(i) => query.bind(i),
                    };
                }
                let row = query
                    .fetch_one(require_sqlite(&self.pool)?)
                    .await
                    .context("Failed to count posts")?;
                Ok(row.get("count"))
            }
            DatabaseDriver::Mysql => {
                let mut query = sqlx::query(&sql);
                for bind in binds {
                    query = match bind {
                        BindValue::Text(s) => query.bind(s),
                        BindValue::Int(i) => query.bind(i),
                    };
                }
                let row = query
                    .fetch_one(require_mysql(&self.pool)?)
                    .await
                    .context("Failed to count posts")?;
                Ok(row.get("count"))
            }
        }
    }

    async fn list(&self, filter: &PostFilter, offset: i64, limit: i64) -> Result<Vec<Post>> {
        let (sql, binds) = filter.list_sql();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut query = sqlx::query(&sql);
                for bind in binds {
                    query = match bind {
                        BindValue::Text(s) => query.bind(s),
                        BindValue::Int(i) => query.bind(i),
                    };
                }
                let rows = query
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(require_sqlite(&self.pool)?)
                    .await
                    .context("Failed to list posts")?;
                rows.iter().map(row_to_post_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let mut query = sqlx::query(&sql);
                for bind in binds {
                    query = match bind {
                        BindValue::Text(s) => query.bind(s),
                        BindValue::Int(i) => query.bind(i),
                    };
                }
                let rows = query
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(require_mysql(&self.pool)?)
                    .await
                    .context("Failed to list posts")?;
                rows.iter().map(row_to_post_mysql).collect()
            }
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_post_sqlite(pool: &SqlitePool, post: &Post, category_ids: &[i64]) -> Result<Post> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let id = sqlx::query(
        r#"
        INSERT INTO posts (title, author_id, overview, title_folded, overview_folded, content, content_html, thumbnail, featured, status, created_on, updated_on)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&post.title)
    .bind(post.author_id)
    .bind(&post.overview)
    .bind(fold_case(&post.title))
    .bind(fold_case(&post.overview))
    .bind(&post.content)
    .bind(&post.content_html)
    .bind(&post.thumbnail)
    .bind(post.featured)
    .bind(post.status.as_i32())
    .bind(post.created_on)
    .bind(post.updated_on)
    .execute(&mut *tx)
    .await
    .context("Failed to create post")?
    .last_insert_rowid();

    for category_id in category_ids {
        sqlx::query("INSERT INTO post_categories (post_id, category_id) VALUES (?, ?)")
            .bind(id)
            .bind(*category_id)
            .execute(&mut *tx)
            .await
            .context("Failed to link post category")?;
    }

    tx.commit().await.context("Failed to commit post")?;

    Ok(Post { id, ..post.clone() })
}

async fn update_post_sqlite(pool: &SqlitePool, post: &Post, category_ids: &[i64]) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query(
        r#"
        UPDATE posts
        SET title = ?, overview = ?, title_folded = ?, overview_folded = ?,
            content = ?, content_html = ?, thumbnail = ?,
            featured = ?, status = ?, updated_on = ?
        WHERE id = ?
        "#,
    )
    .bind(&post.title)
    .bind(&post.overview)
    .bind(fold_case(&post.title))
    .bind(fold_case(&post.overview))
    .bind(&post.content)
    .bind(&post.content_html)
    .bind(&post.thumbnail)
    .bind(post.featured)
    .bind(post.status.as_i32())
    .bind(post.updated_on)
    .bind(post.id)
    .execute(&mut *tx)
    .await
    .context("Failed to update post")?;

    sqlx::query("DELETE FROM post_categories WHERE post_id = ?")
        .bind(post.id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear post categories")?;

    for category_id in category_ids {
        sqlx::query("INSERT INTO post_categories (post_id, category_id) VALUES (?, ?)")
            .bind(post.id)
            .bind(*category_id)
            .execute(&mut *tx)
            .await
            .context("Failed to link post category")?;
    }

    tx.commit().await.context("Failed to commit post update")?;
    Ok(())
}

fn row_to_post_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Post> {
    Ok(Post {
        id: row.get("id"),
        title: row.get("title"),
        author_id: row.get("author_id"),
        overview: row.get("overview"),
        content: row.get("content"),
        content_html: row.get("content_html"),
        thumbnail: row.get("thumbnail"),
        featured: row.get("featured"),
        status: PostStatus::from_i32(row.get("status")),
        created_on: row.get("created_on"),
        updated_on: row.get("updated_on"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_post_mysql(pool: &MySqlPool, post: &Post, category_ids: &[i64]) -> Result<Post> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let id = sqlx::query(
        r#"
        INSERT INTO posts (title, author_id, overview, title_folded, overview_folded, content, content_html, thumbnail, featured, status, created_on, updated_on)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&post.title)
    .bind(post.author_id)
    .bind(&post.overview)
    .bind(fold_case(&post.title))
    .bind(fold_case(&post.overview))
    .bind(&post.content)
    .bind(&post.content_html)
    .bind(&post.thumbnail)
    .bind(post.featured)
    .bind(post.status.as_i32())
    .bind(post.created_on)
    .bind(post.updated_on)
    .execute(&mut *tx)
    .await
    .context("Failed to create post")?
    .last_insert_id() as i64;

    for category_id in category_ids {
        sqlx::query("INSERT INTO post_categories (post_id, category_id) VALUES (?, ?)")
            .bind(id)
            .bind(*category_id)
            .execute(&mut *tx)
            .await
            .context("Failed to link post category")?;
    }

    tx.commit().await.context("Failed to commit post")?;

    Ok(Post { id, ..post.clone() })
}

async fn update_post_mysql(pool: &MySqlPool, post: &Post, category_ids: &[i64]) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query(
        r#"
        UPDATE posts
        SET title = ?, overview = ?, title_folded = ?, overview_folded = ?,
            content = ?, content_html = ?, thumbnail = ?,
            featured = ?, status = ?, updated_on = ?
        WHERE id = ?
        "#,
    )
    .bind(&post.title)
    .bind(&post.overview)
    .bind(fold_case(&post.title))
    .bind(fold_case(&post.overview))
    .bind(&post.content)
    .bind(&post.content_html)
    .bind(&post.thumbnail)
    .bind(post.featured)
    .bind(post.status.as_i32())
    .bind(post.updated_on)
    .bind(post.id)
    .execute(&mut *tx)
    .await
    .context("Failed to update post")?;

    sqlx::query("DELETE FROM post_categories WHERE post_id = ?")
        .bind(post.id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear post categories")?;

    for category_id in category_ids {
        sqlx::query("INSERT INTO post_categories (post_id, category_id) VALUES (?, ?)")
            .bind(post.id)
            .bind(*category_id)
            .execute(&mut *tx)
            .await
            .context("Failed to link post category")?;
    }

    tx.commit().await.context("Failed to commit post update")?;
    Ok(())
}

fn row_to_post_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Post> {
    Ok(Post {
        id: row.get("id"),
        title: row.get("title"),
        author_id: row.get("author_id"),
        overview: row.get("overview"),
        content: row.get("content"),
        content_html: row.get("content_html"),
        thumbnail: row.get("thumbnail"),
        featured: row.get("featured"),
        status: PostStatus::from_i32(row.get("status")),
        created_on: row.get("created_on"),
        updated_on: row.get("updated_on"),
    })
}
