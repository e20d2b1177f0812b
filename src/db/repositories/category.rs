//! Category repository

use crate::config::DatabaseDriver;
use crate::db::pool::{require_mysql, require_sqlite};
use crate::db::repositories::fold_case;
use crate::db::DynDatabasePool;
use crate::models::{Category, CategoryCount};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;

/// Category repository trait
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn create(&self, title: &str) -> Result<Category>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    /// Case-insensitive title lookup
    async fn get_by_title(&self, title: &str) -> Result<Option<Category>>;

    /// All categories ordered by title
    async fn list(&self) -> Result<Vec<Category>>;

    /// Categories of a post ordered by title
    async fn list_for_post(&self, post_id: i64) -> Result<Vec<Category>>;

    /// Post count per category, for categories holding at least one post
    async fn post_counts(&self) -> Result<Vec<CategoryCount>>;

    /// Delete a category; returns false if it did not exist
    async fn delete(&self, id: i64) -> Result<bool>;
}

pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxCategoryRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }

    async fn fetch_many(&self, sql: &str, bind: Option<i64>) -> Result<Vec<Category>> {
        let categories: Vec<Category> = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut query = sqlx::query(sql);
                if let Some(value) = bind {
                    query = query.bind(value);
                }
                query
                    .fetch_all(require_sqlite(&self.pool)?)
                    .await
                    .context("Failed to list categories")?
                    .iter()
                    .map(|row| Category {
                        id: row.get("id"),
                        title: row.get("title"),
                    })
                    .collect()
            }
            DatabaseDriver::Mysql => {
                let mut query = sqlx::query(sql);
                if let Some(value) = bind {
                    query = query.bind(value);
                }
                query
                    .fetch_all(require_mysql(&self.pool)?)
                    .await
                    .context("Failed to list categories")?
                    .iter()
                    .map(|row| Category {
                        id: row.get("id"),
                        title: row.get("title"),
                    })
                    .collect()
            }
        };
        Ok(categories)
    }
}

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, title: &str) -> Result<Category> {
        let sql = "INSERT INTO categories (title, title_folded) VALUES (?, ?)";
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(title)
                .bind(fold_case(title))
                .execute(require_sqlite(&self.pool)?)
                .await
                .context("Failed to create category")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(title)
                .bind(fold_case(title))
                .execute(require_mysql(&self.pool)?)
                .await
                .context("Failed to create category")?
                .last_insert_id() as i64,
        };

        Ok(Category {
            id,
            title: title.to_string(),
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        let found = self
            .fetch_many("SELECT id, title FROM categories WHERE id = ?", Some(id))
            .await?;
        Ok(found.into_iter().next())
    }

    async fn get_by_title(&self, title: &str) -> Result<Option<Category>> {
        let sql = "SELECT id, title FROM categories WHERE title_folded = ?";
        let folded = fold_case(title);
        let category = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(&folded)
                .fetch_optional(require_sqlite(&self.pool)?)
                .await
                .context("Failed to get category by title")?
                .map(|row| Category {
                    id: row.get("id"),
                    title: row.get("title"),
                }),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(&folded)
                .fetch_optional(require_mysql(&self.pool)?)
                .await
                .context("Failed to get category by title")?
                .map(|row| Category {
                    id: row.get("id"),
                    title: row.get("title"),
                }),
        };
        Ok(category)
    }

    async fn list(&self) -> Result<Vec<Category>> {
        self.fetch_many("SELECT id, title FROM categories ORDER BY title", None)
            .await
    }

    async fn list_for_post(&self, post_id: i64) -> Result<Vec<Category>> {
        self.fetch_many(
            r#"
            SELECT c.id, c.title
            FROM categories c
            INNER JOIN post_categories pc ON pc.category_id = c.id
            WHERE pc.post_id = ?
            ORDER BY c.title
            "#,
            Some(post_id),
        )
        .await
    }

    async fn post_counts(&self) -> Result<Vec<CategoryCount>> {
        let sql = r#"
            SELECT c.title AS title, COUNT(pc.post_id) AS count
            FROM categories c
            INNER JOIN post_categories pc ON pc.category_id = c.id
            GROUP BY c.id, c.title
            ORDER BY c.title
        "#;
        let counts: Vec<CategoryCount> = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .fetch_all(require_sqlite(&self.pool)?)
                .await
                .context("Failed to count posts per category")?
                .iter()
                .map(|row| CategoryCount {
                    title: row.get("title"),
                    count: row.get("count"),
                })
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .fetch_all(require_mysql(&self.pool)?)
                .await
                .context("Failed to count posts per category")?
                .iter()
                .map(|row| CategoryCount {
                    title: row.get("title"),
                    count: row.get("count"),
                })
                .collect(),
        };
        Ok(counts)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM categories WHERE id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .execute(require_sqlite(&self.pool)?)
                .await
                .context("Failed to delete category")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .execute(require_mysql(&self.pool)?)
                .await
                .context("Failed to delete category")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxCategoryRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxCategoryRepository::new(pool)
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let repo = setup_test_repo().await;

        let jardin = repo.create("Jardinage").await.unwrap();
        repo.create("Bricolage").await.unwrap();

        assert_eq!(repo.get_by_id(jardin.id).await.unwrap(), Some(jardin.clone()));
        assert_eq!(repo.get_by_title("jardinage").await.unwrap(), Some(jardin));
        assert!(repo.get_by_title("Cuisine").await.unwrap().is_none());

        let titles: Vec<_> = repo.list().await.unwrap().into_iter().map(|c| c.title).collect();
        assert_eq!(titles, vec!["Bricolage", "Jardinage"]);
    }

    #[tokio::test]
    async fn test_lookup_by_title_folds_accents() {
        let repo = setup_test_repo().await;
        let ete = repo.create("Été").await.unwrap();

        assert_eq!(repo.get_by_title("été").await.unwrap(), Some(ete.clone()));
        assert_eq!(repo.get_by_title("ÉTÉ").await.unwrap(), Some(ete));
    }

    #[tokio::test]
    async fn test_duplicate_title_fails() {
        let repo = setup_test_repo().await;
        repo.create("Jardinage").await.unwrap();
        assert!(repo.create("Jardinage").await.is_err());
    }

    #[tokio::test]
    async fn test_post_counts_skip_empty_categories() {
        let repo = setup_test_repo().await;
        repo.create("Vide").await.unwrap();
        // Counts are exercised against real posts in the post repository tests.
        assert!(repo.post_counts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = setup_test_repo().await;
        let category = repo.create("Jardinage").await.unwrap();

        assert!(repo.delete(category.id).await.unwrap());
        assert!(!repo.delete(category.id).await.unwrap());
        assert!(repo.list().await.unwrap().is_empty());
    }
}
