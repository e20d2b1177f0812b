//! Category service
//!
//! Categories are managed by admins only. Titles are 1 to 20 characters and
//! unique regardless of case. Deleting a category unlinks it from its posts;
//! the posts themselves stay.

use crate::cache::MemoryCache;
use crate::db::repositories::CategoryRepository;
use crate::models::{Category, CategoryCount, User};
use crate::services::validation::{check_length, FieldErrors};
use anyhow::Context;
use std::sync::Arc;

pub const MAX_CATEGORY_TITLE_LENGTH: usize = 20;

/// Cache key for the sidebar category counts
pub(crate) const CACHE_KEY_CATEGORY_COUNTS: &str = "posts:category_counts";
/// Prefix shared by every cached post listing
pub(crate) const CACHE_PATTERN_POSTS: &str = "posts:*";

#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    #[error("Only admins can manage categories")]
    Forbidden,

    #[error("Category not found: {0}")]
    NotFound(i64),

    #[error("Validation error: {0}")]
    Validation(FieldErrors),

    #[error("Conflict: {0}")]
    Conflict(FieldErrors),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
    cache: Arc<MemoryCache>,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoryRepository>, cache: Arc<MemoryCache>) -> Self {
        Self { repo, cache }
    }

    /// All categories by title
    pub async fn list(&self) -> Result<Vec<Category>, CategoryServiceError> {
        let categories = self.repo.list().await.context("Failed to list categories")?;
        Ok(categories)
    }

    /// Categories that have posts, with their post count (cached)
    pub async fn counts(&self) -> Result<Vec<CategoryCount>, CategoryServiceError> {
        let repo = self.repo.clone();
        self.cache
            .get_or_load(CACHE_KEY_CATEGORY_COUNTS, || async move {
                let counts = repo
                    .post_counts()
                    .await
                    .context("Failed to count posts per category")?;
                Ok::<_, CategoryServiceError>(counts)
            })
            .await
    }

    pub async fn create(&self, actor: &User, title: &str) -> Result<Category, CategoryServiceError> {
        if !actor.is_admin() {
            return Err(CategoryServiceError::Forbidden);
        }

        let title = title.trim();
        let mut errors = FieldErrors::new();
        check_length("title", title, 1, MAX_CATEGORY_TITLE_LENGTH, &mut errors);
        errors.into_result().map_err(CategoryServiceError::Validation)?;

        if self
            .repo
            .get_by_title(title)
            .await
            .context("Failed to check category title")?
            .is_some()
        {
            return Err(CategoryServiceError::Conflict(FieldErrors::single(
                "title",
                "Une catégorie avec ce titre existe déjà.",
            )));
        }

        let category = self
            .repo
            .create(title)
            .await
            .context("Failed to create category")?;

        self.cache.delete_pattern(CACHE_PATTERN_POSTS).await;
        tracing::info!("Category {} created by {}", category.title, actor.username);
        Ok(category)
    }

    pub async fn delete(&self, actor: &User, id: i64) -> Result<(), CategoryServiceError> {
        if !actor.is_admin() {
            return Err(CategoryServiceError::Forbidden);
        }

        let deleted = self
            .repo
            .delete(id)
            .await
            .context("Failed to delete category")?;
        if !deleted {
            return Err(CategoryServiceError::NotFound(id));
        }

        self.cache.delete_pattern(CACHE_PATTERN_POSTS).await;
        tracing::info!("Category {} deleted by {}", id, actor.username);
        Ok(())
    }

    /// Keep only ids of existing categories, in order, without duplicates
    pub async fn existing_ids(&self, ids: &[i64]) -> Result<Vec<i64>, CategoryServiceError> {
        Ok(existing_category_ids(self.repo.as_ref(), ids).await?)
    }
}

pub(crate) async fn existing_category_ids(
    repo: &dyn CategoryRepository,
    ids: &[i64],
) -> anyhow::Result<Vec<i64>> {
    let known: Vec<i64> = repo
        .list()
        .await
        .context("Failed to list categories")?
        .into_iter()
        .map(|c| c.id)
        .collect();
    let mut out = Vec::new();
    for id in ids {
        if known.contains(id) && !out.contains(id) {
            out.push(*id);
        }
    }
    Ok(out)
}
