//! Comment service

use crate::cache::MemoryCache;
use crate::db::repositories::{CommentRepository, PostRepository};
use crate::models::{Comment, CommentWithMeta, CreateCommentInput, User};
use crate::services::category::CACHE_PATTERN_POSTS;
use crate::services::validation::FieldErrors;
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum CommentServiceError {
    #[error("Post not found: {0}")]
    PostNotFound(i64),

    #[error("Validation error: {0}")]
    Validation(FieldErrors),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct CommentService {
    repo: Arc<dyn CommentRepository>,
    post_repo: Arc<dyn PostRepository>,
    cache: Arc<MemoryCache>,
}

impl CommentService {
    pub fn new(
        repo: Arc<dyn CommentRepository>,
        post_repo: Arc<dyn PostRepository>,
        cache: Arc<MemoryCache>,
    ) -> Self {
        Self {
            repo,
            post_repo,
            cache,
        }
    }

    /// Comments of a post, newest first
    pub async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentWithMeta>, CommentServiceError> {
        let comments = self
            .repo
            .list_for_post(post_id)
            .await
            .context("Failed to list comments")?;
        Ok(comments)
    }

    /// Add a comment from `author`. Content is kept as typed, only
    /// surrounding whitespace is dropped.
    pub async fn add(&self, author: &User, input: CreateCommentInput) -> Result<Comment, CommentServiceError> {
        let content = input.content.trim();
        if content.is_empty() {
            return Err(CommentServiceError::Validation(FieldErrors::single(
                "content",
                "Ce champ est obligatoire.",
            )));
        }

        self.post_repo
            .get_by_id(input.post_id)
            .await
            .context("Failed to get post")?
            .ok_or(CommentServiceError::PostNotFound(input.post_id))?;

        let comment = self
            .repo
            .create(&Comment {
                id: 0,
                post_id: input.post_id,
                user_id: author.id,
                content: content.to_string(),
                timestamp: Utc::now(),
            })
            .await
            .context("Failed to create comment")?;

        // Listings show comment counts
        self.cache.delete_pattern(CACHE_PATTERN_POSTS).await;
        tracing::debug!("Comment {} added to post {} by {}", comment.id, comment.post_id, author.username);
        Ok(comment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxCommentRepository, SqlxPostRepository, SqlxUserRepository};
    use crate::db::repositories::user::UserRepository;
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Post, PostStatus, UserRole};

    async fn setup() -> (CommentService, User, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");

        let user = SqlxUserRepository::new(pool.clone())
            .create(&User::new(
                "lecteur".into(),
                "lecteur@example.com".into(),
                String::new(),
                String::new(),
                "hash".into(),
                UserRole::Member,
            ))
            .await
            .unwrap();

        let posts = SqlxPostRepository::boxed(pool.clone());
        let now = Utc::now();
        let post = posts
            .create(
                &Post {
                    id: 0,
                    title: "Titre".into(),
                    author_id: user.id,
                    overview: "Résumé".into(),
                    content: "Contenu".into(),
                    content_html: "<p>Contenu</p>".into(),
                    thumbnail: "images/a.png".into(),
                    featured: false,
                    status: PostStatus::Published,
                    created_on: now,
                    updated_on: now,
                },
                &[],
            )
            .await
            .unwrap();

        let service = CommentService::new(
            SqlxCommentRepository::boxed(pool),
            posts,
            Arc::new(MemoryCache::new()),
        );
        (service, user, post.id)
    }

    #[tokio::test]
    async fn test_add_and_list_comments() {
        let (service, user, post_id) = setup().await;

        service
            .add(&user, CreateCommentInput::new(post_id, "  Premier !  "))
            .await
            .unwrap();
        service
            .add(&user, CreateCommentInput::new(post_id, "Second"))
            .await
            .unwrap();

        let comments = service.list_for_post(post_id).await.unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].comment.content, "Second");
        assert_eq!(comments[1].comment.content, "Premier !");
        assert_eq!(comments[0].username, "lecteur");
    }

    #[tokio::test]
    async fn test_blank_comment_rejected() {
        let (service, user, post_id) = setup().await;
        match service.add(&user, CreateCommentInput::new(post_id, " \n ")).await {
            Err(CommentServiceError::Validation(errors)) => assert!(errors.has("content")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_comment_on_missing_post() {
        let (service, user, _) = setup().await;
        assert!(matches!(
            service.add(&user, CreateCommentInput::new(4242, "Bonjour")).await,
            Err(CommentServiceError::PostNotFound(4242))
        ));
    }
}
