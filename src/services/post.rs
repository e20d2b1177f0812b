//! Post service
//!
//! Listings (home page, paginated list, category, search, author), post
//! detail, and authoring. Every listing is returned as [`PostWithMeta`]
//! with the author, categories and comment count filled in.
//!
//! Only the author of a post or an admin may edit or delete it. The home
//! page and the sidebar are cached; any write drops every cached listing.

use crate::cache::MemoryCache;
use crate::db::repositories::{
    CategoryRepository, CommentRepository, PostFilter, PostRepository, UserRepository,
};
use crate::models::{
    PageRequest, PagedResult, Post, PostInput, PostWithMeta, User, UserSummary,
};
use crate::services::category::{existing_category_ids, CACHE_PATTERN_POSTS};
use crate::services::markdown::MarkdownRenderer;
use crate::services::media::{MediaError, MediaStore, THUMBNAIL_DIR};
use crate::services::validation::{check_length, FieldErrors};
use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Posts per listing page
pub const POSTS_PER_PAGE: u32 = 4;
/// Posts in the "latest" blocks of the home page and sidebar
pub const SIDEBAR_LATEST: i64 = 3;

pub const MAX_TITLE_LENGTH: usize = 100;
pub const MAX_OVERVIEW_LENGTH: usize = 255;

const CACHE_KEY_HOME: &str = "posts:home";
const CACHE_KEY_LATEST: &str = "posts:latest";

#[derive(Debug, thiserror::Error)]
pub enum PostServiceError {
    #[error("Post not found: {0}")]
    NotFound(i64),

    #[error("Only the author or an admin can change this post")]
    Forbidden,

    #[error("Validation error: {0}")]
    Validation(FieldErrors),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Featured and latest posts for the home page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomePosts {
    pub featured_posts: Vec<PostWithMeta>,
    pub latest_posts: Vec<PostWithMeta>,
}

pub struct PostService {
    post_repo: Arc<dyn PostRepository>,
    user_repo: Arc<dyn UserRepository>,
    category_repo: Arc<dyn CategoryRepository>,
    comment_repo: Arc<dyn CommentRepository>,
    cache: Arc<MemoryCache>,
    media: MediaStore,
    markdown: MarkdownRenderer,
}

impl PostService {
    pub fn new(
        post_repo: Arc<dyn PostRepository>,
        user_repo: Arc<dyn UserRepository>,
        category_repo: Arc<dyn CategoryRepository>,
        comment_repo: Arc<dyn CommentRepository>,
        cache: Arc<MemoryCache>,
        media: MediaStore,
    ) -> Self {
        Self {
            post_repo,
            user_repo,
            category_repo,
            comment_repo,
            cache,
            media,
            markdown: MarkdownRenderer::new(),
        }
    }

    // ========================================================================
    // Listings
    // ========================================================================

    /// Three newest featured posts and three newest posts
    pub async fn home(&self) -> Result<HomePosts, PostServiceError> {
        self.cache
            .get_or_load(CACHE_KEY_HOME, || async {
                let featured = self
                    .post_repo
                    .list(&PostFilter::Featured, 0, SIDEBAR_LATEST)
                    .await
                    .context("Failed to list featured posts")?;
                let latest = self
                    .post_repo
                    .list(&PostFilter::All, 0, SIDEBAR_LATEST)
                    .await
                    .context("Failed to list latest posts")?;
                Ok::<_, PostServiceError>(HomePosts {
                    featured_posts: self.enrich_all(featured).await?,
                    latest_posts: self.enrich_all(latest).await?,
                })
            })
            .await
    }

    /// Three newest posts for the sidebar
    pub async fn latest(&self) -> Result<Vec<PostWithMeta>, PostServiceError> {
        self.cache
            .get_or_load(CACHE_KEY_LATEST, || async {
                let latest = self
                    .post_repo
                    .list(&PostFilter::All, 0, SIDEBAR_LATEST)
                    .await
                    .context("Failed to list latest posts")?;
                self.enrich_all(latest).await
            })
            .await
    }

    /// Every post, newest first
    pub async fn list(&self, page: Option<&str>) -> Result<PagedResult<PostWithMeta>, PostServiceError> {
        self.paginate(&PostFilter::All, page).await
    }

    /// Posts filed under the category titled `title`, oldest first
    pub async fn by_category(
        &self,
        title: &str,
        page: Option<&str>,
    ) -> Result<PagedResult<PostWithMeta>, PostServiceError> {
        self.paginate(&PostFilter::Category(title.to_string()), page).await
    }

    /// Posts whose title, overview or a category contains `query`.
    ///
    /// A blank query matches nothing.
    pub async fn search(
        &self,
        query: &str,
        page: Option<&str>,
    ) -> Result<PagedResult<PostWithMeta>, PostServiceError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(PagedResult::empty(POSTS_PER_PAGE));
        }
        self.paginate(&PostFilter::Search(query.to_string()), page).await
    }

    /// Every post written by `author_id`, newest first
    pub async fn by_author(&self, author_id: i64) -> Result<Vec<PostWithMeta>, PostServiceError> {
        let filter = PostFilter::Author(author_id);
        let total = self
            .post_repo
            .count(&filter)
            .await
            .context("Failed to count posts")?;
        let posts = self
            .post_repo
            .list(&filter, 0, total.max(1))
            .await
            .context("Failed to list posts")?;
        self.enrich_all(posts).await
    }

    pub async fn get(&self, id: i64) -> Result<PostWithMeta, PostServiceError> {
        let post = self.find(id).await?;
        self.enrich(post).await
    }

    /// The post, if `actor` may edit or delete it
    pub async fn get_editable(&self, actor: &User, id: i64) -> Result<PostWithMeta, PostServiceError> {
        let post = self.get(id).await?;
        if !actor.can_edit(post.post.author_id) {
            return Err(PostServiceError::Forbidden);
        }
        Ok(post)
    }

    // ========================================================================
    // Authoring
    // ========================================================================

    /// Create a post written by `author`. A thumbnail is required.
    pub async fn create(&self, author: &User, input: PostInput) -> Result<Post, PostServiceError> {
        let mut errors = check_post_fields(&input);
        let bytes = input.thumbnail.as_deref().filter(|b| !b.is_empty());
        if bytes.is_none() {
            errors.add("thumbnail", "Ce champ est obligatoire.");
        }
        let bytes = match bytes {
            Some(bytes) if errors.is_empty() => bytes,
            _ => return Err(PostServiceError::Validation(errors)),
        };

        let thumbnail = self.store_thumbnail(bytes).await?;

        let category_ids = existing_category_ids(self.category_repo.as_ref(), &input.category_ids).await?;
        let now = Utc::now();
        let post = Post {
            id: 0,
            title: input.title.trim().to_string(),
            author_id: author.id,
            overview: input.overview.trim().to_string(),
            content_html: self.markdown.render(&input.content),
            content: input.content,
            thumbnail,
            featured: input.featured,
            status: input.status,
            created_on: now,
            updated_on: now,
        };

        let created = self
            .post_repo
            .create(&post, &category_ids)
            .await
            .context("Failed to create post")?;

        self.invalidate_listings().await;
        tracing::info!("Post {} \"{}\" created by {}", created.id, created.title, author.username);
        Ok(created)
    }

    /// Update a post. Without a new thumbnail the current one is kept.
    pub async fn update(&self, actor: &User, id: i64, input: PostInput) -> Result<Post, PostServiceError> {
        let mut post = self.find(id).await?;
        if !actor.can_edit(post.author_id) {
            return Err(PostServiceError::Forbidden);
        }

        check_post_fields(&input)
            .into_result()
            .map_err(PostServiceError::Validation)?;

        let previous_thumbnail = post.thumbnail.clone();
        if let Some(bytes) = input.thumbnail.as_deref().filter(|b| !b.is_empty()) {
            post.thumbnail = self.store_thumbnail(bytes).await?;
        }

        let category_ids = existing_category_ids(self.category_repo.as_ref(), &input.category_ids).await?;
        post.title = input.title.trim().to_string();
        post.overview = input.overview.trim().to_string();
        post.content_html = self.markdown.render(&input.content);
        post.content = input.content;
        post.featured = input.featured;
        post.status = input.status;
        post.updated_on = Utc::now();

        let updated = self
            .post_repo
            .update(&post, &category_ids)
            .await
            .context("Failed to update post")?;

        if previous_thumbnail != updated.thumbnail {
            self.media.remove(&previous_thumbnail).await;
        }

        self.invalidate_listings().await;
        tracing::info!("Post {} updated by {}", id, actor.username);
        Ok(updated)
    }

    /// Delete a post with its comments and thumbnail
    pub async fn delete(&self, actor: &User, id: i64) -> Result<(), PostServiceError> {
        let post = self.find(id).await?;
        if !actor.can_edit(post.author_id) {
            return Err(PostServiceError::Forbidden);
        }

        let deleted = self
            .post_repo
            .delete(id)
            .await
            .context("Failed to delete post")?;
        if !deleted {
            return Err(PostServiceError::NotFound(id));
        }

        self.media.remove(&post.thumbnail).await;
        self.invalidate_listings().await;
        tracing::info!("Post {} deleted by {}", id, actor.username);
        Ok(())
    }

    /// Drop every cached post listing
    pub async fn invalidate_listings(&self) {
        self.cache.delete_pattern(CACHE_PATTERN_POSTS).await;
    }

    // ========================================================================
    // Private helper methods
    // ========================================================================

    async fn find(&self, id: i64) -> Result<Post, PostServiceError> {
        self.post_repo
            .get_by_id(id)
            .await
            .context("Failed to get post")?
            .ok_or(PostServiceError::NotFound(id))
    }

    async fn paginate(
        &self,
        filter: &PostFilter,
        raw_page: Option<&str>,
    ) -> Result<PagedResult<PostWithMeta>, PostServiceError> {
        let total = self
            .post_repo
            .count(filter)
            .await
            .context("Failed to count posts")?;
        let request = PageRequest::resolve(raw_page, total, POSTS_PER_PAGE);
        let posts = self
            .post_repo
            .list(filter, request.offset(), request.limit())
            .await
            .context("Failed to list posts")?;
        let items = self.enrich_all(posts).await?;
        Ok(PagedResult::new(items, total, &request))
    }

    async fn enrich_all(&self, posts: Vec<Post>) -> Result<Vec<PostWithMeta>, PostServiceError> {
        let mut out = Vec::with_capacity(posts.len());
        for post in posts {
            out.push(self.enrich(post).await?);
        }
        Ok(out)
    }

    async fn enrich(&self, post: Post) -> Result<PostWithMeta, PostServiceError> {
        let author = self
            .user_repo
            .get_by_id(post.author_id)
            .await
            .context("Failed to get post author")?
            .with_context(|| format!("Post {} has no author", post.id))?;
        let categories = self
            .category_repo
            .list_for_post(post.id)
            .await
            .context("Failed to get post categories")?;
        let comment_count = self
            .comment_repo
            .count_for_post(post.id)
            .await
            .context("Failed to count comments")?;

        Ok(PostWithMeta::new(
            post,
            UserSummary::from(&author),
            categories,
            comment_count,
        ))
    }

    async fn store_thumbnail(&self, bytes: &[u8]) -> Result<String, PostServiceError> {
        match self.media.save_image(THUMBNAIL_DIR, bytes).await {
            Ok(path) => Ok(path),
            Err(MediaError::InternalError(e)) => Err(e.into()),
            Err(e) => Err(PostServiceError::Validation(FieldErrors::single(
                "thumbnail",
                e.to_string(),
            ))),
        }
    }
}

fn check_post_fields(input: &PostInput) -> FieldErrors {
    let mut errors = FieldErrors::new();
    check_length("title", input.title.trim(), 1, MAX_TITLE_LENGTH, &mut errors);
    check_length("overview", input.overview.trim(), 1, MAX_OVERVIEW_LENGTH, &mut errors);
    if input.content.trim().is_empty() {
        errors.add("content", "Ce champ est obligatoire.");
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MediaConfig;
    use crate::db::repositories::{
        SqlxCategoryRepository, SqlxCommentRepository, SqlxPostRepository, SqlxUserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{PostStatus, UserRole};
    use crate::services::media::tests::PNG_BYTES;
    use tempfile::TempDir;

    struct Fixture {
        service: PostService,
        categories: Arc<dyn CategoryRepository>,
        author: User,
        other: User,
        admin: User,
        _media: TempDir,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");

        let users = SqlxUserRepository::boxed(pool.clone());
        let mut created = Vec::new();
        for (name, role) in [
            ("admin", UserRole::Admin),
            ("auteur", UserRole::Member),
            ("autre", UserRole::Member),
        ] {
            created.push(
                users
                    .create(&User::new(
                        name.into(),
                        format!("{}@example.com", name),
                        String::new(),
                        String::new(),
                        "hash".into(),
                        role,
                    ))
                    .await
                    .unwrap(),
            );
        }
        let other = created.pop().unwrap();
        let author = created.pop().unwrap();
        let admin = created.pop().unwrap();

        let media = TempDir::new().unwrap();
        let categories = SqlxCategoryRepository::boxed(pool.clone());
        let service = PostService::new(
            SqlxPostRepository::boxed(pool.clone()),
            users,
            categories.clone(),
            SqlxCommentRepository::boxed(pool.clone()),
            Arc::new(MemoryCache::new()),
            MediaStore::new(MediaConfig {
                path: media.path().to_path_buf(),
                ..MediaConfig::default()
            }),
        );

        Fixture {
            service,
            categories,
            author,
            other,
            admin,
            _media: media,
        }
    }

    fn input(title: &str) -> PostInput {
        PostInput::new(title, "Un résumé", "Du **contenu**").with_thumbnail(PNG_BYTES.to_vec())
    }

    #[tokio::test]
    async fn test_create_renders_markdown_and_stores_thumbnail() {
        let f = setup().await;
        let jardin = f.categories.create("Jardin").await.unwrap();

        let post = f
            .service
            .create(
                &f.author,
                input("Tomates").with_categories(vec![jardin.id, 999]).featured(true),
            )
            .await
            .unwrap();

        assert_eq!(post.author_id, f.author.id);
        assert!(post.content_html.contains("<strong>contenu</strong>"));
        assert!(post.thumbnail.starts_with("images/"));
        assert_eq!(post.status, PostStatus::Draft);

        let meta = f.service.get(post.id).await.unwrap();
        assert_eq!(meta.author.username, "auteur");
        assert_eq!(meta.categories.len(), 1);
        assert_eq!(meta.status_label, "Non publié");
    }

    #[tokio::test]
    async fn test_create_requires_fields_and_thumbnail() {
        let f = setup().await;
        let result = f
            .service
            .create(&f.author, PostInput::new("", &"x".repeat(256), "  "))
            .await;

        match result {
            Err(PostServiceError::Validation(errors)) => {
                for field in ["title", "overview", "content", "thumbnail"] {
                    assert!(errors.has(field), "missing error for {}", field);
                }
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_home_lists_featured_and_latest() {
        let f = setup().await;
        for i in 0..5 {
            f.service
                .create(&f.author, input(&format!("Post {}", i)).featured(i % 2 == 0))
                .await
                .unwrap();
        }

        let home = f.service.home().await.unwrap();
        let latest: Vec<_> = home.latest_posts.iter().map(|p| p.post.title.as_str()).collect();
        assert_eq!(latest, vec!["Post 4", "Post 3", "Post 2"]);
        assert_eq!(home.featured_posts.len(), 3);
        assert!(home.featured_posts.iter().all(|p| p.post.featured));
    }

    #[tokio::test]
    async fn test_writes_invalidate_cached_listings() {
        let f = setup().await;
        assert!(f.service.latest().await.unwrap().is_empty());

        f.service.create(&f.author, input("Nouveau")).await.unwrap();
        assert_eq!(f.service.latest().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_pagination_is_lenient() {
        let f = setup().await;
        for i in 0..6 {
            f.service.create(&f.author, input(&format!("Post {}", i))).await.unwrap();
        }

        let first = f.service.list(None).await.unwrap();
        assert_eq!(first.items.len(), 4);
        assert_eq!(first.total_pages, 2);

        let last = f.service.list(Some("99")).await.unwrap();
        assert_eq!(last.page, 2);
        assert_eq!(last.items.len(), 2);

        let fallback = f.service.list(Some("abc")).await.unwrap();
        assert_eq!(fallback.page, 1);
    }

    #[tokio::test]
    async fn test_search_blank_query_is_empty() {
        let f = setup().await;
        f.service.create(&f.author, input("Tomates")).await.unwrap();

        assert!(f.service.search("  ", None).await.unwrap().is_empty());
        assert_eq!(f.service.search("TOMA", None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_only_author_or_admin_can_edit() {
        let f = setup().await;
        let post = f.service.create(&f.author, input("Original")).await.unwrap();

        assert!(matches!(
            f.service.update(&f.other, post.id, PostInput::new("Volé", "r", "c")).await,
            Err(PostServiceError::Forbidden)
        ));
        assert!(matches!(
            f.service.get_editable(&f.other, post.id).await,
            Err(PostServiceError::Forbidden)
        ));

        let updated = f
            .service
            .update(&f.admin, post.id, PostInput::new("Corrigé", "r", "c"))
            .await
            .unwrap();
        assert_eq!(updated.title, "Corrigé");
        assert_eq!(updated.thumbnail, post.thumbnail, "thumbnail kept without new upload");
    }

    #[tokio::test]
    async fn test_delete_post() {
        let f = setup().await;
        let post = f.service.create(&f.author, input("Éphémère")).await.unwrap();

        assert!(matches!(
            f.service.delete(&f.other, post.id).await,
            Err(PostServiceError::Forbidden)
        ));
        f.service.delete(&f.author, post.id).await.unwrap();
        assert!(matches!(
            f.service.get(post.id).await,
            Err(PostServiceError::NotFound(_))
        ));
        assert!(f.service.by_author(f.author.id).await.unwrap().is_empty());
    }
}
