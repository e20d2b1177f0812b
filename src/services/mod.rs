//! Services layer - Business logic
//!
//! Services sit between the web handlers and the repositories. They are
//! responsible for:
//! - Implementing business rules (ownership, admin-only actions)
//! - Validating form input into field errors
//! - Coordinating repositories, media storage and the cache

pub mod category;
pub mod comment;
pub mod markdown;
pub mod media;
pub mod password;
pub mod post;
pub mod private_message;
pub mod profile;
pub mod rate_limiter;
pub mod user;
pub mod validation;

pub use category::{CategoryService, CategoryServiceError};
pub use comment::{CommentService, CommentServiceError};
pub use markdown::MarkdownRenderer;
pub use media::{MediaError, MediaStore};
pub use password::{check_password_rules, hash_password, verify_password};
pub use post::{HomePosts, PostService, PostServiceError, POSTS_PER_PAGE, SIDEBAR_LATEST};
pub use private_message::{MessageService, MessageServiceError, MESSAGES_PER_PAGE};
pub use profile::{ProfileService, ProfileServiceError, ProfileUpdate};
pub use rate_limiter::LoginRateLimiter;
pub use user::{UserService, UserServiceError};
pub use validation::{FieldErrors, NON_FIELD};
