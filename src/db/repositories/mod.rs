//! Database repositories
//!
//! Each repository is a trait plus a SQLx implementation that dispatches on
//! the configured driver.

pub mod category;
pub mod comment;
pub mod post;
pub mod private_message;
pub mod profile;
pub mod session;
pub mod user;

pub use category::{CategoryRepository, SqlxCategoryRepository};
pub use comment::{CommentRepository, SqlxCommentRepository};
pub use post::{PostFilter, PostRepository, SqlxPostRepository};
pub use private_message::{DeleteOutcome, PrivateMessageRepository, SqlxPrivateMessageRepository};
pub use profile::{ProfileRepository, SqlxProfileRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};

/// Case folding for the `*_folded` search columns.
///
/// SQLite's `LOWER()` only folds ASCII, so folded copies of searchable text
/// are written from Rust and compared against terms folded the same way.
pub fn fold_case(text: &str) -> String {
    text.to_lowercase()
}
