//! Data models
//!
//! Database entities (User, Profile, Session, Category, Post, Comment,
//! PrivateMessage), the form inputs handed to services, and the joined
//! "with meta" views handed to templates.

mod category;
mod comment;
mod pagination;
mod post;
mod private_message;
mod profile;
mod session;
mod user;

pub use category::{Category, CategoryCount};
pub use comment::{Comment, CommentWithMeta, CreateCommentInput};
pub use pagination::{PageRequest, PagedResult};
pub use post::{Post, PostInput, PostStatus, PostWithMeta};
pub use private_message::{CreateMessageInput, MessageBox, MessageWithMeta, PrivateMessage};
pub use profile::{Profile, DEFAULT_BIO, DEFAULT_PROFILE_PIC, PROFILE_PIC_DIR};
pub use session::Session;
pub use user::{CreateUserInput, UpdateUserInput, User, UserRole, UserSummary};
