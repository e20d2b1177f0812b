//! Member profile model

use serde::{Deserialize, Serialize};

pub const DEFAULT_BIO: &str = "Plaisir d'aider ou de se faire aider !!";
pub const DEFAULT_PROFILE_PIC: &str = "default_profile_picture.jpg";
/// Media sub-directory for uploaded profile pictures
pub const PROFILE_PIC_DIR: &str = "images/profile";

/// Public profile attached one-to-one to a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub user_id: i64,
    pub bio: String,
    /// Path relative to the media root
    pub profile_pic: String,
}

impl Profile {
    /// Fresh profile with the default bio and picture.
    pub fn for_user(user_id: i64) -> Self {
        Self {
            id: 0,
            user_id,
            bio: DEFAULT_BIO.to_string(),
            profile_pic: DEFAULT_PROFILE_PIC.to_string(),
        }
    }
}
