//! Profile service
//!
//! Public member profiles: a short bio and a picture. Only the owner or an
//! admin may change a profile.

use crate::db::repositories::{ProfileRepository, UserRepository};
use crate::models::{Profile, User, DEFAULT_PROFILE_PIC, PROFILE_PIC_DIR};
use crate::services::media::{MediaError, MediaStore};
use crate::services::validation::FieldErrors;
use anyhow::Context;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ProfileServiceError {
    #[error("User not found")]
    NotFound,

    #[error("Not allowed to edit this profile")]
    Forbidden,

    #[error("Validation error: {0}")]
    Validation(FieldErrors),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// What the profile form submits
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub bio: String,
    /// Raw bytes of a new picture, if one was chosen
    pub picture: Option<Vec<u8>>,
}

pub struct ProfileService {
    user_repo: Arc<dyn UserRepository>,
    profile_repo: Arc<dyn ProfileRepository>,
    media: MediaStore,
}

impl ProfileService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        profile_repo: Arc<dyn ProfileRepository>,
        media: MediaStore,
    ) -> Self {
        Self {
            user_repo,
            profile_repo,
            media,
        }
    }

    /// A user and their profile.
    ///
    /// Accounts created before profiles existed get a default one on first
    /// access.
    pub async fn show(&self, user_id: i64) -> Result<(User, Profile), ProfileServiceError> {
        let user = self
            .user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to get user")?
            .ok_or(ProfileServiceError::NotFound)?;

        let profile = match self
            .profile_repo
            .get_by_user_id(user_id)
            .await
            .context("Failed to get profile")?
        {
            Some(profile) => profile,
            None => self
                .profile_repo
                .create(&Profile::for_user(user_id))
                .await
                .context("Failed to create missing profile")?,
        };

        Ok((user, profile))
    }

    pub async fn update(
        &self,
        actor: &User,
        user_id: i64,
        update: ProfileUpdate,
    ) -> Result<Profile, ProfileServiceError> {
        let (_, mut profile) = self.show(user_id).await?;
        if !actor.can_edit(user_id) {
            return Err(ProfileServiceError::Forbidden);
        }

        profile.bio = update.bio.trim().to_string();

        let previous_pic = profile.profile_pic.clone();
        if let Some(bytes) = update.picture.filter(|b| !b.is_empty()) {
            profile.profile_pic = match self.media.save_image(PROFILE_PIC_DIR, &bytes).await {
                Ok(path) => path,
                Err(MediaError::InternalError(e)) => return Err(e.into()),
                Err(e) => {
                    return Err(ProfileServiceError::Validation(FieldErrors::single(
                        "profile_pic",
                        e.to_string(),
                    )))
                }
            };
        }

        self.profile_repo
            .update(&profile)
            .await
            .context("Failed to update profile")?;

        if previous_pic != profile.profile_pic && previous_pic != DEFAULT_PROFILE_PIC {
            self.media.remove(&previous_pic).await;
        }

        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MediaConfig;
    use crate::db::repositories::{SqlxProfileRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{UserRole, DEFAULT_BIO};
    use crate::services::media::tests::PNG_BYTES;
    use tempfile::TempDir;

    struct Fixture {
        service: ProfileService,
        alice: User,
        bob: User,
        admin: User,
        _media: TempDir,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");

        let users = SqlxUserRepository::boxed(pool.clone());
        let profiles = SqlxProfileRepository::boxed(pool.clone());
        let mut created = Vec::new();
        for (name, role) in [
            ("alice", UserRole::Member),
            ("bob", UserRole::Member),
            ("admin", UserRole::Admin),
        ] {
            let user = users
                .create(&User::new(
                    name.into(),
                    format!("{}@example.com", name),
                    String::new(),
                    String::new(),
                    "hash".into(),
                    role,
                ))
                .await
                .unwrap();
            profiles.create(&Profile::for_user(user.id)).await.unwrap();
            created.push(user);
        }

        let media = TempDir::new().unwrap();
        let store = MediaStore::new(MediaConfig {
            path: media.path().to_path_buf(),
            ..MediaConfig::default()
        });
        let admin = created.pop().unwrap();
        let bob = created.pop().unwrap();
        let alice = created.pop().unwrap();

        Fixture {
            service: ProfileService::new(users, profiles, store),
            alice,
            bob,
            admin,
            _media: media,
        }
    }

    #[tokio::test]
    async fn test_show_profile() {
        let f = setup().await;
        let (user, profile) = f.service.show(f.alice.id).await.unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(profile.bio, DEFAULT_BIO);
        assert_eq!(profile.profile_pic, DEFAULT_PROFILE_PIC);

        assert!(matches!(
            f.service.show(9999).await,
            Err(ProfileServiceError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_owner_updates_bio_and_picture() {
        let f = setup().await;
        let profile = f
            .service
            .update(
                &f.alice,
                f.alice.id,
                ProfileUpdate {
                    bio: "  J'aime le jardinage.  ".into(),
                    picture: Some(PNG_BYTES.to_vec()),
                },
            )
            .await
            .unwrap();

        assert_eq!(profile.bio, "J'aime le jardinage.");
        assert!(profile.profile_pic.starts_with("images/profile/"));
    }

    #[tokio::test]
    async fn test_other_member_cannot_edit_but_admin_can() {
        let f = setup().await;
        let update = ProfileUpdate {
            bio: "piraté".into(),
            picture: None,
        };

        assert!(matches!(
            f.service.update(&f.bob, f.alice.id, update.clone()).await,
            Err(ProfileServiceError::Forbidden)
        ));
        assert!(f.service.update(&f.admin, f.alice.id, update).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_picture_is_a_field_error() {
        let f = setup().await;
        let result = f
            .service
            .update(
                &f.alice,
                f.alice.id,
                ProfileUpdate {
                    bio: "bio".into(),
                    picture: Some(b"not an image".to_vec()),
                },
            )
            .await;

        match result {
            Err(ProfileServiceError::Validation(errors)) => assert!(errors.has("profile_pic")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
