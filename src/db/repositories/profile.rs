//! Profile repository

use crate::config::DatabaseDriver;
use crate::db::pool::{require_mysql, require_sqlite};
use crate::db::DynDatabasePool;
use crate::models::Profile;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Insert a profile and return it with its new id
    async fn create(&self, profile: &Profile) -> Result<Profile>;

    async fn get_by_user_id(&self, user_id: i64) -> Result<Option<Profile>>;

    /// Update bio and picture of an existing profile
    async fn update(&self, profile: &Profile) -> Result<()>;
}

pub struct SqlxProfileRepository {
    pool: DynDatabasePool,
}

impl SqlxProfileRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ProfileRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ProfileRepository for SqlxProfileRepository {
    async fn create(&self, profile: &Profile) -> Result<Profile> {
        let sql = "INSERT INTO profiles (user_id, bio, profile_pic) VALUES (?, ?, ?)";
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(profile.user_id)
                .bind(&profile.bio)
                .bind(&profile.profile_pic)
                .execute(require_sqlite(&self.pool)?)
                .await
                .context("Failed to create profile")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(profile.user_id)
                .bind(&profile.bio)
                .bind(&profile.profile_pic)
                .execute(require_mysql(&self.pool)?)
                .await
                .context("Failed to create profile")?
                .last_insert_id() as i64,
        };

        Ok(Profile {
            id,
            ..profile.clone()
        })
    }

    async fn get_by_user_id(&self, user_id: i64) -> Result<Option<Profile>> {
        let sql = "SELECT id, user_id, bio, profile_pic FROM profiles WHERE user_id = ?";
        let profile = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(user_id)
                .fetch_optional(require_sqlite(&self.pool)?)
                .await
                .context("Failed to get profile")?
                .map(|row| Profile {
                    id: row.get("id"),
                    user_id: row.get("user_id"),
                    bio: row.get("bio"),
                    profile_pic: row.get("profile_pic"),
                }),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(user_id)
                .fetch_optional(require_mysql(&self.pool)?)
                .await
                .context("Failed to get profile")?
                .map(|row| Profile {
                    id: row.get("id"),
                    user_id: row.get("user_id"),
                    bio: row.get("bio"),
                    profile_pic: row.get("profile_pic"),
                }),
        };
        Ok(profile)
    }

    async fn update(&self, profile: &Profile) -> Result<()> {
        let sql = "UPDATE profiles SET bio = ?, profile_pic = ? WHERE user_id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(&profile.bio)
                    .bind(&profile.profile_pic)
                    .bind(profile.user_id)
                    .execute(require_sqlite(&self.pool)?)
                    .await
                    .context("Failed to update profile")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(&profile.bio)
                    .bind(&profile.profile_pic)
                    .bind(profile.user_id)
                    .execute(require_mysql(&self.pool)?)
                    .await
                    .context("Failed to update profile")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{User, UserRole, DEFAULT_BIO};

    async fn setup() -> (SqlxProfileRepository, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        let user = SqlxUserRepository::new(pool.clone())
            .create(&User::new(
                "alice".into(),
                "alice@example.com".into(),
                String::new(),
                String::new(),
                "hash".into(),
                UserRole::Member,
            ))
            .await
            .unwrap();
        (SqlxProfileRepository::new(pool), user.id)
    }

    #[tokio::test]
    async fn test_create_and_update_profile() {
        let (repo, user_id) = setup().await;

        let created = repo.create(&Profile::for_user(user_id)).await.unwrap();
        assert!(created.id > 0);

        let mut profile = repo.get_by_user_id(user_id).await.unwrap().unwrap();
        assert_eq!(profile.bio, DEFAULT_BIO);

        profile.bio = "J'aime le jardinage".into();
        profile.profile_pic = "images/profile/abc.png".into();
        repo.update(&profile).await.unwrap();

        let profile = repo.get_by_user_id(user_id).await.unwrap().unwrap();
        assert_eq!(profile.bio, "J'aime le jardinage");
        assert_eq!(profile.profile_pic, "images/profile/abc.png");
    }

    #[tokio::test]
    async fn test_one_profile_per_user() {
        let (repo, user_id) = setup().await;
        repo.create(&Profile::for_user(user_id)).await.unwrap();
        assert!(repo.create(&Profile::for_user(user_id)).await.is_err());
        assert!(repo.get_by_user_id(user_id + 1).await.unwrap().is_none());
    }
}
