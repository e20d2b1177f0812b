//! User repository
//!
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL

use crate::config::DatabaseDriver;
use crate::db::pool::{require_mysql, require_sqlite};
use crate::db::DynDatabasePool;
use crate::models::{User, UserRole};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

const USER_COLUMNS: &str =
    "id, username, email, first_name, last_name, password_hash, role, date_joined, last_login";

/// Role of a self-registered account, evaluated inside its INSERT
const REGISTERED_ROLE_SQL: &str =
    "CASE WHEN EXISTS (SELECT 1 FROM users) THEN 'member' ELSE 'admin' END";

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user and return it with its new id
    async fn create(&self, user: &User) -> Result<User>;

    /// Insert a self-registered user. The role is chosen by the insert
    /// itself: admin when the table is empty, member otherwise. `user.role`
    /// is ignored.
    async fn create_registered(&self, user: &User) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Email lookup is case-insensitive
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Update account fields and password hash
    async fn update(&self, user: &User) -> Result<User>;

    async fn update_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<()>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Every user ordered by username
    async fn list_all(&self) -> Result<Vec<User>>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_user_sqlite(require_sqlite(&self.pool)?, user).await,
            DatabaseDriver::Mysql => create_user_mysql(require_mysql(&self.pool)?, user).await,
        }
    }

    async fn create_registered(&self, user: &User) -> Result<User> {
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                insert_registered_sqlite(require_sqlite(&self.pool)?, user).await?
            }
            DatabaseDriver::Mysql => insert_registered_mysql(require_mysql(&self.pool)?, user).await?,
        };
        self.get_by_id(id)
            .await?
            .context("Registered user vanished after insert")
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_user_by_id_sqlite(require_sqlite(&self.pool)?, id).await,
            DatabaseDriver::Mysql => get_user_by_id_mysql(require_mysql(&self.pool)?, id).await,
        }
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE username = ?", USER_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                fetch_user_sqlite(require_sqlite(&self.pool)?, &sql, username).await
            }
            DatabaseDriver::Mysql => {
                fetch_user_mysql(require_mysql(&self.pool)?, &sql, username).await
            }
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE LOWER(email) = LOWER(?)", USER_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => fetch_user_sqlite(require_sqlite(&self.pool)?, &sql, email).await,
            DatabaseDriver::Mysql => fetch_user_mysql(require_mysql(&self.pool)?, &sql, email).await,
        }
    }

    async fn update(&self, user: &User) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_user_sqlite(require_sqlite(&self.pool)?, user).await,
            DatabaseDriver::Mysql => update_user_mysql(require_mysql(&self.pool)?, user).await,
        }
    }

    async fn update_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let sql = "UPDATE users SET last_login = ? WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(at)
                    .bind(id)
                    .execute(require_sqlite(&self.pool)?)
                    .await
                    .context("Failed to update last login")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(at)
                    .bind(id)
                    .execute(require_mysql(&self.pool)?)
                    .await
                    .context("Failed to update last login")?;
            }
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let sql = "DELETE FROM users WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(require_sqlite(&self.pool)?)
                    .await
                    .context("Failed to delete user")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(require_mysql(&self.pool)?)
                    .await
                    .context("Failed to delete user")?;
            }
        }
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<User>> {
        let sql = format!("SELECT {} FROM users ORDER BY username", USER_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .fetch_all(require_sqlite(&self.pool)?)
                    .await
                    .context("Failed to list users")?;
                rows.iter().map(row_to_user_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(&sql)
                    .fetch_all(require_mysql(&self.pool)?)
                    .await
                    .context("Failed to list users")?;
                rows.iter().map(row_to_user_mysql).collect()
            }
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (username, email, first_name, last_name, password_hash, role, date_joined, last_login)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.password_hash)
    .bind(user.role.to_string())
    .bind(user.date_joined)
    .bind(user.last_login)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        ..user.clone()
    })
}

async fn insert_registered_sqlite(pool: &SqlitePool, user: &User) -> Result<i64> {
    let sql = format!(
        "INSERT INTO users (username, email, first_name, last_name, password_hash, role, date_joined, last_login) \
         SELECT ?, ?, ?, ?, ?, {}, ?, ?",
        REGISTERED_ROLE_SQL
    );
    let result = sqlx::query(&sql)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.password_hash)
        .bind(user.date_joined)
        .bind(user.last_login)
        .execute(pool)
        .await
        .context("Failed to register user")?;
    Ok(result.last_insert_rowid())
}

async fn get_user_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn fetch_user_sqlite(pool: &SqlitePool, sql: &str, key: &str) -> Result<Option<User>> {
    let row = sqlx::query(sql)
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("Failed to get user")?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn update_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    sqlx::query(
        r#"
        UPDATE users
        SET username = ?, email = ?, first_name = ?, last_name = ?, password_hash = ?, role = ?
        WHERE id = ?
        "#,
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.password_hash)
    .bind(user.role.to_string())
    .bind(user.id)
    .execute(pool)
    .await
    .context("Failed to update user")?;

    get_user_by_id_sqlite(pool, user.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("User not found after update"))
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let role_str: String = row.get("role");
    let role = UserRole::from_str(&role_str)
        .with_context(|| format!("Invalid role in database: {}", role_str))?;

    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        password_hash: row.get("password_hash"),
        role,
        date_joined: row.get("date_joined"),
        last_login: row.get("last_login"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (username, email, first_name, last_name, password_hash, role, date_joined, last_login)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.password_hash)
    .bind(user.role.to_string())
    .bind(user.date_joined)
    .bind(user.last_login)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_id() as i64,
        ..user.clone()
    })
}

async fn insert_registered_mysql(pool: &MySqlPool, user: &User) -> Result<i64> {
    let sql = format!(
        "INSERT INTO users (username, email, first_name, last_name, password_hash, role, date_joined, last_login) \
         SELECT ?, ?, ?, ?, ?, {}, ?, ? FROM DUAL",
        REGISTERED_ROLE_SQL
    );
    let result = sqlx::query(&sql)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.password_hash)
        .bind(user.date_joined)
        .bind(user.last_login)
        .execute(pool)
        .await
        .context("Failed to register user")?;
    Ok(result.last_insert_id() as i64)
}

async fn get_user_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    row.as_ref().map(row_to_user_mysql).transpose()
}

async fn fetch_user_mysql(pool: &MySqlPool, sql: &str, key: &str) -> Result<Option<User>> {
    let row = sqlx::query(sql)
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("Failed to get user")?;

    row.as_ref().map(row_to_user_mysql).transpose()
}

async fn update_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    sqlx::query(
        r#"
        UPDATE users
        SET username = ?, email = ?, first_name = ?, last_name = ?, password_hash = ?, role = ?
        WHERE id = ?
        "#,
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.password_hash)
    .bind(user.role.to_string())
    .bind(user.id)
    .execute(pool)
    .await
    .context("Failed to update user")?;

    get_user_by_id_mysql(pool, user.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("User not found after update"))
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    let role_str: String = row.get("role");
    let role = UserRole::from_str(&role_str)
        .with_context(|| format!("Invalid role in database: {}", role_str))?;

    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        password_hash: row.get("password_hash"),
        role,
        date_joined: row.get("date_joined"),
        last_login: row.get("last_login"),
    })
}
