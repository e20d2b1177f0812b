//! Private message repository
//!
//! Deletion is per party: each side stamps its own `*_deleted_at` column and
//! the row is purged once both columns are set.

use crate::config::DatabaseDriver;
use crate::db::pool::{require_mysql, require_sqlite};
use crate::db::DynDatabasePool;
use crate::models::{MessageBox, MessageWithMeta, PrivateMessage};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

const MESSAGE_COLUMNS: &str = "m.id, m.subject, m.sender_id, m.recipient_id, m.content, \
     m.content_html, m.sent_at, m.sender_deleted_at, m.recipient_deleted_at";

/// What a per-party deletion did to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Hidden for this party, still visible to the other one
    Hidden,
    /// Both parties deleted it; the row is gone
    Purged,
}

#[async_trait]
pub trait PrivateMessageRepository: Send + Sync {
    async fn create(&self, message: &PrivateMessage) -> Result<PrivateMessage>;

    async fn get_by_id(&self, id: i64) -> Result<Option<PrivateMessage>>;

    /// Number of messages still visible in a user's box
    async fn count_box(&self, user_id: i64, mailbox: MessageBox) -> Result<i64>;

    /// Messages still visible in a user's box, newest first
    async fn list_box(
        &self,
        user_id: i64,
        mailbox: MessageBox,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<MessageWithMeta>>;

    /// Mark a message deleted on every side `user_id` is party to
    async fn mark_deleted(&self, id: i64, user_id: i64, at: DateTime<Utc>) -> Result<DeleteOutcome>;
}

fn box_clause(mailbox: MessageBox) -> &'static str {
    match mailbox {
        MessageBox::Inbox => "m.recipient_id = ? AND m.recipient_deleted_at IS NULL",
        MessageBox::Outbox => "m.sender_id = ? AND m.sender_deleted_at IS NULL",
    }
}

pub struct SqlxPrivateMessageRepository {
    pool: DynDatabasePool,
}

impl SqlxPrivateMessageRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PrivateMessageRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PrivateMessageRepository for SqlxPrivateMessageRepository {
    async fn create(&self, message: &PrivateMessage) -> Result<PrivateMessage> {
        let sql = r#"
            INSERT INTO private_messages (subject, sender_id, recipient_id, content, content_html, sent_at)
            VALUES (?, ?, ?, ?, ?, ?)
        "#;
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(&message.subject)
                .bind(message.sender_id)
                .bind(message.recipient_id)
                .bind(&message.content)
                .bind(&message.content_html)
                .bind(message.sent_at)
                .execute(require_sqlite(&self.pool)?)
                .await
                .context("Failed to create message")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(&message.subject)
                .bind(message.sender_id)
                .bind(message.recipient_id)
                .bind(&message.content)
                .bind(&message.content_html)
                .bind(message.sent_at)
                .execute(require_mysql(&self.pool)?)
                .await
                .context("Failed to create message")?
                .last_insert_id() as i64,
        };

        Ok(PrivateMessage {
            id,
            sender_deleted_at: None,
            recipient_deleted_at: None,
            ..message.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<PrivateMessage>> {
        let sql = format!("SELECT {} FROM private_messages m WHERE m.id = ?", MESSAGE_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(require_sqlite(&self.pool)?)
                    .await
                    .context("Failed to get message")?;
                Ok(row.as_ref().map(row_to_message_sqlite))
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(require_mysql(&self.pool)?)
                    .await
                    .context("Failed to get message")?;
                Ok(row.as_ref().map(row_to_message_mysql))
            }
        }
    }

    async fn count_box(&self, user_id: i64, mailbox: MessageBox) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) AS count FROM private_messages m WHERE {}",
            box_clause(mailbox)
        );
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(user_id)
                .fetch_one(require_sqlite(&self.pool)?)
                .await
                .context("Failed to count messages")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(user_id)
                .fetch_one(require_mysql(&self.pool)?)
                .await
                .context("Failed to count messages")?
                .get("count"),
        };
        Ok(count)
    }

    async fn list_box(
        &self,
        user_id: i64,
        mailbox: MessageBox,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<MessageWithMeta>> {
        let sql = format!(
            r#"
            SELECT {}, s.username AS sender_username, r.username AS recipient_username
            FROM private_messages m
            INNER JOIN users s ON s.id = m.sender_id
            INNER JOIN users r ON r.id = m.recipient_id
            WHERE {}
            ORDER BY m.sent_at DESC, m.id DESC
            LIMIT ? OFFSET ?
            "#,
            MESSAGE_COLUMNS,
            box_clause(mailbox)
        );
        let messages: Vec<MessageWithMeta> = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .bind(user_id)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(require_sqlite(&self.pool)?)
                    .await
                    .context("Failed to list messages")?;
                rows.iter()
                    .map(|row| MessageWithMeta {
                        message: row_to_message_sqlite(row),
                        sender_username: row.get("sender_username"),
                        recipient_username: row.get("recipient_username"),
                    })
                    .collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(&sql)
                    .bind(user_id)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(require_mysql(&self.pool)?)
                    .await
                    .context("Failed to list messages")?;
                rows.iter()
                    .map(|row| MessageWithMeta {
                        message: row_to_message_mysql(row),
                        sender_username: row.get("sender_username"),
                        recipient_username: row.get("recipient_username"),
                    })
                    .collect()
            }
        };
        Ok(messages)
    }

    async fn mark_deleted(&self, id: i64, user_id: i64, at: DateTime<Utc>) -> Result<DeleteOutcome> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                mark_deleted_sqlite(require_sqlite(&self.pool)?, id, user_id, at).await
            }
            DatabaseDriver::Mysql => {
                mark_deleted_mysql(require_mysql(&self.pool)?, id, user_id, at).await
            }
        }
    }
}

const MARK_SENDER_SQL: &str = "UPDATE private_messages SET sender_deleted_at = ? \
     WHERE id = ? AND sender_id = ? AND sender_deleted_at IS NULL";
const MARK_RECIPIENT_SQL: &str = "UPDATE private_messages SET recipient_deleted_at = ? \
     WHERE id = ? AND recipient_id = ? AND recipient_deleted_at IS NULL";
const PURGE_SQL: &str = "DELETE FROM private_messages \
     WHERE id = ? AND sender_deleted_at IS NOT NULL AND recipient_deleted_at IS NOT NULL";

async fn mark_deleted_sqlite(
    pool: &SqlitePool,
    id: i64,
    user_id: i64,
    at: DateTime<Utc>,
) -> Result<DeleteOutcome> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    for sql in [MARK_SENDER_SQL, MARK_RECIPIENT_SQL] {
        sqlx::query(sql)
            .bind(at)
            .bind(id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("Failed to mark message deleted")?;
    }

    let purged = sqlx::query(PURGE_SQL)
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to purge message")?
        .rows_affected();

    tx.commit().await.context("Failed to commit message deletion")?;

    Ok(if purged > 0 {
        DeleteOutcome::Purged
    } else {
        DeleteOutcome::Hidden
    })
}

async fn mark_deleted_mysql(
    pool: &MySqlPool,
    id: i64,
    user_id: i64,
    at: DateTime<Utc>,
) -> Result<DeleteOutcome> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    for sql in [MARK_SENDER_SQL, MARK_RECIPIENT_SQL] {
        sqlx::query(sql)
            .bind(at)
            .bind(id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("Failed to mark message deleted")?;
    }

    let purged = sqlx::query(PURGE_SQL)
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to purge message")?
        .rows_affected();

    tx.commit().await.context("Failed to commit message deletion")?;

    Ok(if purged > 0 {
        DeleteOutcome::Purged
    } else {
        DeleteOutcome::Hidden
    })
}

fn row_to_message_sqlite(row: &sqlx::sqlite::SqliteRow) -> PrivateMessage {
    PrivateMessage {
        id: row.get("id"),
        subject: row.get("subject"),
        sender_id: row.get("sender_id"),
        recipient_id: row.get("recipient_id"),
        content: row.get("content"),
        content_html: row.get("content_html"),
        sent_at: row.get("sent_at"),
        sender_deleted_at: row.get("sender_deleted_at"),
        recipient_deleted_at: row.get("recipient_deleted_at"),
    }
}

fn row_to_message_mysql(row: &sqlx::mysql::MySqlRow) -> PrivateMessage {
    PrivateMessage {
        id: row.get("id"),
        subject: row.get("subject"),
        sender_id: row.get("sender_id"),
        recipient_id: row.get("recipient_id"),
        content: row.get("content"),
        content_html: row.get("content_html"),
        sent_at: row.get("sent_at"),
        sender_deleted_at: row.get("sender_deleted_at"),
        recipient_deleted_at: row.get("recipient_deleted_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{User, UserRole};
    use chrono::Duration;

    struct Fixture {
        repo: SqlxPrivateMessageRepository,
        alice: i64,
        bob: i64,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        let users = SqlxUserRepository::new(pool.clone());
        let mut ids = Vec::new();
        for name in ["alice", "bob"] {
            let user = users
                .create(&User::new(
                    name.into(),
                    format!("{}@example.com", name),
                    String::new(),
                    String::new(),
                    "hash".into(),
                    UserRole::Member,
                ))
                .await
                .unwrap();
            ids.push(user.id);
        }
        Fixture {
            repo: SqlxPrivateMessageRepository::new(pool),
            alice: ids[0],
            bob: ids[1],
        }
    }

    fn message(sender_id: i64, recipient_id: i64, subject: &str, minutes_ago: i64) -> PrivateMessage {
        PrivateMessage {
            id: 0,
            subject: subject.to_string(),
            sender_id,
            recipient_id,
            content: "Bonjour".to_string(),
            content_html: "<p>Bonjour</p>".to_string(),
            sent_at: Utc::now() - Duration::minutes(minutes_ago),
            sender_deleted_at: None,
            recipient_deleted_at: None,
        }
    }

    #[tokio::test]
    async fn test_boxes_newest_first() {
        let f = setup().await;
        f.repo.create(&message(f.alice, f.bob, "ancien", 10)).await.unwrap();
        f.repo.create(&message(f.alice, f.bob, "récent", 1)).await.unwrap();

        let inbox = f.repo.list_box(f.bob, MessageBox::Inbox, 0, 25).await.unwrap();
        let subjects: Vec<_> = inbox.iter().map(|m| m.message.subject.as_str()).collect();
        assert_eq!(subjects, vec!["récent", "ancien"]);
        assert_eq!(inbox[0].sender_username, "alice");
        assert_eq!(inbox[0].recipient_username, "bob");

        assert_eq!(f.repo.count_box(f.alice, MessageBox::Outbox).await.unwrap(), 2);
        assert_eq!(f.repo.count_box(f.alice, MessageBox::Inbox).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_soft_delete_then_purge() {
        let f = setup().await;
        let msg = f.repo.create(&message(f.alice, f.bob, "sujet", 0)).await.unwrap();

        let outcome = f.repo.mark_deleted(msg.id, f.alice, Utc::now()).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Hidden);
        assert_eq!(f.repo.count_box(f.alice, MessageBox::Outbox).await.unwrap(), 0);
        assert_eq!(f.repo.count_box(f.bob, MessageBox::Inbox).await.unwrap(), 1);

        let stored = f.repo.get_by_id(msg.id).await.unwrap().unwrap();
        assert!(stored.sender_deleted_at.is_some());
        assert!(stored.recipient_deleted_at.is_none());

        let outcome = f.repo.mark_deleted(msg.id, f.bob, Utc::now()).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Purged);
        assert!(f.repo.get_by_id(msg.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_message_to_self_purged_at_once() {
        let f = setup().await;
        let msg = f.repo.create(&message(f.alice, f.alice, "note", 0)).await.unwrap();

        let outcome = f.repo.mark_deleted(msg.id, f.alice, Utc::now()).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Purged);
    }

    #[tokio::test]
    async fn test_outsider_cannot_delete() {
        let f = setup().await;
        let msg = f.repo.create(&message(f.alice, f.alice, "note", 0)).await.unwrap();

        let outcome = f.repo.mark_deleted(msg.id, f.bob, Utc::now()).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Hidden);
        let stored = f.repo.get_by_id(msg.id).await.unwrap().unwrap();
        assert!(stored.sender_deleted_at.is_none());
        assert!(stored.recipient_deleted_at.is_none());
    }
}
