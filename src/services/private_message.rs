//! Private message service
//!
//! Inbox, outbox, compose, reply and per-party deletion. A message is only
//! reachable by its two parties, and only until the viewing party deletes
//! it; anyone else gets a plain "not found".

use crate::db::repositories::{DeleteOutcome, PrivateMessageRepository, UserRepository};
use crate::models::{
    CreateMessageInput, MessageBox, MessageWithMeta, PageRequest, PagedResult, PrivateMessage, User,
};
use crate::services::markdown::MarkdownRenderer;
use crate::services::validation::{check_length, FieldErrors};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

/// Messages per inbox or outbox page
pub const MESSAGES_PER_PAGE: u32 = 25;

pub const MAX_SUBJECT_LENGTH: usize = 150;

#[derive(Debug, thiserror::Error)]
pub enum MessageServiceError {
    #[error("Message not found: {0}")]
    NotFound(i64),

    #[error("Validation error: {0}")]
    Validation(FieldErrors),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct MessageService {
    repo: Arc<dyn PrivateMessageRepository>,
    user_repo: Arc<dyn UserRepository>,
    markdown: MarkdownRenderer,
}

impl MessageService {
    pub fn new(repo: Arc<dyn PrivateMessageRepository>, user_repo: Arc<dyn UserRepository>) -> Self {
        Self {
            repo,
            user_repo,
            markdown: MarkdownRenderer::new(),
        }
    }

    pub async fn inbox(
        &self,
        user: &User,
        page: Option<&str>,
    ) -> Result<PagedResult<MessageWithMeta>, MessageServiceError> {
        self.mailbox(user.id, MessageBox::Inbox, page).await
    }

    pub async fn outbox(
        &self,
        user: &User,
        page: Option<&str>,
    ) -> Result<PagedResult<MessageWithMeta>, MessageServiceError> {
        self.mailbox(user.id, MessageBox::Outbox, page).await
    }

    /// Send a new message from `sender`
    pub async fn compose(
        &self,
        sender: &User,
        input: CreateMessageInput,
    ) -> Result<PrivateMessage, MessageServiceError> {
        let mut errors = FieldErrors::new();
        let subject = input.subject.trim();
        check_length("subject", subject, 1, MAX_SUBJECT_LENGTH, &mut errors);
        if input.content.trim().is_empty() {
            errors.add("content", "Ce champ est obligatoire.");
        }

        // The recipient list offers every member except the sender
        let recipient = if input.recipient_id == sender.id {
            None
        } else {
            self.user_repo
                .get_by_id(input.recipient_id)
                .await
                .context("Failed to get recipient")?
        };
        if recipient.is_none() {
            errors.add(
                "recipient",
                "Sélectionnez un choix valide. Ce choix ne fait pas partie de ceux disponibles.",
            );
        }
        errors.into_result().map_err(MessageServiceError::Validation)?;

        let message = self
            .repo
            .create(&PrivateMessage {
                id: 0,
                subject: subject.to_string(),
                sender_id: sender.id,
                recipient_id: input.recipient_id,
                content_html: self.markdown.render(&input.content),
                content: input.content,
                sent_at: Utc::now(),
                sender_deleted_at: None,
                recipient_deleted_at: None,
            })
            .await
            .context("Failed to send message")?;

        tracing::debug!(
            "Message {} sent from {} to user {}",
            message.id,
            sender.username,
            message.recipient_id
        );
        Ok(message)
    }

    /// A message as seen by `viewer`, with both parties' names
    pub async fn detail(&self, viewer: &User, id: i64) -> Result<MessageWithMeta, MessageServiceError> {
        let message = self.visible(viewer, id).await?;
        let sender_username = self.username(message.sender_id).await?;
        let recipient_username = self.username(message.recipient_id).await?;
        Ok(MessageWithMeta {
            message,
            sender_username,
            recipient_username,
        })
    }

    /// Reply to message `id`; the reply goes to the other party
    pub async fn reply(
        &self,
        viewer: &User,
        id: i64,
        subject: &str,
        content: &str,
    ) -> Result<PrivateMessage, MessageServiceError> {
        let original = self.visible(viewer, id).await?;
        let input = CreateMessageInput::new(original.other_party(viewer.id), subject, content);
        self.compose(viewer, input).await
    }

    /// Delete message `id` for `viewer`
    pub async fn delete(&self, viewer: &User, id: i64) -> Result<DeleteOutcome, MessageServiceError> {
        self.visible(viewer, id).await?;
        let outcome = self
            .repo
            .mark_deleted(id, viewer.id, Utc::now())
            .await
            .context("Failed to delete message")?;

        if outcome == DeleteOutcome::Purged {
            tracing::info!("Message {} removed, deleted by both parties", id);
        }
        Ok(outcome)
    }

    async fn visible(&self, viewer: &User, id: i64) -> Result<PrivateMessage, MessageServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get message")?
            .filter(|m| m.is_visible_to(viewer.id))
            .ok_or(MessageServiceError::NotFound(id))
    }

    async fn username(&self, user_id: i64) -> Result<String, MessageServiceError> {
        let user = self
            .user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to get message party")?
            .with_context(|| format!("User {} not found", user_id))?;
        Ok(user.username)
    }

    async fn mailbox(
        &self,
        user_id: i64,
        mailbox: MessageBox,
        raw_page: Option<&str>,
    ) -> Result<PagedResult<MessageWithMeta>, MessageServiceError> {
        let total = self
            .repo
            .count_box(user_id, mailbox)
            .await
            .context("Failed to count messages")?;
        let request = PageRequest::resolve(raw_page, total, MESSAGES_PER_PAGE);
        let items = self
            .repo
            .list_box(user_id, mailbox, request.offset(), request.limit())
            .await
            .context("Failed to list messages")?;
        Ok(PagedResult::new(items, total, &request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxPrivateMessageRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::UserRole;

    struct Fixture {
        service: MessageService,
        alice: User,
        bob: User,
        carol: User,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");

        let users = SqlxUserRepository::boxed(pool.clone());
        let mut created = Vec::new();
        for name in ["alice", "bob", "carol"] {
            created.push(
                users
                    .create(&User::new(
                        name.into(),
                        format!("{}@example.com", name),
                        String::new(),
                        String::new(),
                        "hash".into(),
                        UserRole::Member,
                    ))
                    .await
                    .unwrap(),
            );
        }
        let carol = created.pop().unwrap();
        let bob = created.pop().unwrap();
        let alice = created.pop().unwrap();

        Fixture {
            service: MessageService::new(SqlxPrivateMessageRepository::boxed(pool), users),
            alice,
            bob,
            carol,
        }
    }

    #[tokio::test]
    async fn test_compose_lands_in_both_boxes() {
        let f = setup().await;
        let sent = f
            .service
            .compose(&f.alice, CreateMessageInput::new(f.bob.id, " Salut ", "Ça va **bien** ?"))
            .await
            .unwrap();
        assert_eq!(sent.subject, "Salut");
        assert!(sent.content_html.contains("<strong>bien</strong>"));

        let inbox = f.service.inbox(&f.bob, None).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox.items[0].sender_username, "alice");
        assert_eq!(f.service.outbox(&f.alice, None).await.unwrap().len(), 1);
        assert!(f.service.inbox(&f.alice, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_compose_validation() {
        let f = setup().await;
        let result = f
            .service
            .compose(&f.alice, CreateMessageInput::new(9999, "", "  "))
            .await;
        match result {
            Err(MessageServiceError::Validation(errors)) => {
                assert!(errors.has("subject"));
                assert!(errors.has("content"));
                assert!(errors.has("recipient"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_compose_to_self_is_refused() {
        let f = setup().await;
        let result = f
            .service
            .compose(&f.alice, CreateMessageInput::new(f.alice.id, "Note", "Pour moi"))
            .await;
        match result {
            Err(MessageServiceError::Validation(errors)) => {
                assert!(errors.has("recipient"));
                assert!(!errors.has("subject"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(f.service.outbox(&f.alice, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_outsider_gets_not_found() {
        let f = setup().await;
        let sent = f
            .service
            .compose(&f.alice, CreateMessageInput::new(f.bob.id, "Privé", "secret"))
            .await
            .unwrap();

        assert!(f.service.detail(&f.bob, sent.id).await.is_ok());
        assert!(matches!(
            f.service.detail(&f.carol, sent.id).await,
            Err(MessageServiceError::NotFound(_))
        ));
        assert!(matches!(
            f.service.delete(&f.carol, sent.id).await,
            Err(MessageServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reply_goes_to_other_party() {
        let f = setup().await;
        let sent = f
            .service
            .compose(&f.alice, CreateMessageInput::new(f.bob.id, "Question", "?"))
            .await
            .unwrap();

        let reply = f
            .service
            .reply(&f.bob, sent.id, "Re: Question", "Réponse")
            .await
            .unwrap();
        assert_eq!(reply.sender_id, f.bob.id);
        assert_eq!(reply.recipient_id, f.alice.id);
        assert_eq!(f.service.inbox(&f.alice, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_is_per_party() {
        let f = setup().await;
        let sent = f
            .service
            .compose(&f.alice, CreateMessageInput::new(f.bob.id, "Sujet", "texte"))
            .await
            .unwrap();

        assert_eq!(
            f.service.delete(&f.bob, sent.id).await.unwrap(),
            DeleteOutcome::Hidden
        );
        assert!(f.service.inbox(&f.bob, None).await.unwrap().is_empty());
        assert!(matches!(
            f.service.detail(&f.bob, sent.id).await,
            Err(MessageServiceError::NotFound(_))
        ));
        assert_eq!(f.service.outbox(&f.alice, None).await.unwrap().len(), 1);

        assert_eq!(
            f.service.delete(&f.alice, sent.id).await.unwrap(),
            DeleteOutcome::Purged
        );
    }

    #[tokio::test]
    async fn test_inbox_pages_by_twenty_five() {
        let f = setup().await;
        for i in 0..27 {
            f.service
                .compose(&f.alice, CreateMessageInput::new(f.bob.id, format!("n°{}", i), "x"))
                .await
                .unwrap();
        }

        let first = f.service.inbox(&f.bob, Some("1")).await.unwrap();
        assert_eq!(first.len(), 25);
        assert_eq!(first.total_pages, 2);
        let fallback = f.service.inbox(&f.bob, Some("abc")).await.unwrap();
        assert_eq!(fallback.page, 1);
        let last = f.service.inbox(&f.bob, Some("7")).await.unwrap();
        assert_eq!(last.len(), 2);
    }
}
