use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;

use dealdesk_core::domain::conversation::{
    Conversation, ConversationId, Message, MessageRole, SearchStep,
};
use dealdesk_core::domain::user::UserId;

use super::{ConversationRepository, ConversationSummary, RepositoryError};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Fixed-width UTC timestamps so that text ordering matches time ordering.
fn encode_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

fn encode_search_history(history: &[SearchStep]) -> Result<Option<String>, RepositoryError> {
    if history.is_empty() {
        return Ok(None);
    }
    serde_json::to_string(history)
        .map(Some)
        .map_err(|e| RepositoryError::Decode(format!("search_history: {e}")))
}

fn row_to_summary(row: &sqlx::sqlite::SqliteRow) -> Result<ConversationSummary, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let user_id: String =
        row.try_get("user_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let title: String =
        row.try_get("title").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let message_count: i64 =
        row.try_get("message_count").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(ConversationSummary {
        id: ConversationId(id),
        user_id: UserId(user_id),
        title,
        message_count,
        created_at: decode_timestamp("created_at", &created_at_str)?,
        updated_at: decode_timestamp("updated_at", &updated_at_str)?,
    })
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let role_str: String =
        row.try_get("role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let content: String =
        row.try_get("content").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let timestamp_str: String =
        row.try_get("timestamp").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let history_json: Option<String> =
        row.try_get("search_history_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let role = role_str.parse::<MessageRole>().map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let search_history = match history_json {
        Some(raw) => serde_json::from_str::<Vec<SearchStep>>(&raw)
            .map_err(|e| RepositoryError::Decode(format!("search_history: {e}")))?,
        None => Vec::new(),
    };

    Ok(Message {
        message_id: id,
        role,
        content,
        timestamp: decode_timestamp("timestamp", &timestamp_str)?,
        search_history,
    })
}

#[async_trait::async_trait]
impl ConversationRepository for SqlConversationRepository {
    async fn create(&self, conversation: Conversation) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO conversation (id, user_id, title, created_at, updated_at, is_active)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&conversation.id.0)
        .bind(&conversation.user_id.0)
        .bind(&conversation.title)
        .bind(encode_timestamp(&conversation.created_at))
        .bind(encode_timestamp(&conversation.updated_at))
        .bind(conversation.is_active)
        .execute(&mut *tx)
        .await?;

        for (position, message) in conversation.messages.iter().enumerate() {
            sqlx::query(
                "INSERT INTO conversation_message
                    (id, conversation_id, position, role, content, timestamp, search_history_json)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&message.message_id)
            .bind(&conversation.id.0)
            .bind(position as i64)
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(encode_timestamp(&message.timestamp))
            .bind(encode_search_history(&message.search_history)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let Some(header) = sqlx::query(
            "SELECT id, user_id, title, created_at, updated_at, is_active
             FROM conversation WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let user_id: String =
            header.try_get("user_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let title: String =
            header.try_get("title").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let created_at_str: String =
            header.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let updated_at_str: String =
            header.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let is_active: bool =
            header.try_get("is_active").map_err(|e| RepositoryError::Decode(e.to_string()))?;

        let message_rows = sqlx::query(
            "SELECT id, role, content, timestamp, search_history_json
             FROM conversation_message
             WHERE conversation_id = ?
             ORDER BY position",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;
        let messages = message_rows.iter().map(row_to_message).collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Conversation {
            id: id.clone(),
            user_id: UserId(user_id),
            title,
            messages,
            created_at: decode_timestamp("created_at", &created_at_str)?,
            updated_at: decode_timestamp("updated_at", &updated_at_str)?,
            is_active,
        }))
    }

    async fn list_for_user(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<ConversationSummary>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT c.id, c.user_id, c.title, c.created_at, c.updated_at,
                    (SELECT COUNT(*) FROM conversation_message m WHERE m.conversation_id = c.id)
                        AS message_count
             FROM conversation c
             WHERE c.user_id = ? AND c.is_active = 1
             ORDER BY c.updated_at DESC, c.rowid DESC
             LIMIT ?",
        )
        .bind(&user_id.0)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_summary).collect()
    }

    async fn append_message(
        &self,
        id: &ConversationId,
        message: Message,
    ) -> Result<bool, RepositoryError> {
        let history = encode_search_history(&message.search_history)?;
        let mut tx = self.pool.begin().await?;

        // Position is computed inside the INSERT so concurrent appends to the
        // same conversation cannot claim the same slot.
        let inserted = sqlx::query(
            "INSERT INTO conversation_message
                (id, conversation_id, position, role, content, timestamp, search_history_json)
             SELECT ?1, c.id,
                    COALESCE((SELECT MAX(m.position) FROM conversation_message m
                              WHERE m.conversation_id = c.id), -1) + 1,
                    ?2, ?3, ?4, ?5
             FROM conversation c
             WHERE c.id = ?6 AND c.is_active = 1",
        )
        .bind(&message.message_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(encode_timestamp(&message.timestamp))
        .bind(history)
        .bind(&id.0)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("UPDATE conversation SET updated_at = ? WHERE id = ?")
            .bind(encode_timestamp(&message.timestamp.max(Utc::now())))
            .bind(&id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn deactivate(&self, id: &ConversationId) -> Result<bool, RepositoryError> {
        let updated = sqlx::query(
            "UPDATE conversation SET is_active = 0, updated_at = ? WHERE id = ? AND is_active = 1",
        )
        .bind(encode_timestamp(&Utc::now()))
        .bind(&id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated > 0)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dealdesk_core::domain::conversation::{Conversation, Message, SearchStep};
    use dealdesk_core::domain::user::UserId;
    use serde_json::json;
    use tempfile::TempDir;

    use super::SqlConversationRepository;
    use crate::repositories::ConversationRepository;
    use crate::{connect_with_settings, migrations};

    async fn repo() -> SqlConversationRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlConversationRepository::new(pool)
    }

    #[tokio::test]
    async fn appended_messages_read_back_in_order_with_history() {
        let repo = repo().await;
        let conversation = Conversation::start(UserId("1".to_string()), "私の担当案件は？");
        let id = conversation.id.clone();
        repo.create(conversation).await.expect("create");

        repo.append_message(&id, Message::user("私の担当案件は？")).await.expect("append");
        let history = vec![SearchStep {
            tool_name: "search_deals".to_string(),
            arguments: json!({"sales_user_id": "1"}),
        }];
        repo.append_message(&id, Message::assistant("3件あります。", history.clone()))
            .await
            .expect("append");

        let stored = repo.find_by_id(&id).await.expect("find").expect("conversation exists");
        assert_eq!(stored.messages.len(), 2);
        assert_eq!(stored.messages[0].content, "私の担当案件は？");
        assert_eq!(stored.messages[1].search_history, history);
        assert!(stored.updated_at >= stored.created_at);
    }

    #[tokio::test]
    async fn listing_excludes_inactive_and_orders_by_recency() {
        let repo = repo().await;
        let user = UserId("1".to_string());

        let older = Conversation::start(user.clone(), "古い会話");
        let newer = Conversation::start(user.clone(), "新しい会話");
        let deleted = Conversation::start(user.clone(), "削除する会話");
        let (older_id, newer_id, deleted_id) =
            (older.id.clone(), newer.id.clone(), deleted.id.clone());
        for conversation in [older, newer, deleted] {
            repo.create(conversation).await.expect("create");
        }

        repo.append_message(&newer_id, Message::user("追加")).await.expect("append");
        assert!(repo.deactivate(&deleted_id).await.expect("deactivate"));
        assert!(!repo.deactivate(&deleted_id).await.expect("second deactivate is a no-op"));

        let listed = repo.list_for_user(&user, 50).await.expect("list");
        let ids: Vec<_> = listed.iter().map(|summary| summary.id.clone()).collect();
        assert_eq!(ids, vec![newer_id, older_id]);
        assert_eq!(listed[0].message_count, 1);

        let limited = repo.list_for_user(&user, 1).await.expect("list");
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn append_to_missing_or_inactive_conversation_is_rejected() {
        let repo = repo().await;
        let conversation = Conversation::start(UserId("1".to_string()), "q");
        let id = conversation.id.clone();
        repo.create(conversation).await.expect("create");
        repo.deactivate(&id).await.expect("deactivate");

        assert!(!repo.append_message(&id, Message::user("late")).await.expect("append"));

        let stored = repo.find_by_id(&id).await.expect("find").expect("still stored");
        assert!(!stored.is_active);
        assert!(stored.messages.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_are_all_kept() {
        let dir = TempDir::new().expect("temp dir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("dealdesk.db").display());
        let pool = connect_with_settings(&url, 5, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = Arc::new(SqlConversationRepository::new(pool.clone()));

        let conversation = Conversation::start(UserId("1".to_string()), "q");
        let id = conversation.id.clone();
        repo.create(conversation).await.expect("create");

        let mut handles = Vec::new();
        for n in 0..24 {
            let repo = Arc::clone(&repo);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                repo.append_message(&id, Message::user(format!("message {n}"))).await
            }));
        }
        for handle in handles {
            assert!(handle.await.expect("join").expect("append"));
        }

        let stored = repo.find_by_id(&id).await.expect("find").expect("exists");
        assert_eq!(stored.messages.len(), 24);
        let mut contents: Vec<_> =
            stored.messages.iter().map(|message| message.content.clone()).collect();
        contents.sort();
        contents.dedup();
        assert_eq!(contents.len(), 24);
        pool.close().await;
    }
}
