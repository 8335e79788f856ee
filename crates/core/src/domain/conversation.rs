use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::user::UserId;

const TITLE_MAX_CHARS: usize = 30;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One tool invocation made while producing an assistant message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchStep {
    pub tool_name: String,
    pub arguments: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search_history: Vec<SearchStep>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub user_id: UserId,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_active: bool,
}

impl ConversationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = crate::errors::DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(crate::errors::DomainError::InvariantViolation(format!(
                "unknown message role `{other}`"
            ))),
        }
    }
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            search_history: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>, search_history: Vec<SearchStep>) -> Self {
        Self { search_history, ..Self::new(MessageRole::Assistant, content) }
    }
}

impl Conversation {
    /// Starts an empty, active conversation titled after the opening query.
    pub fn start(user_id: UserId, opening_query: &str) -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::generate(),
            user_id,
            title: title_from_query(opening_query),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            is_active: true,
        }
    }
}

/// First thirty characters of the query, with an ellipsis when truncated.
pub fn title_from_query(query: &str) -> String {
    let trimmed = query.trim();
    if trimmed.chars().count() <= TITLE_MAX_CHARS {
        return trimmed.to_string();
    }
    let mut title: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
    title.push_str("...");
    title
}

#[cfg(test)]
mod tests {
    use super::{title_from_query, Conversation, Message, MessageRole};
    use crate::domain::user::UserId;

    #[test]
    fn short_query_is_used_verbatim_as_title() {
        assert_eq!(title_from_query("私の担当案件を教えて"), "私の担当案件を教えて");
    }

    #[test]
    fn long_query_is_truncated_on_character_boundary() {
        let query = "あ".repeat(31);
        let title = title_from_query(&query);

        assert_eq!(title.chars().count(), 33);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn new_conversation_is_active_and_empty() {
        let conversation = Conversation::start(UserId("1".to_string()), "KDDIの案件");

        assert!(conversation.is_active);
        assert!(conversation.messages.is_empty());
        assert_eq!(conversation.created_at, conversation.updated_at);
    }

    #[test]
    fn assistant_message_without_history_omits_field() {
        let message = Message::assistant("回答", Vec::new());
        let encoded = serde_json::to_value(&message).expect("encode message");

        assert_eq!(message.role, MessageRole::Assistant);
        assert!(encoded.get("search_history").is_none());
    }
}
