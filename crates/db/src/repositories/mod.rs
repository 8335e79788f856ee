use async_trait::async_trait;
use thiserror::Error;

use dealdesk_core::domain::conversation::{Conversation, ConversationId, Message};
use dealdesk_core::domain::customer::{Customer, CustomerId};
use dealdesk_core::domain::deal::{Deal, DealFilter, DealId};
use dealdesk_core::domain::user::{User, UserId};

pub mod conversation;
pub mod customer;
pub mod deal;
pub mod memory;
pub mod user;

pub use conversation::SqlConversationRepository;
pub use customer::SqlCustomerRepository;
pub use deal::SqlDealRepository;
pub use memory::{
    InMemoryConversationRepository, InMemoryCustomerRepository, InMemoryDealRepository,
    InMemoryUserRepository,
};
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub department: Option<String>,
    pub role: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CustomerFilter {
    pub industry: Option<String>,
    /// Substring of the customer name.
    pub keyword: Option<String>,
}

/// Listing row for a conversation; messages are loaded only by `find_by_id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub user_id: UserId,
    pub title: String,
    pub message_count: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        self.department.as_deref().map_or(true, |dept| user.department.as_deref() == Some(dept))
            && self.role.as_deref().map_or(true, |role| user.role.as_deref() == Some(role))
    }
}

impl CustomerFilter {
    pub fn matches(&self, customer: &Customer) -> bool {
        self.industry
            .as_deref()
            .map_or(true, |industry| customer.industry.as_deref() == Some(industry))
            && self.keyword.as_deref().map_or(true, |keyword| customer.name_contains(keyword))
    }
}

/// Listings return rows in insertion order.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    async fn list(&self, filter: &UserFilter) -> Result<Vec<User>, RepositoryError>;
    async fn upsert(&self, user: User) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, RepositoryError>;
    async fn list(&self, filter: &CustomerFilter) -> Result<Vec<Customer>, RepositoryError>;
    async fn upsert(&self, customer: Customer) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait DealRepository: Send + Sync {
    async fn find_by_id(&self, id: &DealId) -> Result<Option<Deal>, RepositoryError>;
    async fn list(&self, filter: &DealFilter) -> Result<Vec<Deal>, RepositoryError>;
    async fn upsert(&self, deal: Deal) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn create(&self, conversation: Conversation) -> Result<(), RepositoryError>;

    /// Returns the conversation whether or not it is still active.
    async fn find_by_id(&self, id: &ConversationId)
        -> Result<Option<Conversation>, RepositoryError>;

    /// Active conversations for `user_id`, most recently updated first.
    async fn list_for_user(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<ConversationSummary>, RepositoryError>;

    /// Appends at the tail and bumps `updated_at`. Returns `false` when the
    /// conversation does not exist or has been deactivated.
    async fn append_message(
        &self,
        id: &ConversationId,
        message: Message,
    ) -> Result<bool, RepositoryError>;

    /// Soft delete. Returns `false` when there was nothing active to delete.
    async fn deactivate(&self, id: &ConversationId) -> Result<bool, RepositoryError>;
}
