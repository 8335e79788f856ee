use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use dealdesk_core::domain::conversation::{Conversation, ConversationId, Message};
use dealdesk_core::domain::customer::{Customer, CustomerId};
use dealdesk_core::domain::deal::{Deal, DealFilter, DealId};
use dealdesk_core::domain::user::{User, UserId};

use super::{
    ConversationRepository, ConversationSummary, CustomerFilter, CustomerRepository,
    DealRepository, RepositoryError, UserFilter, UserRepository,
};

// Record stores keep a Vec so listings come back in insertion order, like the
// SQL repositories ordering by rowid.

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<Vec<User>>,
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.iter().find(|user| &user.user_id == id).cloned())
    }

    async fn list(&self, filter: &UserFilter) -> Result<Vec<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.iter().filter(|user| filter.matches(user)).cloned().collect())
    }

    async fn upsert(&self, user: User) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        match users.iter_mut().find(|existing| existing.user_id == user.user_id) {
            Some(existing) => *existing = user,
            None => users.push(user),
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCustomerRepository {
    customers: RwLock<Vec<Customer>>,
}

#[async_trait::async_trait]
impl CustomerRepository for InMemoryCustomerRepository {
    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, RepositoryError> {
        let customers = self.customers.read().await;
        Ok(customers.iter().find(|customer| &customer.customer_id == id).cloned())
    }

    async fn list(&self, filter: &CustomerFilter) -> Result<Vec<Customer>, RepositoryError> {
        let customers = self.customers.read().await;
        Ok(customers.iter().filter(|customer| filter.matches(customer)).cloned().collect())
    }

    async fn upsert(&self, customer: Customer) -> Result<(), RepositoryError> {
        let mut customers = self.customers.write().await;
        match customers.iter_mut().find(|existing| existing.customer_id == customer.customer_id) {
            Some(existing) => *existing = customer,
            None => customers.push(customer),
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryDealRepository {
    deals: RwLock<Vec<Deal>>,
}

#[async_trait::async_trait]
impl DealRepository for InMemoryDealRepository {
    async fn find_by_id(&self, id: &DealId) -> Result<Option<Deal>, RepositoryError> {
        let deals = self.deals.read().await;
        Ok(deals.iter().find(|deal| &deal.deal_id == id).cloned())
    }

    async fn list(&self, filter: &DealFilter) -> Result<Vec<Deal>, RepositoryError> {
        let deals = self.deals.read().await;
        Ok(deals.iter().filter(|deal| filter.matches(deal)).cloned().collect())
    }

    async fn upsert(&self, deal: Deal) -> Result<(), RepositoryError> {
        let mut deals = self.deals.write().await;
        match deals.iter_mut().find(|existing| existing.deal_id == deal.deal_id) {
            Some(existing) => *existing = deal,
            None => deals.push(deal),
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryConversationRepository {
    conversations: RwLock<HashMap<String, Conversation>>,
}

#[async_trait::async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn create(&self, conversation: Conversation) -> Result<(), RepositoryError> {
        let mut conversations = self.conversations.write().await;
        conversations.insert(conversation.id.0.clone(), conversation);
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(&id.0).cloned())
    }

    async fn list_for_user(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<ConversationSummary>, RepositoryError> {
        let conversations = self.conversations.read().await;
        let mut active: Vec<&Conversation> = conversations
            .values()
            .filter(|conversation| conversation.is_active && &conversation.user_id == user_id)
            .collect();
        active.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        Ok(active
            .into_iter()
            .take(limit as usize)
            .map(|conversation| ConversationSummary {
                id: conversation.id.clone(),
                user_id: conversation.user_id.clone(),
                title: conversation.title.clone(),
                message_count: conversation.messages.len() as i64,
                created_at: conversation.created_at,
                updated_at: conversation.updated_at,
            })
            .collect())
    }

    async fn append_message(
        &self,
        id: &ConversationId,
        message: Message,
    ) -> Result<bool, RepositoryError> {
        let mut conversations = self.conversations.write().await;
        match conversations.get_mut(&id.0) {
            Some(conversation) if conversation.is_active => {
                conversation.updated_at = message.timestamp.max(Utc::now());
                conversation.messages.push(message);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn deactivate(&self, id: &ConversationId) -> Result<bool, RepositoryError> {
        let mut conversations = self.conversations.write().await;
        match conversations.get_mut(&id.0) {
            Some(conversation) if conversation.is_active => {
                conversation.is_active = false;
                conversation.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
