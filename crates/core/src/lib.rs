pub mod config;
pub mod domain;
pub mod errors;

pub use config::{AgentMode, AppConfig, ConfigError, LoadOptions, LogFormat};
pub use domain::conversation::{
    Conversation, ConversationId, Message, MessageRole, SearchStep,
};
pub use domain::customer::{Customer, CustomerId};
pub use domain::deal::{Deal, DealFilter, DealId, DealStage};
pub use domain::user::{User, UserId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
