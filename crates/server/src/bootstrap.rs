use std::sync::Arc;

use dealdesk_agent::{AgentRuntime, LlmError};
use dealdesk_core::config::{AppConfig, ConfigError, LoadOptions};
use dealdesk_db::repositories::{
    SqlConversationRepository, SqlCustomerRepository, SqlDealRepository, SqlUserRepository,
};
use dealdesk_db::{connect_with_settings, migrations, DbPool};
use thiserror::Error;
use tracing::info;

use crate::app::AppState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("agent runtime could not be built: {0}")]
    Agent(#[source] LlmError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        agent_mode = config.agent.mode.as_str(),
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let users = Arc::new(SqlUserRepository::new(db_pool.clone()));
    let customers = Arc::new(SqlCustomerRepository::new(db_pool.clone()));
    let deals = Arc::new(SqlDealRepository::new(db_pool.clone()));
    let agent = AgentRuntime::from_config(&config, users.clone(), customers.clone(), deals.clone())
        .map_err(BootstrapError::Agent)?;

    let state = AppState {
        db_pool: db_pool.clone(),
        users,
        customers,
        deals,
        conversations: Arc::new(SqlConversationRepository::new(db_pool.clone())),
        agent,
    };

    Ok(Application { config, db_pool, state })
}
