use std::sync::Arc;

use axum::Router;
use dealdesk_agent::AgentRuntime;
use dealdesk_db::repositories::{
    ConversationRepository, CustomerRepository, DealRepository, UserRepository,
};
use dealdesk_db::DbPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::{agent, conversations, copilot, health, records};

/// Shared request state. Every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub users: Arc<dyn UserRepository>,
    pub customers: Arc<dyn CustomerRepository>,
    pub deals: Arc<dyn DealRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub agent: AgentRuntime,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(records::router())
        .merge(copilot::router())
        .merge(agent::router())
        .merge(conversations::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use dealdesk_agent::{AgentRuntime, ModelPair, OfflineModel};
    use dealdesk_core::config::{AgentMode, AppConfig};
    use dealdesk_db::repositories::{
        SqlConversationRepository, SqlCustomerRepository, SqlDealRepository, SqlUserRepository,
    };
    use dealdesk_db::{connect_with_settings, migrations, DemoDataset};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::{router, AppState};

    /// Seeded in-memory database with the offline model behind every agent
    /// endpoint.
    pub async fn seeded_state() -> AppState {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        DemoDataset::load(&pool).await.expect("seed");

        let mut config = AppConfig::default();
        config.agent.mode = AgentMode::Offline;

        let users = Arc::new(SqlUserRepository::new(pool.clone()));
        let customers = Arc::new(SqlCustomerRepository::new(pool.clone()));
        let deals = Arc::new(SqlDealRepository::new(pool.clone()));
        let offline = Arc::new(OfflineModel::new());
        let models = ModelPair { chat: offline.clone(), news: offline };
        let agent =
            AgentRuntime::new(&config, models, users.clone(), customers.clone(), deals.clone());

        AppState {
            conversations: Arc::new(SqlConversationRepository::new(pool.clone())),
            db_pool: pool,
            users,
            customers,
            deals,
            agent,
        }
    }

    pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, String::from_utf8(bytes.to_vec()).expect("utf-8 body"))
    }

    pub async fn get_json(state: AppState, uri: &str) -> (StatusCode, Value) {
        let request = Request::get(uri).body(Body::empty()).expect("request");
        let (status, body) = send(router(state), request).await;
        (status, serde_json::from_str(&body).unwrap_or(Value::Null))
    }

    pub async fn post_json(state: AppState, uri: &str, body: Value) -> (StatusCode, String) {
        let request = Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request");
        send(router(state), request).await
    }
}
