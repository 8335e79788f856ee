use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use dealdesk_db::DbPool;
use serde::Serialize;

use crate::app::AppState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub agent_mode: &'static str,
    pub checked_at: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Banner {
    pub message: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub status: &'static str,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(banner)).route("/api/health", get(health))
}

pub async fn banner() -> Json<Banner> {
    Json(Banner {
        message: "営業支援AIエージェント API",
        service: "dealdesk-server",
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
    })
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "dealdesk-server runtime initialized".to_string(),
        },
        database,
        agent_mode: state.agent.mode.as_str(),
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};

    use crate::app::testing::{get_json, seeded_state};
    use crate::health::health;

    #[tokio::test]
    async fn health_returns_ready_when_database_is_reachable() {
        let state = seeded_state().await;

        let (status, Json(payload)) = health(State(state.clone())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.database.status, "ready");
        assert_eq!(payload.agent_mode, "offline");

        state.db_pool.close().await;
    }

    #[tokio::test]
    async fn health_returns_service_unavailable_when_database_is_unavailable() {
        let state = seeded_state().await;
        state.db_pool.close().await;

        let (status, Json(payload)) = health(State(state)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.database.status, "degraded");
        assert_eq!(payload.service.status, "ready");
    }

    #[tokio::test]
    async fn root_serves_banner() {
        let (status, body) = get_json(seeded_state().await, "/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "dealdesk-server");
        assert_eq!(body["status"], "running");
    }
}
