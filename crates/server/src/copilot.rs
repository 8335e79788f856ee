use axum::{extract::State, routing::post, Json, Router};
use dealdesk_core::domain::user::UserId;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::app::AppState;
use crate::error::{bad_request, upstream, ApiResult};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/v1/copilot/chat", post(chat))
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    if request.user_id.trim().is_empty() {
        return Err(bad_request("user_id must not be empty"));
    }
    if request.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    info!(event_name = "copilot.chat.received", user_id = %request.user_id, "copilot chat");
    let response = state
        .agent
        .copilot
        .chat(&UserId(request.user_id), &request.query)
        .await
        .map_err(upstream)?;

    Ok(Json(ChatResponse { response }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    use crate::app::testing::{post_json, seeded_state};

    #[tokio::test]
    async fn chat_answers_from_the_callers_deals() {
        let (status, body) = post_json(
            seeded_state().await,
            "/api/v1/copilot/chat",
            json!({"user_id": "2", "query": "担当案件を教えて"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_str(&body).expect("json body");
        let response = body["response"].as_str().expect("response text");
        assert!(response.contains("楽天グループ株式会社"));
        assert!(!response.contains("ソフトバンク株式会社"));
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let (status, _) = post_json(
            seeded_state().await,
            "/api/v1/copilot/chat",
            json!({"user_id": "1", "query": "  "}),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
