use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use dealdesk_core::domain::conversation::{Conversation, ConversationId};
use dealdesk_core::domain::user::UserId;
use dealdesk_db::repositories::ConversationSummary;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::app::AppState;
use crate::error::{bad_request, not_found, storage, ApiResult};

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub user_id: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ConversationListItem {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ConversationSummary> for ConversationListItem {
    fn from(summary: ConversationSummary) -> Self {
        Self {
            id: summary.id.0,
            user_id: summary.user_id.0,
            title: summary.title,
            message_count: summary.message_count,
            created_at: summary.created_at,
            updated_at: summary.updated_at,
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/conversations", get(list))
        .route("/api/v1/conversations/{id}", get(show).delete(remove))
}

async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<ConversationListItem>>> {
    let Some(user_id) = query.user_id.filter(|id| !id.trim().is_empty()) else {
        return Err(bad_request("user_id is required"));
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let summaries =
        state.conversations.list_for_user(&UserId(user_id), limit).await.map_err(storage)?;
    Ok(Json(summaries.into_iter().map(ConversationListItem::from).collect()))
}

async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Conversation>> {
    match state.conversations.find_by_id(&ConversationId(id.clone())).await.map_err(storage)? {
        Some(conversation) if conversation.is_active => Ok(Json(conversation)),
        _ => Err(not_found("conversation", id)),
    }
}

async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    if state.conversations.deactivate(&ConversationId(id.clone())).await.map_err(storage)? {
        info!(
            event_name = "conversation.deactivated",
            conversation_id = %id,
            "conversation deleted"
        );
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("conversation", id))
    }
}
