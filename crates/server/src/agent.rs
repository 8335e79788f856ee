use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::post,
    Json, Router,
};
use dealdesk_agent::{AgentQuery, AgentRun, ProgressEvent, ProgressEventType};
use dealdesk_core::domain::conversation::{Conversation, ConversationId, Message, SearchStep};
use dealdesk_core::domain::user::UserId;
use dealdesk_db::repositories::ConversationRepository;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app::AppState;
use crate::error::{bad_request, not_found, storage, ApiResult};

const SERIALIZE_FAILED_EVENT: &str = r#"{"type":"error","message":"イベントの変換に失敗しました"}"#;

#[derive(Debug, Deserialize)]
pub struct AgentRequest {
    pub user_id: String,
    pub query: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AgentQueryResponse {
    pub conversation_id: String,
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub search_history: Vec<SearchStep>,
}

/// Writes the assistant turn once the run produces its final answer.
#[derive(Clone)]
struct AnswerSink {
    conversations: Arc<dyn ConversationRepository>,
    conversation_id: ConversationId,
}

struct PreparedRun {
    sink: AnswerSink,
    query: AgentQuery,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/agent/query-stream", post(query_stream))
        .route("/api/v1/agent/query", post(query))
}

/// Validates the request, resolves or opens the conversation and stores the
/// user's message before the run starts.
async fn prepare(state: &AppState, request: AgentRequest) -> ApiResult<PreparedRun> {
    let user_id = request.user_id.trim();
    if user_id.is_empty() {
        return Err(bad_request("user_id must not be empty"));
    }
    if request.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let user_id = UserId(user_id.to_string());

    let requested = request.conversation_id.as_deref().map(str::trim).filter(|id| !id.is_empty());
    let (conversation_id, history) = match requested {
        Some(id) => {
            let conversation = state
                .conversations
                .find_by_id(&ConversationId(id.to_string()))
                .await
                .map_err(storage)?
                .filter(|conversation| conversation.is_active)
                .ok_or_else(|| not_found("conversation", id))?;
            (conversation.id, conversation.messages)
        }
        None => {
            let conversation = Conversation::start(user_id.clone(), &request.query);
            let id = conversation.id.clone();
            state.conversations.create(conversation).await.map_err(storage)?;
            info!(
                event_name = "agent.conversation.created",
                conversation_id = %id,
                user_id = %user_id,
                "conversation opened"
            );
            (id, Vec::new())
        }
    };

    let appended = state
        .conversations
        .append_message(&conversation_id, Message::user(request.query.clone()))
        .await
        .map_err(storage)?;
    if !appended {
        return Err(not_found("conversation", conversation_id.as_str()));
    }

    Ok(PreparedRun {
        sink: AnswerSink {
            conversations: Arc::clone(&state.conversations),
            conversation_id: conversation_id.clone(),
        },
        query: AgentQuery::new(user_id, request.query)
            .in_conversation(conversation_id, history),
    })
}

async fn query_stream(
    State(state): State<AppState>,
    Json(request): Json<AgentRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let prepared = prepare(&state, request).await?;
    info!(
        event_name = "agent.stream.started",
        conversation_id = %prepared.sink.conversation_id,
        "streaming agent run"
    );
    let run = state.agent.orchestrator.run(prepared.query);
    Ok(Sse::new(sse_events(run, prepared.sink)).keep_alive(KeepAlive::default()))
}

/// One `data:` frame per progress event. Search steps are collected along the
/// way and stored with the final answer.
fn sse_events(run: AgentRun, sink: AnswerSink) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold((run, Vec::new()), move |(mut run, mut steps)| {
        let sink = sink.clone();
        async move {
            let event = run.next_event().await?;
            if let Some(step) = event.search_step() {
                steps.push(step);
            }
            if event.event_type == ProgressEventType::FinalResponse {
                if let Some(content) = event.content.as_deref() {
                    sink.store(content, std::mem::take(&mut steps)).await;
                }
            }
            Some((Ok(sse_frame(&event)), (run, steps)))
        }
    })
}

fn sse_frame(event: &ProgressEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_else(|error| {
        warn!(event_name = "agent.stream.encode_failed", error = %error, "event not encodable");
        SERIALIZE_FAILED_EVENT.to_string()
    });
    Event::default().data(data)
}

async fn query(
    State(state): State<AppState>,
    Json(request): Json<AgentRequest>,
) -> ApiResult<Json<AgentQueryResponse>> {
    let prepared = prepare(&state, request).await?;
    let outcome = state.agent.orchestrator.run(prepared.query).collect().await;

    let response = outcome.final_response().map(str::to_string);
    if let Some(content) = response.as_deref() {
        prepared.sink.store(content, outcome.search_history.clone()).await;
    }

    Ok(Json(AgentQueryResponse {
        conversation_id: prepared.sink.conversation_id.0,
        error: outcome.error_message().map(str::to_string),
        response,
        search_history: outcome.search_history,
    }))
}

impl AnswerSink {
    /// Storage failures are logged; the caller already has the answer.
    async fn store(&self, content: &str, search_history: Vec<SearchStep>) {
        let message = Message::assistant(content, search_history);
        match self.conversations.append_message(&self.conversation_id, message).await {
            Ok(true) => {}
            Ok(false) => warn!(
                event_name = "agent.conversation.append_skipped",
                conversation_id = %self.conversation_id,
                "conversation closed before the answer was stored"
            ),
            Err(error) => warn!(
                event_name = "agent.conversation.append_failed",
                conversation_id = %self.conversation_id,
                error = %error,
                "assistant message not stored"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use dealdesk_core::domain::conversation::{ConversationId, MessageRole};
    use serde_json::{json, Value};

    use crate::app::testing::{post_json, seeded_state};

    fn frames(body: &str) -> Vec<Value> {
        body.split("\n\n")
            .filter_map(|frame| frame.strip_prefix("data: "))
            .map(|data| serde_json::from_str(data).expect("json frame"))
            .collect()
    }

    #[tokio::test]
    async fn stream_frames_every_event_and_stores_the_exchange() {
        let state = seeded_state().await;

        let (status, body) = post_json(
            state.clone(),
            "/api/v1/agent/query-stream",
            json!({"user_id": "1", "query": "私の担当案件を教えて"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let events = frames(&body);
        let types: Vec<&str> =
            events.iter().map(|event| event["type"].as_str().expect("type")).collect();
        assert_eq!(types, vec!["thinking", "function_call", "function_result", "final_response"]);
        assert_eq!(events[1]["tool_name"], "search_deals");
        assert_eq!(events[1]["arguments"]["sales_user_id"], "1");
        assert!(events[1]["arguments"].get("deal_stage").is_none());
        assert!(events[3]["content"].as_str().is_some_and(|text| text.contains("3件の案件")));

        let conversation_id =
            events[0]["conversation_id"].as_str().expect("conversation id on first event");
        let stored = state
            .conversations
            .find_by_id(&ConversationId(conversation_id.to_string()))
            .await
            .expect("load")
            .expect("conversation exists");
        assert_eq!(stored.title, "私の担当案件を教えて");
        assert_eq!(stored.messages.len(), 2);
        assert_eq!(stored.messages[0].role, MessageRole::User);
        assert_eq!(stored.messages[1].role, MessageRole::Assistant);
        assert_eq!(stored.messages[1].search_history.len(), 1);
        assert_eq!(stored.messages[1].search_history[0].tool_name, "search_deals");
    }

    #[tokio::test]
    async fn follow_up_query_extends_the_same_conversation() {
        let state = seeded_state().await;

        let (_, first) = post_json(
            state.clone(),
            "/api/v1/agent/query",
            json!({"user_id": "2", "query": "担当案件は？"}),
        )
        .await;
        let first: Value = serde_json::from_str(&first).expect("json body");
        let conversation_id = first["conversation_id"].as_str().expect("id").to_string();

        let (status, second) = post_json(
            state.clone(),
            "/api/v1/agent/query",
            json!({"user_id": "2", "query": "もう一度", "conversation_id": conversation_id}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let second: Value = serde_json::from_str(&second).expect("json body");
        assert_eq!(second["conversation_id"], conversation_id.as_str());
        assert!(second["response"].as_str().is_some_and(|text| text.contains("2件の案件")));
        assert_eq!(second["search_history"][0]["tool_name"], "search_deals");

        let stored = state
            .conversations
            .find_by_id(&ConversationId(conversation_id))
            .await
            .expect("load")
            .expect("conversation exists");
        assert_eq!(stored.messages.len(), 4);
    }

    #[tokio::test]
    async fn unknown_conversation_is_rejected_before_streaming() {
        let (status, body) = post_json(
            seeded_state().await,
            "/api/v1/agent/query-stream",
            json!({"user_id": "1", "query": "続き", "conversation_id": "missing"}),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(!body.contains("data: "));
    }

    #[tokio::test]
    async fn empty_query_is_bad_request() {
        let (status, _) = post_json(
            seeded_state().await,
            "/api/v1/agent/query",
            json!({"user_id": "1", "query": ""}),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
