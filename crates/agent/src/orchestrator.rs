use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use serde_json::json;
use tokio::sync::mpsc;

use dealdesk_core::domain::conversation::{ConversationId, Message, SearchStep};
use dealdesk_core::domain::user::UserId;

use crate::conversation::ConversationState;
use crate::events::{ProgressEvent, ProgressEventType};
use crate::llm::{FunctionCall, FunctionResponse, GenerateRequest, GenerativeModel};
use crate::prompts::{opening_turn, SALES_ASSISTANT_INSTRUCTION};
use crate::tools::{ToolError, ToolRegistry};

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

const EVENT_BUFFER: usize = 32;

pub const ANALYZING_MESSAGE: &str = "クエリを解析中...";
pub const NO_CANDIDATE_MESSAGE: &str = "レスポンスを生成できませんでした。";
pub const UNEXPECTED_RESPONSE_MESSAGE: &str = "予期しないレスポンス形式です。";
pub const ITERATION_LIMIT_MESSAGE: &str =
    "最大反復回数に達しました。質問を簡潔にしてお試しください。";

/// One question to answer. `history` holds the earlier messages of the
/// conversation, without the current query.
#[derive(Clone, Debug)]
pub struct AgentQuery {
    pub user_id: UserId,
    pub query: String,
    pub conversation_id: Option<ConversationId>,
    pub history: Vec<Message>,
}

/// Drives the function-calling loop between the model and the tool registry.
#[derive(Clone)]
pub struct AgentOrchestrator {
    model: Arc<dyn GenerativeModel>,
    tools: Arc<ToolRegistry>,
    system_instruction: Arc<str>,
    temperature: f32,
    max_iterations: u32,
}

/// Event stream of a single run. Consumed once; dropping it cancels the run at
/// its next checkpoint.
pub struct AgentRun {
    receiver: mpsc::Receiver<ProgressEvent>,
}

/// Everything a run produced, for callers that do not stream.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunOutcome {
    pub events: Vec<ProgressEvent>,
    pub search_history: Vec<SearchStep>,
}

struct ReceiverGone;

struct Emitter {
    sender: mpsc::Sender<ProgressEvent>,
    conversation_id: Option<String>,
}

impl AgentQuery {
    pub fn new(user_id: UserId, query: impl Into<String>) -> Self {
        Self { user_id, query: query.into(), conversation_id: None, history: Vec::new() }
    }

    pub fn in_conversation(
        mut self,
        conversation_id: ConversationId,
        history: Vec<Message>,
    ) -> Self {
        self.conversation_id = Some(conversation_id);
        self.history = history;
        self
    }
}

impl AgentOrchestrator {
    pub fn new(model: Arc<dyn GenerativeModel>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            model,
            tools,
            system_instruction: Arc::from(SALES_ASSISTANT_INSTRUCTION),
            temperature: DEFAULT_TEMPERATURE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Arc::from(instruction.into());
        self
    }

    /// Starts the run on the tokio runtime and returns its event stream.
    pub fn run(&self, query: AgentQuery) -> AgentRun {
        let (sender, receiver) = mpsc::channel(EVENT_BUFFER);
        let emitter = Emitter {
            sender,
            conversation_id: query.conversation_id.as_ref().map(|id| id.as_str().to_string()),
        };
        let orchestrator = self.clone();

        tokio::spawn(async move {
            let user_id = query.user_id.clone();
            if orchestrator.drive(query, emitter).await.is_err() {
                tracing::info!(
                    event_name = "agent.run.cancelled",
                    user_id = %user_id,
                    "event consumer went away; run stopped"
                );
            }
        });

        AgentRun { receiver }
    }

    async fn drive(&self, query: AgentQuery, mut emitter: Emitter) -> Result<(), ReceiverGone> {
        let mut state = ConversationState::replay(&query.history);
        state.push_user_text(opening_turn(&query.user_id, &query.query));
        let declarations = self.tools.declarations();

        for iteration in 1..=self.max_iterations {
            if emitter.is_closed() {
                return Err(ReceiverGone);
            }
            if iteration == 1 {
                emitter.emit(ProgressEvent::thinking(ANALYZING_MESSAGE)).await?;
            }

            tracing::info!(
                event_name = "agent.loop.iteration",
                user_id = %query.user_id,
                iteration,
                max_iterations = self.max_iterations,
                "requesting model"
            );

            let request = GenerateRequest {
                system_instruction: Some(self.system_instruction.to_string()),
                contents: state.contents().to_vec(),
                tools: declarations.clone(),
                temperature: Some(self.temperature),
                grounded_search: false,
            };

            let response = match self.model.generate(request).await {
                Ok(response) => response,
                Err(error) => {
                    tracing::error!(
                        event_name = "agent.loop.model_failed",
                        iteration,
                        error = %error,
                        "model call failed"
                    );
                    let message = format!("エラーが発生しました: {error}");
                    return emitter.emit(ProgressEvent::error(message)).await;
                }
            };

            let Some(candidate) = response.candidates.into_iter().next() else {
                return emitter.emit(ProgressEvent::error(NO_CANDIDATE_MESSAGE)).await;
            };

            let calls: Vec<FunctionCall> =
                candidate.function_calls().into_iter().cloned().collect();

            if calls.is_empty() {
                let event = match candidate.text() {
                    Some(text) => {
                        tracing::info!(
                            event_name = "agent.loop.completed",
                            iteration,
                            response_chars = text.chars().count(),
                            "final response generated"
                        );
                        ProgressEvent::final_response(text)
                    }
                    None => ProgressEvent::error(UNEXPECTED_RESPONSE_MESSAGE),
                };
                return emitter.emit(event).await;
            }

            let mut responses = Vec::with_capacity(calls.len());
            for call in &calls {
                emitter.emit(ProgressEvent::function_call(&call.name, call.args.clone())).await?;

                let response = match self.tools.execute(call).await {
                    Ok(result) => {
                        tracing::info!(
                            event_name = "agent.tool.executed",
                            tool = %call.name,
                            result_chars = result.chars().count(),
                            "tool executed"
                        );
                        json!({ "result": result })
                    }
                    Err(ToolError::InvalidArguments { reason, .. }) => {
                        tracing::warn!(
                            event_name = "agent.tool.invalid_arguments",
                            tool = %call.name,
                            reason = %reason,
                            "returning validation error to model"
                        );
                        json!({ "error": reason })
                    }
                    Err(error) => {
                        tracing::error!(
                            event_name = "agent.tool.failed",
                            tool = %call.name,
                            error = %error,
                            "tool call aborted the run"
                        );
                        return emitter
                            .emit(ProgressEvent::error(format!(
                                "{}の実行中にエラーが発生しました: {error}",
                                call.name
                            )))
                            .await;
                    }
                };

                emitter.emit(ProgressEvent::function_result(&call.name)).await?;
                responses.push(FunctionResponse { name: call.name.clone(), response });
            }

            state.push_tool_exchange(candidate.parts, responses);
        }

        tracing::warn!(
            event_name = "agent.loop.iteration_limit",
            user_id = %query.user_id,
            max_iterations = self.max_iterations,
            "iteration limit reached"
        );
        emitter.emit(ProgressEvent::error(ITERATION_LIMIT_MESSAGE)).await
    }
}

impl Emitter {
    fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// The first event of a run carries the conversation id when known.
    async fn emit(&mut self, event: ProgressEvent) -> Result<(), ReceiverGone> {
        let event = match self.conversation_id.take() {
            Some(conversation_id) => event.with_conversation_id(conversation_id),
            None => event,
        };
        self.sender.send(event).await.map_err(|_| ReceiverGone)
    }
}

impl AgentRun {
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.receiver.recv().await
    }

    /// Drains the run, recording every tool call as a search step.
    pub async fn collect(mut self) -> RunOutcome {
        let mut outcome = RunOutcome::default();
        while let Some(event) = self.next_event().await {
            if let Some(step) = event.search_step() {
                outcome.search_history.push(step);
            }
            outcome.events.push(event);
        }
        outcome
    }
}

impl Stream for AgentRun {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl RunOutcome {
    pub fn terminal(&self) -> Option<&ProgressEvent> {
        self.events.last().filter(|event| event.is_terminal())
    }

    pub fn final_response(&self) -> Option<&str> {
        self.terminal()
            .filter(|event| event.event_type == ProgressEventType::FinalResponse)
            .and_then(|event| event.content.as_deref())
    }

    pub fn error_message(&self) -> Option<&str> {
        self.terminal()
            .filter(|event| event.event_type == ProgressEventType::Error)
            .and_then(|event| event.message.as_deref())
    }
}
