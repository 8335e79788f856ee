use std::sync::Arc;

use dealdesk_core::config::{AgentMode, AppConfig};
use dealdesk_db::repositories::{CustomerRepository, DealRepository, UserRepository};

use crate::copilot::CopilotService;
use crate::gemini::GeminiClient;
use crate::llm::{GenerativeModel, LlmError};
use crate::offline::OfflineModel;
use crate::orchestrator::AgentOrchestrator;
use crate::tools::ToolRegistry;

/// Agent services wired from configuration, shared by the HTTP server and CLI.
#[derive(Clone)]
pub struct AgentRuntime {
    pub orchestrator: AgentOrchestrator,
    pub copilot: Arc<CopilotService>,
    pub mode: AgentMode,
}

pub struct ModelPair {
    pub chat: Arc<dyn GenerativeModel>,
    pub news: Arc<dyn GenerativeModel>,
}

impl ModelPair {
    pub fn from_config(config: &AppConfig) -> Result<Self, LlmError> {
        match config.agent.mode {
            AgentMode::Live => {
                let chat = GeminiClient::from_config(&config.llm)?;
                let news = GeminiClient::from_config(&config.llm)?
                    .with_model(config.llm.news_model.clone());
                tracing::info!(
                    event_name = "agent.models.live",
                    model = chat.model(),
                    news_model = news.model(),
                    "using hosted models"
                );
                Ok(Self { chat: Arc::new(chat), news: Arc::new(news) })
            }
            AgentMode::Offline => {
                tracing::info!(event_name = "agent.models.offline", "using offline model");
                let model: Arc<dyn GenerativeModel> = Arc::new(OfflineModel::new());
                Ok(Self { chat: Arc::clone(&model), news: model })
            }
        }
    }
}

impl AgentRuntime {
    pub fn new(
        config: &AppConfig,
        models: ModelPair,
        users: Arc<dyn UserRepository>,
        customers: Arc<dyn CustomerRepository>,
        deals: Arc<dyn DealRepository>,
    ) -> Self {
        let tools =
            ToolRegistry::sales_tools(users, customers, Arc::clone(&deals), models.news);
        let orchestrator = AgentOrchestrator::new(Arc::clone(&models.chat), Arc::new(tools))
            .with_temperature(config.llm.temperature)
            .with_max_iterations(config.agent.max_iterations);
        let copilot = Arc::new(CopilotService::new(models.chat, deals));

        Self { orchestrator, copilot, mode: config.agent.mode }
    }

    pub fn from_config(
        config: &AppConfig,
        users: Arc<dyn UserRepository>,
        customers: Arc<dyn CustomerRepository>,
        deals: Arc<dyn DealRepository>,
    ) -> Result<Self, LlmError> {
        Ok(Self::new(config, ModelPair::from_config(config)?, users, customers, deals))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::{json, Map};

    use dealdesk_core::config::{AgentMode, AppConfig};
    use dealdesk_core::domain::user::UserId;
    use dealdesk_db::repositories::{
        InMemoryCustomerRepository, InMemoryDealRepository, InMemoryUserRepository,
    };

    use super::{AgentRuntime, ModelPair};
    use crate::events::ProgressEventType;
    use crate::llm::{
        Candidate, FunctionCall, GenerateRequest, GenerativeModel, LlmError, ModelResponse, Part,
    };
    use crate::orchestrator::AgentQuery;

    /// Asks for deal 999 once, then answers with whatever the tool said.
    struct MissingDealModel {
        turns: Mutex<usize>,
    }

    #[async_trait]
    impl GenerativeModel for MissingDealModel {
        async fn generate(&self, request: GenerateRequest) -> Result<ModelResponse, LlmError> {
            let mut turns = self.turns.lock().expect("lock");
            *turns += 1;

            let part = if *turns == 1 {
                let mut args = Map::new();
                args.insert("deal_id".to_string(), json!("999"));
                Part::FunctionCall(FunctionCall { name: "get_deal_details".to_string(), args })
            } else {
                let tool_output = request
                    .contents
                    .last()
                    .and_then(|content| content.parts.first())
                    .and_then(|part| match part {
                        Part::FunctionResponse(response) => {
                            response.response["result"].as_str().map(str::to_string)
                        }
                        _ => None,
                    })
                    .unwrap_or_default();
                Part::text(tool_output)
            };
            Ok(ModelResponse { candidates: vec![Candidate { parts: vec![part] }] })
        }
    }

    fn offline_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.agent.mode = AgentMode::Offline;
        config
    }

    #[test]
    fn live_mode_without_key_cannot_build_models() {
        let mut config = AppConfig::default();
        config.agent.mode = AgentMode::Live;
        config.llm.api_key = None;

        assert!(matches!(ModelPair::from_config(&config), Err(LlmError::MissingApiKey)));
    }

    #[tokio::test]
    async fn offline_runtime_answers_end_to_end() {
        let runtime = AgentRuntime::from_config(
            &offline_config(),
            Arc::new(InMemoryUserRepository::default()),
            Arc::new(InMemoryCustomerRepository::default()),
            Arc::new(InMemoryDealRepository::default()),
        )
        .expect("offline runtime");

        let outcome = runtime
            .orchestrator
            .run(AgentQuery::new(UserId("1".to_string()), "私の担当案件を教えて"))
            .collect()
            .await;

        assert_eq!(outcome.search_history.len(), 1);
        assert_eq!(outcome.search_history[0].tool_name, "search_deals");
        assert_eq!(outcome.search_history[0].arguments, json!({"sales_user_id": "1"}));
        assert_eq!(
            outcome.final_response(),
            Some("## 担当案件一覧\n\n該当する案件が見つかりませんでした。")
        );
    }

    #[tokio::test]
    async fn missing_deal_is_ordinary_tool_output() {
        let model: Arc<dyn GenerativeModel> = Arc::new(MissingDealModel { turns: Mutex::new(0) });
        let runtime = AgentRuntime::new(
            &offline_config(),
            ModelPair { chat: Arc::clone(&model), news: model },
            Arc::new(InMemoryUserRepository::default()),
            Arc::new(InMemoryCustomerRepository::default()),
            Arc::new(InMemoryDealRepository::default()),
        );

        let outcome = runtime
            .orchestrator
            .run(AgentQuery::new(UserId("1".to_string()), "案件999の詳細は？"))
            .collect()
            .await;

        let types: Vec<_> = outcome.events.iter().map(|event| event.event_type).collect();
        assert_eq!(
            types,
            vec![
                ProgressEventType::Thinking,
                ProgressEventType::FunctionCall,
                ProgressEventType::FunctionResult,
                ProgressEventType::FinalResponse,
            ]
        );
        assert_eq!(outcome.final_response(), Some("案件ID 999 は見つかりませんでした。"));
    }
}
