use std::sync::Arc;

use dealdesk_core::domain::deal::DealFilter;
use dealdesk_core::domain::user::UserId;
use dealdesk_db::repositories::DealRepository;

use crate::llm::{GenerateRequest, GenerativeModel, LlmError};
use crate::prompts::{copilot_prompt, deal_context, CONTEXT_UNAVAILABLE};

pub const EMPTY_ANSWER: &str = "申し訳ございません。回答を生成できませんでした。";

/// Single-shot chat grounded on the caller's own deals. No tools are offered;
/// the deal list is pasted into the prompt instead.
pub struct CopilotService {
    model: Arc<dyn GenerativeModel>,
    deals: Arc<dyn DealRepository>,
}

impl CopilotService {
    pub fn new(model: Arc<dyn GenerativeModel>, deals: Arc<dyn DealRepository>) -> Self {
        Self { model, deals }
    }

    pub async fn chat(&self, user_id: &UserId, query: &str) -> Result<String, LlmError> {
        let context = self.user_context(user_id).await;
        let request = GenerateRequest::prompt(copilot_prompt(&context, query));
        let response = self.model.generate(request).await?;

        match response.text().filter(|text| !text.trim().is_empty()) {
            Some(text) => Ok(text),
            None => {
                tracing::warn!(
                    event_name = "copilot.chat.empty_response",
                    user_id = %user_id,
                    "model returned no text"
                );
                Ok(EMPTY_ANSWER.to_string())
            }
        }
    }

    async fn user_context(&self, user_id: &UserId) -> String {
        let filter = DealFilter { sales_user_id: Some(user_id.clone()), ..DealFilter::default() };
        match self.deals.list(&filter).await {
            Ok(deals) => deal_context(&deals),
            Err(error) => {
                tracing::error!(
                    event_name = "copilot.context.failed",
                    user_id = %user_id,
                    error = %error,
                    "could not load deal context"
                );
                CONTEXT_UNAVAILABLE.to_string()
            }
        }
    }
}
