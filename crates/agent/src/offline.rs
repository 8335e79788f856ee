use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::llm::{
    Candidate, Content, FunctionCall, GenerateRequest, GenerativeModel, LlmError, ModelResponse,
    Part, Role,
};
use crate::tools::deal::SEARCH_DEALS;

const USER_ID_PREFIX: &str = "現在のユーザーID: ";
const CONTEXT_MARKER: &str = "【あなたの担当案件】";
const QUESTION_MARKER: &str = "\n\n【質問】";

pub const OFFLINE_NEWS_TEXT: &str = "オフラインモードのため、最新ニュースは取得できません。";
pub const OFFLINE_FALLBACK_TEXT: &str =
    "オフラインモードで動作しています。担当案件の一覧のみ回答できます。";

/// Deterministic stand-in for the hosted model, used when `agent.mode` is
/// `offline`. It lists the caller's deals through `search_deals` and answers
/// with the tool output, so the whole request path runs without credentials.
#[derive(Clone, Debug, Default)]
pub struct OfflineModel;

impl OfflineModel {
    pub fn new() -> Self {
        Self
    }

    fn respond(&self, request: &GenerateRequest) -> Vec<Part> {
        if request.grounded_search {
            return vec![Part::text(OFFLINE_NEWS_TEXT)];
        }

        let last = request.contents.last();
        if request.tools.is_empty() {
            let prompt = last.map(joined_text).unwrap_or_default();
            return vec![Part::text(summarise_prompt(&prompt))];
        }

        if let Some(result) = last.and_then(tool_result) {
            return vec![Part::text(format!("## 担当案件一覧\n\n{result}"))];
        }

        let offers_deal_search = request.tools.iter().any(|tool| tool.name == SEARCH_DEALS);
        match last.map(joined_text).as_deref().and_then(caller_id) {
            Some(user_id) if offers_deal_search => {
                let mut args = Map::new();
                args.insert("sales_user_id".to_string(), Value::from(user_id));
                vec![Part::FunctionCall(FunctionCall { name: SEARCH_DEALS.to_string(), args })]
            }
            _ => vec![Part::text(OFFLINE_FALLBACK_TEXT)],
        }
    }
}

#[async_trait]
impl GenerativeModel for OfflineModel {
    async fn generate(&self, request: GenerateRequest) -> Result<ModelResponse, LlmError> {
        tracing::debug!(
            event_name = "agent.llm.offline",
            turns = request.contents.len(),
            tools = request.tools.len(),
            "offline model answering"
        );
        Ok(ModelResponse { candidates: vec![Candidate { parts: self.respond(&request) }] })
    }
}

fn joined_text(content: &Content) -> String {
    content.parts.iter().filter_map(Part::as_text).collect()
}

fn tool_result(content: &Content) -> Option<String> {
    if content.role != Role::User {
        return None;
    }
    content.parts.iter().find_map(|part| match part {
        Part::FunctionResponse(response) => response
            .response
            .get("result")
            .or_else(|| response.response.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    })
}

fn caller_id(text: &str) -> Option<String> {
    let rest = text.split_once(USER_ID_PREFIX)?.1;
    let id = rest.lines().next()?.trim();
    (!id.is_empty()).then(|| id.to_string())
}

/// Echoes the deal context block of a copilot prompt.
fn summarise_prompt(prompt: &str) -> String {
    let Some(start) = prompt.find(CONTEXT_MARKER) else {
        return OFFLINE_FALLBACK_TEXT.to_string();
    };
    let context = &prompt[start..];
    let context = context.split(QUESTION_MARKER).next().unwrap_or(context);
    format!("## 担当案件一覧\n\n{}", context.trim_end())
}
