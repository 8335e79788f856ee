use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use dealdesk_core::domain::conversation::SearchStep;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventType {
    Thinking,
    FunctionCall,
    FunctionResult,
    /// Reserved for incremental text; the loop currently emits whole answers.
    ResponseChunk,
    FinalResponse,
    Error,
}

/// One step of an agent run as seen by the client. Only the fields relevant to
/// `event_type` are set; the rest are omitted from the JSON form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub event_type: ProgressEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl ProgressEvent {
    fn of(event_type: ProgressEventType) -> Self {
        Self {
            event_type,
            message: None,
            tool_name: None,
            arguments: None,
            result: None,
            content: None,
            conversation_id: None,
        }
    }

    pub fn thinking(message: impl Into<String>) -> Self {
        Self { message: Some(message.into()), ..Self::of(ProgressEventType::Thinking) }
    }

    pub fn function_call(tool_name: &str, arguments: Map<String, Value>) -> Self {
        Self {
            tool_name: Some(tool_name.to_string()),
            arguments: Some(arguments),
            message: Some(format!("{tool_name}を実行中...")),
            ..Self::of(ProgressEventType::FunctionCall)
        }
    }

    pub fn function_result(tool_name: &str) -> Self {
        Self {
            tool_name: Some(tool_name.to_string()),
            result: Some(format!("{tool_name}の実行が完了しました")),
            ..Self::of(ProgressEventType::FunctionResult)
        }
    }

    pub fn final_response(content: impl Into<String>) -> Self {
        Self { content: Some(content.into()), ..Self::of(ProgressEventType::FinalResponse) }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { message: Some(message.into()), ..Self::of(ProgressEventType::Error) }
    }

    pub fn with_conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Tool invocation recorded on the assistant message for `function_call`
    /// events.
    pub fn search_step(&self) -> Option<SearchStep> {
        if self.event_type != ProgressEventType::FunctionCall {
            return None;
        }
        Some(SearchStep {
            tool_name: self.tool_name.clone()?,
            arguments: Value::Object(self.arguments.clone().unwrap_or_default()),
        })
    }

    /// `final_response` and `error` end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self.event_type, ProgressEventType::FinalResponse | ProgressEventType::Error)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map};

    use super::{ProgressEvent, ProgressEventType};

    #[test]
    fn serializes_only_populated_fields() {
        let mut arguments = Map::new();
        arguments.insert("sales_user_id".to_string(), json!("1"));

        let value =
            serde_json::to_value(ProgressEvent::function_call("search_deals", arguments))
                .expect("serialize");

        assert_eq!(
            value,
            json!({
                "type": "function_call",
                "tool_name": "search_deals",
                "arguments": {"sales_user_id": "1"},
                "message": "search_dealsを実行中..."
            })
        );
    }

    #[test]
    fn conversation_id_is_attached_when_known() {
        let value = serde_json::to_value(
            ProgressEvent::thinking("クエリを解析中...").with_conversation_id("abc"),
        )
        .expect("serialize");

        assert_eq!(
            value,
            json!({"type": "thinking", "message": "クエリを解析中...", "conversation_id": "abc"})
        );
    }

    #[test]
    fn only_final_response_and_error_are_terminal() {
        assert!(ProgressEvent::final_response("done").is_terminal());
        assert!(ProgressEvent::error("boom").is_terminal());
        assert!(!ProgressEvent::function_result("search_deals").is_terminal());
        assert_eq!(
            ProgressEvent::function_result("search_deals").result.as_deref(),
            Some("search_dealsの実行が完了しました")
        );
        assert_eq!(ProgressEvent::thinking("x").event_type, ProgressEventType::Thinking);
    }

    #[test]
    fn only_function_calls_become_search_steps() {
        let mut arguments = Map::new();
        arguments.insert("company_name".to_string(), json!("KDDI"));

        let step = ProgressEvent::function_call("search_latest_news", arguments)
            .search_step()
            .expect("function call is a search step");

        assert_eq!(step.tool_name, "search_latest_news");
        assert_eq!(step.arguments, json!({"company_name": "KDDI"}));
        assert!(ProgressEvent::function_result("search_latest_news").search_step().is_none());
    }
}
