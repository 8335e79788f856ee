use dealdesk_core::domain::conversation::{Message, MessageRole};

use crate::llm::{Content, FunctionResponse, Part, Role};

/// Ordered model-facing history of one agent run.
///
/// Persisted messages are replayed as plain text turns; tool exchanges from
/// earlier runs are not kept, only their final answers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConversationState {
    contents: Vec<Content>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replay(messages: &[Message]) -> Self {
        let mut state = Self::new();
        for message in messages.iter().filter(|message| !message.content.trim().is_empty()) {
            match message.role {
                MessageRole::User => state.push_user_text(message.content.clone()),
                MessageRole::Assistant => state.push_model_text(message.content.clone()),
            }
        }
        state
    }

    pub fn push_user_text(&mut self, text: impl Into<String>) {
        self.contents.push(Content::user_text(text));
    }

    pub fn push_model_text(&mut self, text: impl Into<String>) {
        self.contents.push(Content::model_text(text));
    }

    /// Appends the model turn exactly as returned, function calls included,
    /// followed by the tool results it asked for. Tool results are sent with
    /// the user role.
    pub fn push_tool_exchange(
        &mut self,
        model_parts: Vec<Part>,
        responses: Vec<FunctionResponse>,
    ) {
        self.contents.push(Content { role: Role::Model, parts: model_parts });
        let parts = responses.into_iter().map(Part::FunctionResponse).collect();
        self.contents.push(Content { role: Role::User, parts });
    }

    pub fn contents(&self) -> &[Content] {
        &self.contents
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use dealdesk_core::domain::conversation::{Message, MessageRole};

    use super::ConversationState;
    use crate::llm::{FunctionCall, FunctionResponse, Part, Role};

    #[test]
    fn replay_maps_roles_and_skips_blank_messages() {
        let messages = vec![
            Message::user("私の担当案件は？"),
            Message::new(MessageRole::Assistant, "  "),
            Message::assistant("2件あります。", Vec::new()),
        ];

        let state = ConversationState::replay(&messages);

        assert_eq!(state.len(), 2);
        assert_eq!(state.contents()[0].role, Role::User);
        assert_eq!(state.contents()[1].role, Role::Model);
        assert_eq!(state.contents()[1].parts, vec![Part::text("2件あります。")]);
    }

    #[test]
    fn tool_results_directly_follow_the_requesting_model_turn() {
        let mut state = ConversationState::new();
        state.push_user_text("私の担当案件は？");
        let call = Part::FunctionCall(FunctionCall {
            name: "search_deals".to_string(),
            args: json!({"sales_user_id": "1"}).as_object().cloned().unwrap_or_default(),
        });
        state.push_tool_exchange(
            vec![call],
            vec![FunctionResponse {
                name: "search_deals".to_string(),
                response: json!({"result": "1件"}),
            }],
        );

        assert_eq!(state.len(), 3);
        assert_eq!(state.contents()[1].role, Role::Model);
        assert!(state.contents()[1].parts[0].as_function_call().is_some());
        assert_eq!(state.contents()[2].role, Role::User);
        assert!(matches!(state.contents()[2].parts[0], Part::FunctionResponse(_)));
    }
}
