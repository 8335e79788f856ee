use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::tools::ToolDeclaration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Part {
    Text(String),
    FunctionCall(FunctionCall),
    FunctionResponse(FunctionResponse),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

/// One model call. `tools` are offered for function calling; `grounded_search`
/// instead enables the provider's built-in web search.
#[derive(Clone, Debug)]
pub struct GenerateRequest {
    pub system_instruction: Option<String>,
    pub contents: Vec<Content>,
    pub tools: Vec<ToolDeclaration>,
    pub temperature: Option<f32>,
    pub grounded_search: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Candidate {
    pub parts: Vec<Part>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelResponse {
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("model API key is not configured")]
    MissingApiKey,
    #[error("model request timed out")]
    Timeout,
    #[error("model transport failure: {0}")]
    Transport(String),
    #[error("model returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode model response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> Result<ModelResponse, LlmError>;
}

impl Part {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn as_function_call(&self) -> Option<&FunctionCall> {
        match self {
            Self::FunctionCall(call) => Some(call),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl Content {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self { role: Role::User, parts: vec![Part::text(text)] }
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self { role: Role::Model, parts: vec![Part::text(text)] }
    }
}

impl GenerateRequest {
    pub fn prompt(text: impl Into<String>) -> Self {
        Self {
            system_instruction: None,
            contents: vec![Content::user_text(text)],
            tools: Vec::new(),
            temperature: None,
            grounded_search: false,
        }
    }
}

impl Candidate {
    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.parts.iter().filter_map(Part::as_function_call).collect()
    }

    /// Concatenation of every text part, or `None` when there is none.
    pub fn text(&self) -> Option<String> {
        let texts: Vec<&str> = self.parts.iter().filter_map(Part::as_text).collect();
        (!texts.is_empty()).then(|| texts.concat())
    }
}

impl ModelResponse {
    pub fn first_candidate(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    /// Text of the first candidate, used by callers that never offer tools.
    pub fn text(&self) -> Option<String> {
        self.first_candidate().and_then(Candidate::text)
    }
}
