use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use dealdesk_core::config::{LlmConfig, DEFAULT_GEMINI_BASE_URL};

use crate::llm::{
    Candidate, Content, FunctionCall, FunctionResponse, GenerateRequest, GenerativeModel,
    LlmError, ModelResponse, Part, Role,
};
use crate::tools::ToolDeclaration;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest {
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<WireGenerationConfig>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WireContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<Role>,
    #[serde(default)]
    parts: Vec<WirePart>,
}

/// Exactly one field is set on the way out; unknown part kinds decode to an
/// empty part and are dropped.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum WireTool {
    FunctionDeclarations(Vec<WireFunctionDeclaration>),
    GoogleSearch(WireGoogleSearch),
}

#[derive(Debug, Serialize)]
struct WireFunctionDeclaration {
    name: &'static str,
    description: &'static str,
    parameters: Value,
}

#[derive(Debug, Serialize)]
struct WireGoogleSearch {}

#[derive(Debug, Serialize)]
struct WireGenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
}

#[derive(Debug, Deserialize)]
struct WireCandidate {
    #[serde(default)]
    content: Option<WireContent>,
}

/// Gemini `generateContent` over REST.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: SecretString, timeout: Duration) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            api_key,
            model: "gemini-2.0-flash".to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
        })
    }

    /// Client for the chat model named by `config.model`.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config.api_key.clone().ok_or(LlmError::MissingApiKey)?;
        Ok(Self::new(api_key, Duration::from_secs(config.timeout_secs))?
            .with_model(&config.model)
            .with_base_url(&config.base_url))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate(&self, request: GenerateRequest) -> Result<ModelResponse, LlmError> {
        let body = encode_request(request);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            tracing::warn!(
                event_name = "agent.llm.http_error",
                model = %self.model,
                status = status.as_u16(),
                "model request rejected"
            );
            return Err(LlmError::Status { status: status.as_u16(), body: text });
        }

        let decoded: WireResponse =
            serde_json::from_str(&text).map_err(|error| LlmError::Decode(error.to_string()))?;
        Ok(decode_response(decoded))
    }
}

fn transport_error(error: reqwest::Error) -> LlmError {
    if error.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::Transport(error.to_string())
    }
}

fn encode_request(request: GenerateRequest) -> WireRequest {
    let mut tools = Vec::new();
    if !request.tools.is_empty() {
        tools.push(WireTool::FunctionDeclarations(
            request.tools.iter().map(encode_declaration).collect(),
        ));
    }
    if request.grounded_search {
        tools.push(WireTool::GoogleSearch(WireGoogleSearch {}));
    }

    WireRequest {
        contents: request.contents.into_iter().map(encode_content).collect(),
        system_instruction: request.system_instruction.map(|text| WireContent {
            role: None,
            parts: vec![WirePart { text: Some(text), ..WirePart::default() }],
        }),
        tools,
        generation_config: request
            .temperature
            .map(|temperature| WireGenerationConfig { temperature }),
    }
}

fn encode_declaration(declaration: &ToolDeclaration) -> WireFunctionDeclaration {
    WireFunctionDeclaration {
        name: declaration.name,
        description: declaration.description,
        parameters: declaration.parameters_schema(),
    }
}

fn encode_content(content: Content) -> WireContent {
    let parts = content
        .parts
        .into_iter()
        .map(|part| match part {
            Part::Text(text) => WirePart { text: Some(text), ..WirePart::default() },
            Part::FunctionCall(call) => {
                WirePart { function_call: Some(call), ..WirePart::default() }
            }
            Part::FunctionResponse(response) => {
                WirePart { function_response: Some(response), ..WirePart::default() }
            }
        })
        .collect();
    WireContent { role: Some(content.role), parts }
}

fn decode_response(response: WireResponse) -> ModelResponse {
    let candidates = response
        .candidates
        .into_iter()
        .map(|candidate| {
            let parts = candidate
                .content
                .unwrap_or_default()
                .parts
                .into_iter()
                .filter_map(|part| {
                    if let Some(call) = part.function_call {
                        Some(Part::FunctionCall(call))
                    } else if let Some(response) = part.function_response {
                        Some(Part::FunctionResponse(response))
                    } else {
                        part.text.map(Part::Text)
                    }
                })
                .collect();
            Candidate { parts }
        })
        .collect();
    ModelResponse { candidates }
}
