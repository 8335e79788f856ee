//! Data-access tools offered to the model for function calling.
//!
//! Every tool returns a human-readable Japanese summary. Data-access failures
//! are reported inside that text rather than as errors, so one failing lookup
//! never aborts an agent run; `ToolError` is reserved for calls the registry
//! refuses to dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use thiserror::Error;

use dealdesk_db::repositories::{CustomerRepository, DealRepository, UserRepository};

use crate::llm::{FunctionCall, GenerativeModel};

pub mod customer;
pub mod deal;
pub mod news;
pub mod user;

pub use customer::{GetCustomerDetailsTool, SearchCustomersTool};
pub use deal::{GetDealDetailsTool, SearchDealsTool};
pub use news::SearchLatestNewsTool;
pub use user::GetUserInfoTool;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParameterKind {
    String,
    StringArray,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub kind: ParameterKind,
    pub description: &'static str,
    pub required: bool,
    pub allowed_values: Vec<&'static str>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolDeclaration {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Vec<ParameterSpec>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("unknown tool `{0}`")]
    UnknownTool(String),
    #[error("invalid arguments for `{tool}`: {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error("`{tool}` failed: {reason}")]
    Execution { tool: String, reason: String },
}

/// Validated argument map handed to a tool.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ToolArguments(Map<String, Value>);

#[async_trait]
pub trait Tool: Send + Sync {
    fn declaration(&self) -> ToolDeclaration;

    async fn execute(&self, args: ToolArguments) -> Result<String, ToolError>;

    fn name(&self) -> &'static str {
        self.declaration().name
    }
}

/// Ordered set of tools; declaration order is the order offered to the model.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<&'static str, usize>,
}

impl ParameterSpec {
    pub fn string(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            kind: ParameterKind::String,
            description,
            required: false,
            allowed_values: Vec::new(),
        }
    }

    pub fn string_array(name: &'static str, description: &'static str) -> Self {
        Self { kind: ParameterKind::StringArray, ..Self::string(name, description) }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn one_of(mut self, values: Vec<&'static str>) -> Self {
        self.allowed_values = values;
        self
    }

    fn schema(&self) -> Value {
        let mut schema = match self.kind {
            ParameterKind::String => json!({"type": "string"}),
            ParameterKind::StringArray => json!({"type": "array", "items": {"type": "string"}}),
        };
        schema["description"] = Value::from(self.description);
        if !self.allowed_values.is_empty() {
            schema["enum"] = Value::from(self.allowed_values.clone());
        }
        schema
    }

    fn check(&self, value: &Value) -> Result<(), String> {
        let type_ok = match self.kind {
            // Models occasionally emit numeric ids for string parameters.
            ParameterKind::String => value.is_string() || value.is_number(),
            ParameterKind::StringArray => {
                value.as_array().is_some_and(|items| items.iter().all(Value::is_string))
            }
        };
        if !type_ok {
            return Err(format!("parameter `{}` has the wrong type", self.name));
        }

        if !self.allowed_values.is_empty() {
            let allowed = value.as_str().is_some_and(|v| self.allowed_values.contains(&v));
            if !allowed {
                return Err(format!(
                    "parameter `{}` must be one of {}",
                    self.name,
                    self.allowed_values.join(", ")
                ));
            }
        }
        Ok(())
    }
}

impl ToolDeclaration {
    /// OpenAPI-style object schema understood by function-calling models.
    pub fn parameters_schema(&self) -> Value {
        let properties: Map<String, Value> =
            self.parameters.iter().map(|spec| (spec.name.to_string(), spec.schema())).collect();
        let required: Vec<&str> =
            self.parameters.iter().filter(|spec| spec.required).map(|spec| spec.name).collect();

        let mut schema = json!({"type": "object", "properties": properties});
        if !required.is_empty() {
            schema["required"] = Value::from(required);
        }
        schema
    }

    pub fn validate(&self, args: &Map<String, Value>) -> Result<(), String> {
        for spec in &self.parameters {
            match args.get(spec.name).filter(|value| !value.is_null()) {
                Some(value) => spec.check(value)?,
                None if spec.required => {
                    return Err(format!("missing required parameter `{}`", spec.name))
                }
                None => {}
            }
        }
        Ok(())
    }
}

impl ToolArguments {
    pub fn new(args: Map<String, Value>) -> Self {
        Self(args)
    }

    /// String value of `name`; numbers are rendered, blanks count as absent.
    pub fn string(&self, name: &str) -> Option<String> {
        match self.0.get(name)? {
            Value::String(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
            Value::Number(value) => Some(value.to_string()),
            _ => None,
        }
    }

    pub fn required_string(&self, tool: &str, name: &str) -> Result<String, ToolError> {
        self.string(name).ok_or_else(|| ToolError::InvalidArguments {
            tool: tool.to_string(),
            reason: format!("missing required parameter `{name}`"),
        })
    }

    pub fn string_list(&self, name: &str) -> Vec<String> {
        self.0
            .get(name)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The six sales tools in the order they are offered to the model.
    pub fn sales_tools(
        users: Arc<dyn UserRepository>,
        customers: Arc<dyn CustomerRepository>,
        deals: Arc<dyn DealRepository>,
        news_model: Arc<dyn GenerativeModel>,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(GetUserInfoTool::new(users));
        registry.register(SearchCustomersTool::new(Arc::clone(&customers)));
        registry.register(GetCustomerDetailsTool::new(customers));
        registry.register(SearchDealsTool::new(Arc::clone(&deals)));
        registry.register(GetDealDetailsTool::new(deals));
        registry.register(SearchLatestNewsTool::new(news_model));
        registry
    }

    /// Registering a name twice replaces the earlier tool in place.
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        let name = tool.name();
        let tool: Arc<dyn Tool> = Arc::new(tool);
        match self.index.get(name) {
            Some(&position) => self.tools[position] = tool,
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools.iter().map(|tool| tool.declaration()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Looks the tool up, validates the arguments against its declaration and
    /// only then runs it.
    pub async fn execute(&self, call: &FunctionCall) -> Result<String, ToolError> {
        let tool = self
            .index
            .get(call.name.as_str())
            .map(|&position| &self.tools[position])
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;

        tool.declaration()
            .validate(&call.args)
            .map_err(|reason| ToolError::InvalidArguments { tool: call.name.clone(), reason })?;

        tool.execute(ToolArguments::new(call.args.clone())).await
    }
}

/// `50000000` -> `50,000,000`.
pub(crate) fn group_thousands(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if amount < 0 {
        grouped.push('-');
    }
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}

pub(crate) fn or_none(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or("なし")
}

pub(crate) fn lookup_failed(tool: &str, error: impl std::fmt::Display) -> String {
    tracing::error!(event_name = "agent.tool.lookup_failed", tool, error = %error, "tool lookup failed");
    format!("エラーが発生しました: {error}")
}
