//! Sales assistant agent.
//!
//! The agent answers free-form questions from sales staff by letting a
//! generative model call data-access tools in a bounded loop:
//!
//! 1. **Tools** (`tools`) - deal, customer, user lookups and grounded news search,
//!    each declared with a JSON schema and validated before dispatch
//! 2. **Orchestration** (`orchestrator`) - the function-calling loop, emitting
//!    `ProgressEvent`s through a single-use `AgentRun` stream
//! 3. **Models** (`llm`, `gemini`, `offline`) - the provider-neutral
//!    `GenerativeModel` seam, the Gemini REST client and a credential-free
//!    offline stand-in
//! 4. **Copilot** (`copilot`) - one-shot chat grounded on the caller's deals
//!
//! `AgentRuntime` wires all of the above from `AppConfig`.

pub mod conversation;
pub mod copilot;
pub mod events;
pub mod gemini;
pub mod llm;
pub mod offline;
pub mod orchestrator;
pub mod prompts;
pub mod runtime;
pub mod tools;

pub use copilot::CopilotService;
pub use events::{ProgressEvent, ProgressEventType};
pub use gemini::GeminiClient;
pub use llm::{GenerativeModel, LlmError};
pub use offline::OfflineModel;
pub use orchestrator::{AgentOrchestrator, AgentQuery, AgentRun, RunOutcome};
pub use runtime::{AgentRuntime, ModelPair};
pub use tools::{ToolError, ToolRegistry};
