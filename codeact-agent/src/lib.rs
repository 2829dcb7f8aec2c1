//! # codeact-agent
//!
//! Orchestrates the code-act loop:
//! 1. User provides a query
//! 2. The LLM streams prose with embedded `<execute>` code fragments
//! 3. The segmenter classifies the stream as it arrives
//! 4. Each code fragment runs against the persistent execution session
//! 5. Execution output goes back to the model, which reacts to it
//! 6. Multi-turn until the model answers without code (or the budget runs out)
//!
//! The LLM is the brain, the execution session is the hands.

mod agent;
pub mod prompt;
pub mod provider;

pub use agent::{AgentConfig, CodeActAgent};
pub use provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, OpenAIProvider,
    ProviderConfig, ProviderError, Role, StreamChunk, StreamReceiver, Usage,
};
