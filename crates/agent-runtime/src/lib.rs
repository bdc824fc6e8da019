//! # agent-runtime
//!
//! Network-facing model client for the agent.
//!
//! [`OpenAiCompatProvider`] resolves a provider, key, base URL and model
//! from explicit options plus an environment snapshot, then talks to the
//! endpoint's `/chat/completions` route (blocking or streamed).
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::OpenAiCompatProvider;
//!
//! let provider = OpenAiCompatProvider::from_env()?;
//! let mut agent = Agent::builder()
//!     .provider(Arc::new(provider))
//!     .tools(Arc::new(ToolRegistry::with_builtins()))
//!     .build()?;
//! let answer = agent.run("What is 17 * 23?").await?;
//! ```

pub mod openai;
mod sse;

pub use openai::OpenAiCompatProvider;

// Re-export core types for convenience
pub use agent_core::{
    Agent, AgentError, EnvSnapshot, LlmOptions, LlmProvider, Message, Result, Role, Tool,
    ToolRegistry,
};
