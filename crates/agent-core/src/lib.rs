//! # agent-core
//!
//! Provider-agnostic agent core: credential resolution, the tag-based
//! tool-call protocol and the bounded tool execution loop.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Agent                              │
//! │  ┌─────────────┐   ┌──────────────┐   ┌──────────────────┐   │
//! │  │  Execution  │──▶│  tool_call   │──▶│   ToolRegistry   │   │
//! │  │    Loop     │   │  (tag parse) │   │  (Tool trait)    │   │
//! │  └──────┬──────┘   └──────────────┘   └──────────────────┘   │
//! │         ▼                                                    │
//! │  ┌─────────────┐   ┌──────────────────────────────────────┐  │
//! │  │ LlmProvider │◀──│ credentials (env snapshot → endpoint) │  │
//! │  └─────────────┘   └──────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing here performs network I/O; concrete providers live in
//! `agent-runtime`.

pub mod credentials;
pub mod error;
pub mod message;
pub mod provider;
pub mod reasoning;
pub mod tool;
pub mod tool_call;

pub use credentials::{
    CredentialResolver, EnvSnapshot, LlmOptions, ProviderKind, ResolvedCredentials,
};
pub use error::{AgentError, Result};
pub use message::{Conversation, Message, Role};
pub use provider::{Completion, GenerationOptions, LlmProvider, StreamChunk};
pub use reasoning::{Agent, AgentBuilder, AgentConfig};
pub use tool::{ParamType, Tool, ToolParameter, ToolRegistry};
pub use tool_call::{extract_tool_calls, strip_tool_calls, ParameterMap, ToolCall};
