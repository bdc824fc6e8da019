//! Tool System
//!
//! Capability interface for tools and the read-only registry the
//! execution loop looks them up in.

mod builtin;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::tool_call::{ParameterMap, ToolCall};

pub use builtin::{CalculatorTool, DateTimeTool, MemoryTool};

/// Declared parameter type, used for coercing tag values
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameter declaration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolParameter {
    /// Parameter name
    pub name: String,

    #[serde(rename = "type")]
    pub param_type: ParamType,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Default value if not provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl ToolParameter {
    pub fn new(
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: false,
            default: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool identifier, as written in tags
    fn name(&self) -> &str;

    /// Human-readable description (shown to the model)
    fn description(&self) -> &str;

    /// Declared parameters, in display order
    fn describe_parameters(&self) -> Vec<ToolParameter> {
        Vec::new()
    }

    /// Execute the tool with decoded parameters
    async fn run(&self, params: &ParameterMap) -> Result<String>;

    /// Validate parameters before execution
    fn validate(&self, params: &ParameterMap) -> Result<()> {
        for param in self.describe_parameters() {
            if param.required && !params.contains_key(&param.name) {
                return Err(AgentError::tool_execution(
                    self.name(),
                    format!("missing required parameter: {}", param.name),
                ));
            }
        }
        Ok(())
    }
}

/// Adapter turning a plain function into a [`Tool`].
///
/// The function receives the `input` parameter (or, when absent, the
/// parameter map rendered as JSON).
pub struct FunctionTool<F> {
    name: String,
    description: String,
    func: F,
}

impl<F> FunctionTool<F>
where
    F: Fn(&str) -> anyhow::Result<String> + Send + Sync,
{
    pub fn new(name: impl Into<String>, description: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            func,
        }
    }
}

#[async_trait]
impl<F> Tool for FunctionTool<F>
where
    F: Fn(&str) -> anyhow::Result<String> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn describe_parameters(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::new("input", ParamType::String, "Input text")]
    }

    async fn run(&self, params: &ParameterMap) -> Result<String> {
        let input = match params.get("input") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => serde_json::to_string(params)?,
        };
        Ok((self.func)(&input)?)
    }
}

/// Registry for available tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registry preloaded with `datetime`, `calculate` and `memory`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(DateTimeTool);
        registry.register(CalculatorTool);
        registry.register(MemoryTool::new());
        registry
    }

    /// Register a new tool, replacing any tool with the same name
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    /// Register a shared tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "Replaced previously registered tool");
        }
    }

    /// Register a plain function as a tool
    pub fn register_function<F>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        func: F,
    ) where
        F: Fn(&str) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        self.register(FunctionTool::new(name, description, func));
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Decode, validate and run one extracted call.
    ///
    /// Any failure inside the tool is reported as `ToolExecution`; an
    /// unknown name as `ToolNotFound`.
    pub async fn execute(&self, call: &ToolCall) -> Result<String> {
        let tool = self
            .get(&call.tool_name)
            .ok_or_else(|| AgentError::ToolNotFound(call.tool_name.clone()))?;

        let params = call.parameters(&tool.describe_parameters());
        tracing::debug!(tool = %call.tool_name, params = ?params, "Executing tool");

        let outcome = match tool.validate(&params) {
            Ok(()) => tool.run(&params).await,
            Err(e) => Err(e),
        };

        outcome.map_err(|e| match e {
            AgentError::ToolExecution { .. } => e,
            other => AgentError::tool_execution(&call.tool_name, other.to_string()),
        })
    }

    /// Tool names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Human-readable tool catalog for the system prompt
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for name in self.names() {
            let Some(tool) = self.tools.get(name) else {
                continue;
            };
            let _ = writeln!(out, "- {}: {}", name, tool.description());
            for param in tool.describe_parameters() {
                let required = if param.required { ", required" } else { "" };
                let _ = writeln!(
                    out,
                    "  - {} ({}{}): {}",
                    param.name, param.param_type, required, param.description
                );
            }
        }
        out
    }
}
