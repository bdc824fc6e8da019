//! Tool Execution Loop
//!
//! One [`Agent::run`] call is one conversational turn:
//!
//! ```text
//! Thinking ──(no tags)──────────────────────────▶ Done
//!    ▲  │
//!    │  └─(tags)─▶ ExecutingTools ─(iteration+1)─┐
//!    └───────────────────────────────────────────┘
//! ```
//!
//! After `max_tool_iterations` tool rounds the model is asked once more
//! and whatever it says is the answer. Tool calls found in one reply run
//! strictly in the order they were written.

use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::message::{Conversation, Message};
use crate::provider::{GenerationOptions, LlmProvider};
use crate::tool::{Tool, ToolRegistry};
use crate::tool_call::{extract_tool_calls, strip_tool_calls, syntax_instructions, ToolCall};

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Display name, used in logs
    pub name: String,

    /// Base instructions placed in the system message
    pub system_prompt: String,

    /// Tool rounds allowed per turn before the final unconditional call
    pub max_tool_iterations: usize,

    /// Generation options
    pub generation: GenerationOptions,

    /// Interpret tool-call tags in model replies
    pub enable_tool_calling: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "assistant".into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
            generation: GenerationOptions::default(),
            enable_tool_calling: true,
        }
    }
}

pub const DEFAULT_MAX_TOOL_ITERATIONS: usize = 3;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant. \
Answer directly when you can and use a tool only when it helps. \
Be concise and accurate.";

const OBSERVATION_HEADER: &str = "Tool results:";
const OBSERVATION_FOOTER: &str = "Please give a complete answer based on these results.";

/// Per-turn scratch state; dropped when the turn ends
struct TurnState {
    messages: Vec<Message>,
    iteration: usize,
    final_response: Option<String>,
}

/// The main Agent struct
pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    tools: Option<Arc<ToolRegistry>>,
    config: AgentConfig,
    history: Conversation,
}

impl Agent {
    /// Create a new agent
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Option<Arc<ToolRegistry>>,
        config: AgentConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            config,
            history: Conversation::new(),
        }
    }

    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    /// Registry used this turn, if tags should be interpreted at all
    fn active_tools(&self) -> Option<Arc<ToolRegistry>> {
        if !self.config.enable_tool_calling {
            return None;
        }
        self.tools.as_ref().filter(|t| !t.is_empty()).cloned()
    }

    /// Build the full system prompt including the tool catalog
    pub fn system_prompt(&self) -> String {
        let mut prompt = self.config.system_prompt.clone();

        if let Some(tools) = self.active_tools() {
            prompt.push_str("\n\n## Available tools\nYou can use the following tools:\n");
            prompt.push_str(&tools.describe());
            prompt.push('\n');
            prompt.push_str(&syntax_instructions());
        }

        prompt
    }

    fn initial_messages(&self, input: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(Message::system(self.system_prompt()));
        messages.extend(self.history.messages().iter().cloned());
        messages.push(Message::user(input));
        messages
    }

    /// Run one turn and return the final answer.
    ///
    /// Only a model-call failure aborts the turn; in that case the
    /// history is left untouched.
    pub async fn run(&mut self, input: &str) -> Result<String> {
        let mut turn = TurnState {
            messages: self.initial_messages(input),
            iteration: 0,
            final_response: None,
        };

        let answer = match self.active_tools() {
            Some(tools) => self.run_tool_loop(&mut turn, &tools).await?,
            None => self.call_model(&turn.messages).await?,
        };

        self.history.record_turn(input, answer.clone());
        Ok(answer)
    }

    async fn run_tool_loop(&self, turn: &mut TurnState, tools: &ToolRegistry) -> Result<String> {
        while turn.iteration < self.config.max_tool_iterations {
            let response = self.call_model(&turn.messages).await?;
            let calls = extract_tool_calls(&response);

            if calls.is_empty() {
                turn.final_response = Some(response);
                break;
            }

            tracing::debug!(
                agent = %self.config.name,
                iteration = turn.iteration,
                calls = calls.len(),
                "Executing tool calls"
            );

            let observations = execute_calls(tools, &calls).await;
            turn.messages
                .push(Message::assistant(strip_tool_calls(&response, &calls)));
            turn.messages.push(Message::user(format_observations(&observations)));
            turn.iteration += 1;
        }

        match turn.final_response.take() {
            Some(answer) => Ok(answer),
            None => {
                tracing::warn!(
                    agent = %self.config.name,
                    max = self.config.max_tool_iterations,
                    "Tool iteration ceiling reached; taking next reply as final"
                );
                self.call_model(&turn.messages).await
            }
        }
    }

    async fn call_model(&self, messages: &[Message]) -> Result<String> {
        self.provider
            .complete(messages, &self.config.generation)
            .await
            .map(|completion| completion.content)
            .map_err(|e| {
                tracing::error!(agent = %self.config.name, error = %e, "Model call failed");
                e.into_model_call()
            })
    }

    /// Durable history: one user and one assistant message per finished turn
    pub fn history(&self) -> &[Message] {
        self.history.messages()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Get the tool registry
    pub fn tools(&self) -> Option<&ToolRegistry> {
        self.tools.as_deref()
    }

    /// Get configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }
}

/// Run calls one after another; failures become observations.
async fn execute_calls(tools: &ToolRegistry, calls: &[ToolCall]) -> Vec<String> {
    let mut observations = Vec::with_capacity(calls.len());
    for call in calls {
        let observation = match tools.execute(call).await {
            Ok(output) => format!("Tool '{}' result:\n{}", call.tool_name, output),
            Err(e) => {
                tracing::warn!(tool = %call.tool_name, error = %e, "Tool call failed");
                format!("Error: {}", e)
            }
        };
        observations.push(observation);
    }
    observations
}

fn format_observations(observations: &[String]) -> String {
    format!(
        "{}\n{}\n\n{}",
        OBSERVATION_HEADER,
        observations.join("\n\n"),
        OBSERVATION_FOOTER
    )
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    tools: Option<Arc<ToolRegistry>>,
    pending: ToolRegistry,
    config: AgentConfig,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            tools: None,
            pending: ToolRegistry::new(),
            config: AgentConfig::default(),
        }
    }

    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Add one tool to a registry owned by this agent
    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.pending.register(tool);
        self
    }

    /// Use a shared, read-only registry
    pub fn tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.generation.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.config.generation.temperature = Some(temp);
        self
    }

    pub fn max_tool_iterations(mut self, max: usize) -> Self {
        self.config.max_tool_iterations = max;
        self
    }

    pub fn enable_tool_calling(mut self, enabled: bool) -> Self {
        self.config.enable_tool_calling = enabled;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Configuration("Provider is required".into()))?;

        let tools = match (self.tools, self.pending.is_empty()) {
            (Some(_), false) => {
                return Err(AgentError::Configuration(
                    "use either a shared registry or individual tools, not both".into(),
                ));
            }
            (Some(shared), true) => Some(shared),
            (None, false) => Some(Arc::new(self.pending)),
            (None, true) => None,
        };

        Ok(Agent::new(provider, tools, self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use crate::provider::{Completion, CompletionStream, StreamChunk};
    use crate::tool::{CalculatorTool, MemoryTool};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned replies and records every request
    struct ScriptedProvider {
        replies: Mutex<VecDeque<String>>,
        repeat: Option<String>,
        requests: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedProvider {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
                repeat: None,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn always(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(VecDeque::new()),
                repeat: Some(reply.to_string()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn request(&self, index: usize) -> Vec<Message> {
            self.requests.lock().unwrap()[index].clone()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn default_model(&self) -> &str {
            "script-1"
        }

        async fn complete(
            &self,
            messages: &[Message],
            _options: &GenerationOptions,
        ) -> Result<Completion> {
            self.requests.lock().unwrap().push(messages.to_vec());
            let next = self.replies.lock().unwrap().pop_front();
            next.or_else(|| self.repeat.clone())
                .map(|text| Completion::text(text, "script-1"))
                .ok_or_else(|| AgentError::Provider("connection refused".into()))
        }

        async fn complete_stream(
            &self,
            messages: &[Message],
            options: &GenerationOptions,
        ) -> Result<CompletionStream> {
            let completion = self.complete(messages, options).await?;
            let chunk = StreamChunk {
                delta: completion.content,
                done: true,
                usage: None,
            };
            Ok(Box::pin(futures::stream::iter(vec![Ok(chunk)])))
        }
    }

    fn agent_with(provider: Arc<ScriptedProvider>, max: usize) -> Agent {
        Agent::builder()
            .provider(provider)
            .tool(CalculatorTool)
            .tool(MemoryTool::new())
            .max_tool_iterations(max)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_plain_reply_finishes_in_one_call() {
        let provider = ScriptedProvider::new(&["Paris is the capital of France."]);
        let mut agent = agent_with(provider.clone(), 3);

        let answer = agent.run("Capital of France?").await.unwrap();

        assert_eq!(answer, "Paris is the capital of France.");
        assert_eq!(provider.calls(), 1);
        assert_eq!(agent.history().len(), 2);
        assert_eq!(agent.history()[0].content, "Capital of France?");
        assert_eq!(agent.history()[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_tool_round_feeds_observation_back() {
        let provider = ScriptedProvider::new(&[
            "Let me compute [TOOL_CALL:calculate:6 * 7] now.",
            "The answer is 42.",
        ]);
        let mut agent = agent_with(provider.clone(), 3);

        let answer = agent.run("What is 6 times 7?").await.unwrap();
        assert_eq!(answer, "The answer is 42.");
        assert_eq!(provider.calls(), 2);

        let second = provider.request(1);
        assert_eq!(second.len(), 4);
        assert_eq!(second[0].role, Role::System);
        assert_eq!(second[2].role, Role::Assistant);
        assert_eq!(second[2].content, "Let me compute  now.");
        assert_eq!(second[3].role, Role::User);
        assert_eq!(
            second[3].content,
            "Tool results:\nTool 'calculate' result:\n6 * 7 = 42\n\n\
             Please give a complete answer based on these results."
        );

        // only the user input and the final answer are kept
        assert_eq!(agent.history().len(), 2);
        assert_eq!(agent.history()[1].content, "The answer is 42.");
    }

    #[tokio::test]
    async fn test_ceiling_forces_one_unconditional_call() {
        let provider = ScriptedProvider::always("Checking [TOOL_CALL:calculate:1 + 1]");
        let mut agent = agent_with(provider.clone(), 3);

        let answer = agent.run("loop forever").await.unwrap();

        assert_eq!(provider.calls(), 4);
        assert_eq!(answer, "Checking [TOOL_CALL:calculate:1 + 1]");
        // system + user + 3 rounds of (assistant, observations)
        assert_eq!(provider.request(3).len(), 2 + 3 * 2);
    }

    #[tokio::test]
    async fn test_zero_ceiling_still_answers() {
        let provider = ScriptedProvider::always("[TOOL_CALL:calculate:2 + 2]");
        let mut agent = agent_with(provider.clone(), 0);

        let answer = agent.run("hi").await.unwrap();
        assert_eq!(provider.calls(), 1);
        assert_eq!(answer, "[TOOL_CALL:calculate:2 + 2]");
    }

    #[tokio::test]
    async fn test_missing_tool_and_tool_error_are_observations() {
        let provider = ScriptedProvider::new(&[
            "[TOOL_CALL:weather:Paris] [TOOL_CALL:calculate:1 / 0]",
            "Sorry, I could not get that.",
        ]);
        let mut agent = agent_with(provider.clone(), 3);

        let answer = agent.run("Weather and a division?").await.unwrap();
        assert_eq!(answer, "Sorry, I could not get that.");

        let observations = &provider.request(1)[3].content;
        assert!(observations.contains("Error: tool 'weather' not found"));
        assert!(observations.contains("Error: tool 'calculate' failed: Division by zero"));
        let weather = observations.find("weather").unwrap();
        let calculate = observations.find("calculate").unwrap();
        assert!(weather < calculate);
    }

    #[tokio::test]
    async fn test_calls_in_one_reply_run_in_written_order() {
        let provider = ScriptedProvider::new(&[
            "[TOOL_CALL:memory:store=cats are great][TOOL_CALL:memory:recall=cats]",
            "Noted.",
        ]);
        let mut agent = agent_with(provider.clone(), 3);

        agent.run("Remember that cats are great").await.unwrap();

        let observations = &provider.request(1)[3].content;
        assert!(observations.contains("Stored memory #1: cats are great"));
        assert!(observations.contains("Found 1 memories"));
    }

    #[tokio::test]
    async fn test_model_failure_is_fatal_and_leaves_history() {
        let provider = ScriptedProvider::new(&[]);
        let mut agent = agent_with(provider, 3);

        let err = agent.run("hello").await.unwrap_err();
        assert!(matches!(err, AgentError::ModelCall(ref m) if m == "connection refused"));
        assert!(agent.history().is_empty());
    }

    #[tokio::test]
    async fn test_tool_calling_disabled_returns_tags_verbatim() {
        let provider = ScriptedProvider::new(&["[TOOL_CALL:calculate:1 + 1]"]);
        let mut agent = Agent::builder()
            .provider(provider.clone())
            .tool(CalculatorTool)
            .enable_tool_calling(false)
            .build()
            .unwrap();

        let answer = agent.run("hi").await.unwrap();
        assert_eq!(answer, "[TOOL_CALL:calculate:1 + 1]");
        assert_eq!(provider.calls(), 1);
        assert!(!agent.system_prompt().contains("TOOL_CALL"));
    }

    #[tokio::test]
    async fn test_history_is_replayed_next_turn() {
        let provider = ScriptedProvider::new(&["Hi Ada!", "Your name is Ada."]);
        let mut agent = agent_with(provider.clone(), 3);

        agent.run("My name is Ada").await.unwrap();
        agent.run("What is my name?").await.unwrap();

        let second = provider.request(1);
        let contents: Vec<&str> = second.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(&contents[1..], &["My name is Ada", "Hi Ada!", "What is my name?"]);
        assert_eq!(agent.history().len(), 4);

        agent.clear_history();
        assert!(agent.history().is_empty());
    }

    #[test]
    fn test_system_prompt_carries_catalog_and_syntax() {
        let agent = agent_with(ScriptedProvider::new(&[]), 3);
        let prompt = agent.system_prompt();

        assert!(prompt.starts_with(DEFAULT_SYSTEM_PROMPT));
        assert!(prompt.contains("- calculate:"));
        assert!(prompt.contains("[TOOL_CALL:{tool_name}:{parameters}]"));
    }

    #[test]
    fn test_builder_requires_provider() {
        assert!(matches!(
            Agent::builder().build(),
            Err(AgentError::Configuration(_))
        ));
    }

    #[test]
    fn test_builder_rejects_mixed_registries() {
        let result = Agent::builder()
            .provider(ScriptedProvider::new(&[]))
            .tools(Arc::new(ToolRegistry::with_builtins()))
            .tool(CalculatorTool)
            .build();
        assert!(result.is_err());
    }
}
