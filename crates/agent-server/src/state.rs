//! Application State

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use agent_core::{
    reasoning::DEFAULT_MAX_TOOL_ITERATIONS, Agent, AgentConfig, EnvSnapshot, LlmProvider,
    ToolRegistry,
};
use agent_runtime::OpenAiCompatProvider;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_SESSION_TTL_SECS: u64 = 30 * 60;
const DEFAULT_MAX_SESSIONS: usize = 1024;

/// Bounds on retained conversations
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionLimits {
    /// Sessions idle this long are dropped on the next insert
    pub idle_ttl: Duration,
    /// Least recently used idle session is dropped beyond this
    pub max_sessions: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            idle_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

/// Server settings read from the environment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub max_tool_iterations: usize,
    pub system_prompt: Option<String>,
    pub sessions: SessionLimits,
}

fn parse_or<T: std::str::FromStr>(env: &EnvSnapshot, name: &str, default: T) -> T {
    match env.get(name) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(variable = name, value = raw, "Ignoring invalid setting");
            default
        }),
        None => default,
    }
}

impl ServerConfig {
    pub fn from_env(env: &EnvSnapshot) -> Self {
        Self {
            bind_addr: env.get("BIND_ADDR").unwrap_or(DEFAULT_BIND_ADDR).to_string(),
            max_tool_iterations: parse_or(
                env,
                "AGENT_MAX_TOOL_ITERATIONS",
                DEFAULT_MAX_TOOL_ITERATIONS,
            ),
            system_prompt: env.get("AGENT_SYSTEM_PROMPT").map(str::to_string),
            sessions: SessionLimits {
                idle_ttl: Duration::from_secs(parse_or(
                    env,
                    "AGENT_SESSION_TTL_SECS",
                    DEFAULT_SESSION_TTL_SECS,
                )),
                max_sessions: parse_or(env, "AGENT_MAX_SESSIONS", DEFAULT_MAX_SESSIONS).max(1),
            },
        }
    }

    pub fn agent_config(&self) -> AgentConfig {
        let mut config = AgentConfig {
            max_tool_iterations: self.max_tool_iterations,
            ..AgentConfig::default()
        };
        if let Some(prompt) = &self.system_prompt {
            config.system_prompt.clone_from(prompt);
        }
        config
    }
}

/// One agent per conversation; the mutex serializes turns within it
pub type SessionHandle = Arc<Mutex<Agent>>;

struct SessionEntry {
    agent: SessionHandle,
    last_used: Instant,
    // monotonic use counter; ties on `Instant` are possible
    tick: u64,
}

impl SessionEntry {
    /// A handler still holds a clone of the handle
    fn in_use(&self) -> bool {
        Arc::strong_count(&self.agent) > 1
    }
}

#[derive(Default)]
struct SessionTable {
    entries: HashMap<String, SessionEntry>,
    ticks: u64,
}

impl SessionTable {
    fn next_tick(&mut self) -> u64 {
        self.ticks += 1;
        self.ticks
    }

    /// Drop expired sessions, then the least recently used ones until
    /// there is room for one more. Busy sessions are never dropped.
    fn make_room(&mut self, limits: SessionLimits, now: Instant) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            entry.in_use() || now.duration_since(entry.last_used) < limits.idle_ttl
        });

        while self.entries.len() >= limits.max_sessions {
            let oldest = self
                .entries
                .iter()
                .filter(|(_, entry)| !entry.in_use())
                .min_by_key(|(_, entry)| entry.tick)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    self.entries.remove(&id);
                }
                None => break,
            }
        }

        let evicted = before - self.entries.len();
        if evicted > 0 {
            tracing::info!(evicted, remaining = self.entries.len(), "Evicted idle sessions");
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Model client, shared by every session
    pub provider: Arc<OpenAiCompatProvider>,

    /// Template for new session agents
    pub agent_config: AgentConfig,

    limits: SessionLimits,
    sessions: Arc<Mutex<SessionTable>>,
}

impl AppState {
    pub fn new(
        provider: Arc<OpenAiCompatProvider>,
        agent_config: AgentConfig,
        limits: SessionLimits,
    ) -> Self {
        Self {
            provider,
            agent_config,
            limits,
            sessions: Arc::new(Mutex::new(SessionTable::default())),
        }
    }

    /// Fetch a session's agent, creating it on first use
    pub async fn session(&self, id: &str) -> SessionHandle {
        let now = Instant::now();
        let mut table = self.sessions.lock().await;
        let tick = table.next_tick();

        if let Some(entry) = table.entries.get_mut(id) {
            entry.last_used = now;
            entry.tick = tick;
            return entry.agent.clone();
        }

        table.make_room(self.limits, now);

        tracing::info!(session = id, "Starting session");
        let agent = Arc::new(Mutex::new(self.new_agent()));
        table.entries.insert(
            id.to_string(),
            SessionEntry {
                agent: agent.clone(),
                last_used: now,
                tick,
            },
        );
        agent
    }

    pub async fn remove_session(&self, id: &str) -> bool {
        self.sessions.lock().await.entries.remove(id).is_some()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.entries.len()
    }

    // Each session owns its tools so `memory` notes stay private to it
    fn new_agent(&self) -> Agent {
        let provider: Arc<dyn LlmProvider> = self.provider.clone();
        Agent::new(
            provider,
            Some(Arc::new(ToolRegistry::with_builtins())),
            self.agent_config.clone(),
        )
    }
}
