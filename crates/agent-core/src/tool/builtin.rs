// ============================================================================
// Built-in Tools
// ============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt::Write;
use std::iter::Peekable;
use std::str::Chars;
use tokio::sync::RwLock;

use super::{ParamType, Tool, ToolParameter};
use crate::error::{AgentError, Result};
use crate::tool_call::ParameterMap;

/// First string value among `keys`
fn str_param<'a>(params: &'a ParameterMap, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| params.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// DateTime tool - returns current time
pub struct DateTimeTool;

#[async_trait]
impl Tool for DateTimeTool {
    fn name(&self) -> &str {
        "datetime"
    }

    fn description(&self) -> &str {
        "Get the current date and time (UTC)"
    }

    fn describe_parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::new(
                "format",
                ParamType::String,
                "Output format: 'iso', 'human', or 'unix'",
            )
            .with_default(serde_json::json!("human")),
        ]
    }

    async fn run(&self, params: &ParameterMap) -> Result<String> {
        let format = str_param(params, &["format", "input"]).unwrap_or("human");
        let now = Utc::now();

        Ok(match format {
            "iso" => now.to_rfc3339(),
            "unix" => now.timestamp().to_string(),
            _ => now.format("%A, %B %d, %Y at %H:%M:%S UTC").to_string(),
        })
    }
}

/// Calculator tool - evaluates arithmetic expressions
pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculate"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression with + - * / ^ and parentheses"
    }

    fn describe_parameters(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::new(
            "expression",
            ParamType::String,
            "Expression to evaluate (e.g., '2 + 2', '(3 + 4) * 5')",
        )]
    }

    async fn run(&self, params: &ParameterMap) -> Result<String> {
        let expr = str_param(params, &["expression", "input"])
            .ok_or_else(|| AgentError::tool_execution(self.name(), "missing expression"))?;

        let value = evaluate_expression(expr)
            .map_err(|e| AgentError::tool_execution(self.name(), e))?;

        Ok(format!("{} = {}", expr, format_number(value)))
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Recursive-descent evaluator: expr := term (('+'|'-') term)*
fn evaluate_expression(expr: &str) -> std::result::Result<f64, String> {
    let mut parser = ExprParser {
        chars: expr.chars().peekable(),
    };
    let value = parser.expr()?;
    parser.skip_ws();
    match parser.chars.peek() {
        None => Ok(value),
        Some(c) => Err(format!("Unexpected character '{}'", c)),
    }
}

struct ExprParser<'a> {
    chars: Peekable<Chars<'a>>,
}

impl ExprParser<'_> {
    fn skip_ws(&mut self) {
        while self.chars.next_if(|c| c.is_whitespace()).is_some() {}
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_ws();
        self.chars.next_if_eq(&expected).is_some()
    }

    fn expr(&mut self) -> std::result::Result<f64, String> {
        let mut value = self.term()?;
        loop {
            if self.eat('+') {
                value += self.term()?;
            } else if self.eat('-') {
                value -= self.term()?;
            } else {
                return Ok(value);
            }
        }
    }

    fn term(&mut self) -> std::result::Result<f64, String> {
        let mut value = self.power()?;
        loop {
            if self.eat('*') {
                value *= self.power()?;
            } else if self.eat('/') {
                let divisor = self.power()?;
                if divisor == 0.0 {
                    return Err("Division by zero".into());
                }
                value /= divisor;
            } else {
                return Ok(value);
            }
        }
    }

    // right-associative
    fn power(&mut self) -> std::result::Result<f64, String> {
        let base = self.unary()?;
        if self.eat('^') {
            let exponent = self.power()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn unary(&mut self) -> std::result::Result<f64, String> {
        if self.eat('-') {
            return Ok(-self.unary()?);
        }
        if self.eat('+') {
            return self.unary();
        }
        self.primary()
    }

    fn primary(&mut self) -> std::result::Result<f64, String> {
        if self.eat('(') {
            let value = self.expr()?;
            if !self.eat(')') {
                return Err("Missing closing parenthesis".into());
            }
            return Ok(value);
        }

        self.skip_ws();
        let mut literal = String::new();
        while let Some(c) = self.chars.next_if(|c| c.is_ascii_digit() || *c == '.') {
            literal.push(c);
        }
        if literal.is_empty() {
            return match self.chars.peek() {
                Some(c) => Err(format!("Unexpected character '{}'", c)),
                None => Err("Unexpected end of expression".into()),
            };
        }
        literal
            .parse::<f64>()
            .map_err(|e| format!("Parse error: {}", e))
    }
}

#[derive(Clone, Debug)]
struct MemoryEntry {
    content: String,
    created_at: DateTime<Utc>,
}

/// In-process note store with `add`, `search`, `summary` and `clear` actions
pub struct MemoryTool {
    entries: RwLock<Vec<MemoryEntry>>,
}

impl Default for MemoryTool {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTool {
    const DEFAULT_LIMIT: usize = 5;

    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn add(&self, params: &ParameterMap) -> Result<String> {
        let content = str_param(params, &["content", "text", "input"])
            .ok_or_else(|| AgentError::tool_execution(self.name(), "nothing to store"))?;

        let mut entries = self.entries.write().await;
        entries.push(MemoryEntry {
            content: content.to_string(),
            created_at: Utc::now(),
        });
        Ok(format!("Stored memory #{}: {}", entries.len(), content))
    }

    async fn search(&self, params: &ParameterMap) -> Result<String> {
        let query = str_param(params, &["query", "input"])
            .ok_or_else(|| AgentError::tool_execution(self.name(), "missing query"))?;
        let limit = limit_param(params).unwrap_or(Self::DEFAULT_LIMIT);

        let needle = query.to_lowercase();
        let words: Vec<&str> = needle.split_whitespace().collect();

        let entries = self.entries.read().await;
        let hits: Vec<&MemoryEntry> = entries
            .iter()
            .rev()
            .filter(|entry| {
                let haystack = entry.content.to_lowercase();
                haystack.contains(&needle) || words.iter().any(|w| haystack.contains(w))
            })
            .take(limit)
            .collect();

        if hits.is_empty() {
            return Ok(format!("No memories matched '{}'", query));
        }

        let mut out = format!("Found {} memories:\n", hits.len());
        for entry in hits {
            let _ = writeln!(
                out,
                "- [{}] {}",
                entry.created_at.format("%Y-%m-%d %H:%M"),
                entry.content
            );
        }
        Ok(out.trim_end().to_string())
    }

    async fn summary(&self, params: &ParameterMap) -> Result<String> {
        let limit = limit_param(params).unwrap_or(Self::DEFAULT_LIMIT);
        let entries = self.entries.read().await;
        if entries.is_empty() {
            return Ok("No memories stored".into());
        }

        let mut out = format!("{} memories stored. Most recent:\n", entries.len());
        for entry in entries.iter().rev().take(limit) {
            let _ = writeln!(out, "- {}", entry.content);
        }
        Ok(out.trim_end().to_string())
    }
}

fn limit_param(params: &ParameterMap) -> Option<usize> {
    params
        .get("limit")
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
        .filter(|n| *n > 0)
}

#[async_trait]
impl Tool for MemoryTool {
    fn name(&self) -> &str {
        "memory"
    }

    fn description(&self) -> &str {
        "Remember facts across the conversation and search them later"
    }

    fn describe_parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::new(
                "action",
                ParamType::String,
                "One of 'add', 'search', 'summary', 'clear'",
            )
            .required(),
            ToolParameter::new("content", ParamType::String, "Text to store (add)"),
            ToolParameter::new("query", ParamType::String, "Search terms (search)"),
            ToolParameter::new("limit", ParamType::Integer, "Maximum results")
                .with_default(serde_json::json!(Self::DEFAULT_LIMIT)),
        ]
    }

    async fn run(&self, params: &ParameterMap) -> Result<String> {
        let action = params.get("action").and_then(Value::as_str).unwrap_or_default();

        match action {
            "add" => self.add(params).await,
            "search" => self.search(params).await,
            "summary" => self.summary(params).await,
            "clear" => {
                let mut entries = self.entries.write().await;
                let removed = entries.len();
                entries.clear();
                Ok(format!("Cleared {} memories", removed))
            }
            other => Err(AgentError::tool_execution(
                self.name(),
                format!("unknown action '{}'", other),
            )),
        }
    }
}
